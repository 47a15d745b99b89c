use thiserror::Error;

use crate::instrument::InstrumentError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    #[error("Illegal sweep settings: {0}")]
    InvalidRange(String),

    #[error("Not connected to an instrument")]
    NotConnected,

    #[error("{0}")]
    DeviceIO(String),

    #[error("A sweep is already running")]
    AlreadyRunning,

    #[error("Instrument error: {0}")]
    Instrument(String),
}

impl From<InstrumentError> for SweepError {
    fn from(e: InstrumentError) -> Self {
        match e {
            InstrumentError::NotConnected => SweepError::NotConnected,
            e => SweepError::Instrument(e.to_string()),
        }
    }
}
