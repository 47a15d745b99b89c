//! The channel to the measurement hardware.
//!
//! [`Instrument`] is what the sweep worker needs from a device; [`NanoVna`]
//! speaks the NanoVNA shell protocol over a serial port.

mod nanovna;

pub use nanovna::{NanoVna, Port, Version, PROMPT};

use strum_macros::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Not connected to an instrument")]
    NotConnected,

    #[error("Unexpected response from instrument: {0}")]
    Protocol(String),

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Raw data channels of a two-port reflectometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DataChannel {
    S11,
    S21,
}

impl DataChannel {
    pub fn command(self) -> &'static str {
        match self {
            DataChannel::S11 => "data 0",
            DataChannel::S21 => "data 1",
        }
    }
}

/// A single instrument session. Implementations serialise every
/// command/response exchange internally so that the session can be shared
/// between threads.
pub trait Instrument: Send + Sync {
    fn connected(&self) -> bool;

    fn disconnect(&self);

    /// Whether raw samples should be range checked before use.
    fn validate_input(&self) -> bool {
        true
    }

    /// Restricts the next acquisitions to `points` frequencies from `start`
    /// to `stop`.
    fn set_sweep(&self, start: u64, stop: u64, points: usize) -> Result<(), InstrumentError>;

    /// Restores the instrument's own display sweep and resumes it.
    fn reset_sweep(&self, start: u64, stop: u64, points: usize) -> Result<(), InstrumentError>;

    fn read_frequencies(&self) -> Result<Vec<u64>, InstrumentError>;

    /// One `"<re> <im>"` line per frequency, in frequency order.
    fn read_values(&self, channel: DataChannel) -> Result<Vec<String>, InstrumentError>;

    fn read_firmware(&self) -> Result<String, InstrumentError>;
}
