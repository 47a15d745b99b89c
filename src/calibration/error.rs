use thiserror::Error;

use super::Standard;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Calibration needs short, open and load sweeps; missing: {missing}")]
    IncompleteStandards { missing: String },

    #[error(
        "Division error at {freq} Hz - were two of short, open and load measured with the same standard?"
    )]
    DegenerateStandards { freq: u64 },

    #[error("The {standard} sweep has {got} points but the short sweep has {expected}; sweep all standards with the same settings")]
    MismatchedStandards {
        standard: Standard,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
