//! Acquisition and error correction of swept-frequency vector network
//! analyzer measurements.

pub mod calibration;
pub mod config;
pub mod dsp;
pub mod instrument;
pub mod rf_math;
pub mod sweep;
pub mod touchstone;

pub mod domain {
    pub mod types;
}
