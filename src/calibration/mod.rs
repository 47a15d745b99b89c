//! Short-Open-Load(-Through) error correction.
//!
//! Reference standards are swept and stored here. [`Calibration::calculate`]
//! turns them into per-frequency error terms (a three term one-port model,
//! plus isolation and transmission tracking for S21), which are then
//! applied to live samples by [`Calibration::correct11`] and
//! [`Calibration::correct21`].

mod error;
mod file;
pub mod standards;
#[cfg(test)]
mod tests;

pub use error::CalibrationError;
pub use file::CALIBRATION_HEADER;
pub use standards::{correct_delay, LoadStandard, OpenStandard, ShortStandard, StandardsConfig};

use log::{debug, error, info};
use num::complex::Complex64;
use num::Zero;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::domain::types::Datapoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Standard {
    Short,
    Open,
    Load,
    Through,
    Isolation,
}

/// Error terms, indexed like the short standard's frequency axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTerms {
    pub frequencies: Vec<u64>,
    /// Directivity.
    pub e00: Vec<Complex64>,
    /// Port match.
    pub e11: Vec<Complex64>,
    /// Tracking.
    pub delta_e: Vec<Complex64>,
    /// Frequency axis of the through standard. Empty for one-port.
    pub frequencies21: Vec<u64>,
    /// Isolation.
    pub e30: Vec<Complex64>,
    /// Transmission tracking.
    pub e10e32: Vec<Complex64>,
}

impl ErrorTerms {
    pub fn is_two_port(&self) -> bool {
        !self.e30.is_empty()
    }
}

/// Index of the axis entry nearest to `freq`; ties go to the lowest index.
fn nearest_index(axis: &[u64], freq: u64) -> usize {
    let mut index = 0;
    let mut distance = u64::MAX;
    for (i, &f) in axis.iter().enumerate() {
        let d = f.abs_diff(freq);
        if d < distance {
            index = i;
            distance = d;
        }
    }
    index
}

#[derive(Debug, Clone, Default)]
pub struct Calibration {
    config: StandardsConfig,
    short: Vec<Datapoint>,
    open: Vec<Datapoint>,
    load: Vec<Datapoint>,
    through: Vec<Datapoint>,
    isolation: Vec<Datapoint>,
    terms: Option<ErrorTerms>,
}

impl Calibration {
    pub fn new(config: StandardsConfig) -> Calibration {
        Calibration {
            config,
            ..Calibration::default()
        }
    }

    pub fn config(&self) -> &StandardsConfig {
        &self.config
    }

    /// Stores a swept standard. Error terms are not recomputed until the
    /// next [`Calibration::calculate`].
    pub fn set_standard(&mut self, standard: Standard, data: Vec<Datapoint>) {
        debug!("Storing {} standard ({} points)", standard, data.len());
        *self.standard_mut(standard) = data;
    }

    pub fn standard(&self, standard: Standard) -> &[Datapoint] {
        match standard {
            Standard::Short => &self.short,
            Standard::Open => &self.open,
            Standard::Load => &self.load,
            Standard::Through => &self.through,
            Standard::Isolation => &self.isolation,
        }
    }

    fn standard_mut(&mut self, standard: Standard) -> &mut Vec<Datapoint> {
        match standard {
            Standard::Short => &mut self.short,
            Standard::Open => &mut self.open,
            Standard::Load => &mut self.load,
            Standard::Through => &mut self.through,
            Standard::Isolation => &mut self.isolation,
        }
    }

    /// Drops all standards and error terms.
    pub fn reset(&mut self) {
        for standard in Standard::iter() {
            self.standard_mut(standard).clear();
        }
        self.terms = None;
    }

    pub fn is_valid_1port(&self) -> bool {
        !self.short.is_empty() && !self.open.is_empty() && !self.load.is_empty()
    }

    pub fn is_valid_2port(&self) -> bool {
        self.is_valid_1port() && !self.through.is_empty() && !self.isolation.is_empty()
    }

    pub fn is_calculated(&self) -> bool {
        self.terms.is_some()
    }

    pub fn terms(&self) -> Option<&ErrorTerms> {
        self.terms.as_ref()
    }

    fn check_lengths(&self, standards: &[Standard]) -> Result<(), CalibrationError> {
        let expected = self.short.len();
        for &standard in standards {
            let got = self.standard(standard).len();
            if got != expected {
                return Err(CalibrationError::MismatchedStandards {
                    standard,
                    expected,
                    got,
                });
            }
        }
        Ok(())
    }

    /// Computes the error terms from the stored standards. On failure the
    /// calibration is left uncalculated.
    pub fn calculate(&mut self) -> Result<(), CalibrationError> {
        self.terms = None;

        if !self.is_valid_1port() {
            let missing: Vec<String> = [Standard::Short, Standard::Open, Standard::Load]
                .into_iter()
                .filter(|&s| self.standard(s).is_empty())
                .map(|s| s.to_string())
                .collect();
            return Err(CalibrationError::IncompleteStandards {
                missing: missing.join(", "),
            });
        }
        self.check_lengths(&[Standard::Open, Standard::Load])?;
        let two_port = self.is_valid_2port();
        if two_port {
            self.check_lengths(&[Standard::Through, Standard::Isolation])?;
        }

        let n = self.short.len();
        let mut terms = ErrorTerms {
            frequencies: Vec::with_capacity(n),
            e00: Vec::with_capacity(n),
            e11: Vec::with_capacity(n),
            delta_e: Vec::with_capacity(n),
            ..ErrorTerms::default()
        };

        for i in 0..n {
            let freq = self.short[i].freq;
            let (g1, g2, g3) = self.config.gammas(freq);
            let gm1 = self.short[i].z();
            let gm2 = self.open[i].z();
            let gm3 = self.load[i].z();

            let denominator = g1 * (g2 - g3) * gm1 + g2 * g3 * gm2
                - g2 * g3 * gm3
                - (g2 * gm2 - g3 * gm3) * g1;
            if denominator.is_zero() {
                error!(
                    "Division error at {} Hz - did you use the same measurement for two of short, open and load?",
                    freq
                );
                return Err(CalibrationError::DegenerateStandards { freq });
            }

            let e00 = -((g2 * gm3 - g3 * gm3) * g1 * gm2
                - (g2 * g3 * gm2 - g2 * g3 * gm3 - (g3 * gm2 - g2 * gm3) * g1) * gm1)
                / denominator;
            let e11 = ((g2 - g3) * gm1 - g1 * (gm2 - gm3) + g3 * gm2 - g2 * gm3) / denominator;
            let delta_e = -((g1 * (gm2 - gm3) - g2 * gm2 + g3 * gm3) * gm1
                + (g2 * gm3 - g3 * gm3) * gm2)
                / denominator;

            terms.frequencies.push(freq);
            terms.e00.push(e00);
            terms.e11.push(e11);
            terms.delta_e.push(delta_e);

            if two_port {
                let e30 = self.isolation[i].z();
                let s21m = self.through[i].z();
                terms.frequencies21.push(self.through[i].freq);
                terms.e30.push(e30);
                terms.e10e32.push((s21m - e30) * (1.0 - e11 * e11));
            }
        }

        info!(
            "Calculated {} calibration over {} points",
            if two_port { "2-port" } else { "1-port" },
            n
        );
        self.terms = Some(terms);
        Ok(())
    }

    /// Applies the one-port correction using the nearest calibrated
    /// frequency. Returns the sample unchanged when not calculated.
    pub fn correct11(&self, dp: &Datapoint) -> Datapoint {
        let Some(terms) = self.terms.as_ref().filter(|t| !t.frequencies.is_empty()) else {
            return *dp;
        };
        let idx = nearest_index(&terms.frequencies, dp.freq);
        let s11m = dp.z();
        let s11 = (s11m - terms.e00[idx]) / (s11m * terms.e11[idx] - terms.delta_e[idx]);
        Datapoint::from_complex(dp.freq, s11)
    }

    /// Applies the transmission correction. Returns the sample unchanged
    /// without a two-port calibration.
    pub fn correct21(&self, dp: &Datapoint) -> Datapoint {
        let Some(terms) = self.terms.as_ref().filter(|t| t.is_two_port()) else {
            return *dp;
        };
        let idx = nearest_index(&terms.frequencies21, dp.freq);
        let s21 = (dp.z() - terms.e30[idx]) / terms.e10e32[idx];
        Datapoint::from_complex(dp.freq, s21)
    }
}
