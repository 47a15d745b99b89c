//! Physical models of the short, open and load reference standards.
//!
//! Each standard is either ideal (-1, +1 and 0 respectively) or described by
//! a parasitic polynomial in frequency and an electrical length, from which
//! a frequency dependent reflection coefficient is computed.

use std::f64::consts::PI;

use num::complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::domain::types::Datapoint;
use crate::rf_math::REFERENCE_IMPEDANCE;

const J: Complex64 = Complex64 { re: 0.0, im: 1.0 };

/// exp(-j·2πf·length), squared for a two-way (reflected) path.
pub fn delay_rotation(freq: u64, length: f64, two_way: bool) -> Complex64 {
    let mult = if two_way { 2.0 } else { 1.0 };
    (-J * mult * 2.0 * PI * freq as f64 * length).exp()
}

/// Removes a fixed electrical delay (seconds) from a sample.
pub fn correct_delay(dp: &Datapoint, delay: f64, reflect: bool) -> Datapoint {
    Datapoint::from_complex(dp.freq, dp.z() * delay_rotation(dp.freq, delay, reflect))
}

fn gamma_of(z: Complex64) -> Complex64 {
    let zn = z / REFERENCE_IMPEDANCE;
    (zn - 1.0) / (zn + 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ShortStandard {
    Ideal,
    /// Series inductance `L0 + L1·f + L2·f² + L3·f³` (henries) and a one-way
    /// electrical length in seconds.
    Parametric {
        l0: f64,
        l1: f64,
        l2: f64,
        l3: f64,
        length: f64,
    },
}

impl ShortStandard {
    pub const TYPICAL: ShortStandard = ShortStandard::Parametric {
        l0: 5.7e-11,
        l1: -8.96e-20,
        l2: -1.1e-29,
        l3: -4.12e-37,
        length: -34.2e-12,
    };

    pub fn gamma(&self, freq: u64) -> Complex64 {
        match *self {
            ShortStandard::Ideal => Complex64::new(-1.0, 0.0),
            ShortStandard::Parametric {
                l0,
                l1,
                l2,
                l3,
                length,
            } => {
                let f = freq as f64;
                let z = J * 2.0 * PI * f * (l0 + l1 * f + l2 * f.powi(2) + l3 * f.powi(3));
                gamma_of(z) * delay_rotation(freq, length, true)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum OpenStandard {
    Ideal,
    /// Shunt capacitance `C0 + C1·f + C2·f² + C3·f³` (farads) and a one-way
    /// electrical length in seconds.
    Parametric {
        c0: f64,
        c1: f64,
        c2: f64,
        c3: f64,
        length: f64,
    },
}

impl OpenStandard {
    pub const TYPICAL: OpenStandard = OpenStandard::Parametric {
        c0: 2.1e-13,
        c1: 5.67e-22,
        c2: -2.39e-30,
        c3: 2.0e-39,
        length: 0.0,
    };

    pub fn gamma(&self, freq: u64) -> Complex64 {
        let ideal = Complex64::new(1.0, 0.0);
        match *self {
            OpenStandard::Ideal => ideal,
            OpenStandard::Parametric {
                c0,
                c1,
                c2,
                c3,
                length,
            } => {
                let f = freq as f64;
                let divisor = 2.0 * PI * f * (c0 + c1 * f + c2 * f.powi(2) + c3 * f.powi(3));
                if divisor == 0.0 {
                    return ideal;
                }
                let z = -J / divisor;
                gamma_of(z) * delay_rotation(freq, length, true)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum LoadStandard {
    Ideal,
    Parametric { resistance: f64, inductance: f64 },
}

impl LoadStandard {
    pub const TYPICAL: LoadStandard = LoadStandard::Parametric {
        resistance: 25.0,
        inductance: 0.0,
    };

    pub fn gamma(&self, freq: u64) -> Complex64 {
        match *self {
            LoadStandard::Ideal => Complex64::new(0.0, 0.0),
            LoadStandard::Parametric {
                resistance,
                inductance,
            } => {
                // The inductive term is added as a real value. Saved
                // calibrations were produced with this model, so keep it.
                let z = Complex64::new(resistance + 2.0 * PI * freq as f64 * inductance, 0.0);
                gamma_of(z)
            }
        }
    }
}

/// The model used for each reference standard. Immutable once handed to a
/// [`super::Calibration`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardsConfig {
    pub short: ShortStandard,
    pub open: OpenStandard,
    pub load: LoadStandard,
}

impl Default for StandardsConfig {
    fn default() -> Self {
        StandardsConfig {
            short: ShortStandard::Ideal,
            open: OpenStandard::Ideal,
            load: LoadStandard::Ideal,
        }
    }
}

impl StandardsConfig {
    /// Modelled reflection coefficients of short, open and load at `freq`.
    pub fn gammas(&self, freq: u64) -> (Complex64, Complex64, Complex64) {
        (
            self.short.gamma(freq),
            self.open.gamma(freq),
            self.load.gamma(freq),
        )
    }
}
