//! Conversions from a reflection coefficient sample to the figures an
//! operator reads off a VNA: impedance, VSWR, return loss, phase, Q and
//! reactance equivalents, plus frequency formatting and parsing.

use std::f64::consts::PI;

use num::complex::Complex64;

use crate::domain::types::Datapoint;

/// Reference impedance of the instrument, ohms.
pub const REFERENCE_IMPEDANCE: f64 = 50.0;

const FREQ_PREFIXES: [&str; 5] = ["", "k", "M", "G", "T"];

const SI_PREFIXES: [&str; 17] = [
    "y", "z", "a", "f", "p", "n", "µ", "m", "", "k", "M", "G", "T", "P", "E", "Z", "Y",
];

pub fn norm_to_impedance(z: Complex64, reference: f64) -> Complex64 {
    z * reference
}

pub fn impedance_to_norm(z: Complex64, reference: f64) -> Complex64 {
    z / reference
}

pub fn reflection_coefficient(z: Complex64, reference: f64) -> Complex64 {
    (z - reference) / (z + reference)
}

pub fn gamma_to_impedance(gamma: Complex64, reference: f64) -> Complex64 {
    ((1.0 + gamma) / (1.0 - gamma)) * reference
}

pub fn clamp_value(value: f64, low: f64, high: f64) -> f64 {
    value.max(low).min(high)
}

/// Series capacitance that would produce the reactance of `z` at `freq`.
pub fn impedance_to_capacitance(z: Complex64, freq: u64) -> f64 {
    if freq == 0 {
        return f64::NEG_INFINITY;
    }
    if z.im == 0.0 {
        return f64::INFINITY;
    }
    -(1.0 / (freq as f64 * 2.0 * PI * z.im))
}

/// Series inductance that would produce the reactance of `z` at `freq`.
pub fn impedance_to_inductance(z: Complex64, freq: u64) -> f64 {
    if freq == 0 {
        return 0.0;
    }
    z.im / (freq as f64 * 2.0 * PI)
}

impl Datapoint {
    /// Impedance seen by a 50 ohm port.
    pub fn impedance(&self) -> Complex64 {
        gamma_to_impedance(self.z(), REFERENCE_IMPEDANCE)
    }

    /// Log magnitude in dB. A zero sample reports 0 dB rather than -inf.
    pub fn gain(&self) -> f64 {
        let mag = self.z().norm();
        if mag > 0.0 {
            20.0 * mag.log10()
        } else {
            0.0
        }
    }

    pub fn vswr(&self) -> f64 {
        let mag = self.z().norm();
        if mag == 1.0 {
            return f64::INFINITY;
        }
        (1.0 + mag) / (1.0 - mag)
    }

    /// Phase angle in degrees.
    pub fn phase(&self) -> f64 {
        self.im.atan2(self.re).to_degrees()
    }

    /// |X / R| of the impedance, -1 when the resistance is zero.
    pub fn quality_factor(&self) -> f64 {
        let z = self.impedance();
        if z.re != 0.0 {
            (z.im / z.re).abs()
        } else {
            -1.0
        }
    }

    pub fn capacitive_equivalent(&self) -> f64 {
        impedance_to_capacitance(self.impedance(), self.freq)
    }

    pub fn inductive_equivalent(&self) -> f64 {
        impedance_to_inductance(self.impedance(), self.freq)
    }
}

/// Human readable frequency: Hz below 1 kHz, kHz below 10 MHz, MHz above.
pub fn format_frequency(freq: f64) -> String {
    if freq < 1.0 {
        return "- Hz".to_string();
    }
    let magnitude = freq.log10();
    if magnitude < 3.0 {
        format!("{} Hz", freq.round())
    } else if magnitude < 7.0 {
        format!("{:.3} kHz", freq / 1e3)
    } else if magnitude < 8.0 {
        format!("{:.4} MHz", freq / 1e6)
    } else {
        format!("{:.3} MHz", freq / 1e6)
    }
}

/// Fixed width SI formatting of an integer frequency. `max_digits` counts
/// the decimal point and is never less than 3.
pub fn format_fixed_frequency(
    freq: u64,
    max_digits: usize,
    append_hz: bool,
    append_space: bool,
) -> String {
    let space = if append_space { " " } else { "" };
    let hz = if append_hz { "Hz" } else { "" };

    let digits = freq.to_string();
    if digits.len() > 15 {
        return "\u{221e}".to_string();
    }
    if freq < 1 {
        return format!(" - {space}{hz}");
    }

    let si_index = (digits.len() - 1) / 3;
    let dot_pos = match digits.len() % 3 {
        0 => 3,
        n => n,
    };
    let padded = format!("{}.{}00", &digits[..dot_pos], &digits[dot_pos..]);
    let width = max_digits.max(3).min(padded.len());
    format!(
        "{}{space}{}{hz}",
        &padded[..width],
        FREQ_PREFIXES[si_index]
    )
}

pub fn format_short_frequency(freq: u64) -> String {
    format_fixed_frequency(freq, 5, true, true)
}

/// Parses user input like `"14.2 MHz"`, `"7M"`, `"144m"` or `"3600000"`.
/// SI suffixes are case insensitive; `m` means mega.
pub fn parse_frequency(input: &str) -> Option<u64> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
        return cleaned.parse().ok();
    }

    let mut value = cleaned.to_lowercase();
    if let Some(stripped) = value.strip_suffix("hz") {
        value = stripped.to_string();
    }

    let mut multiplier = 1.0;
    if let Some(last) = value.chars().last() {
        if let Some(idx) = FREQ_PREFIXES
            .iter()
            .skip(1)
            .position(|p| p.to_lowercase().starts_with(last))
        {
            multiplier = 10f64.powi(3 * (idx as i32 + 1));
            value.pop();
        }
    }

    let parsed: f64 = value.parse().ok()?;
    let freq = (parsed * multiplier).round();
    if !freq.is_finite() || freq < 0.0 {
        return None;
    }
    Some(freq as u64)
}

/// Formats a value with an SI prefix and unit, e.g. `format_si(4.7e-12, "F")`
/// gives `"4.70000pF"`.
pub fn format_si(value: f64, unit: &str, max_nr_digits: usize) -> String {
    if value.abs() >= 1e27 {
        let sign = if value < 0.0 { "-" } else { "" };
        return format!("{sign}\u{221e}{unit}");
    }

    let mut offset: i32 = if value == 0.0 {
        0
    } else {
        (value.abs().log10() / 3.0).floor() as i32
    };
    offset = offset.clamp(-8, 8);

    let real = value / 10f64.powi(offset * 3);
    let result = if max_nr_digits < 4 {
        format!("{real:.0}")
    } else {
        let mut digits = max_nr_digits;
        if real < 10.0 {
            digits += 1;
        }
        if real < 100.0 {
            digits += 1;
        }
        format!("{:.*}", digits - 3, real)
    };

    if result.parse::<f64>().map(|v| v == 0.0).unwrap_or(false) {
        offset = 0;
    }
    format!("{result}{}{unit}", SI_PREFIXES[(offset + 8) as usize])
}
