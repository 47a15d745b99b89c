//! Reading and writing Touchstone (v1.1) S-parameter files.
//!
//! A file is an optional block of `!` comments, a single `#` option line and
//! then one data line per frequency. Up to four complex pairs per line are
//! understood, mapping to S11, S21, S12 and S22 in that order. Files are
//! always exported as Hz / real-imaginary pairs.

mod error;
#[cfg(test)]
mod tests;

pub use error::TouchstoneError;

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use num::complex::Complex64;
use strum_macros::{Display, EnumString};

use crate::domain::types::Datapoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum FrequencyUnit {
    #[strum(to_string = "GHZ")]
    GHz,
    #[strum(to_string = "MHZ")]
    MHz,
    #[strum(to_string = "KHZ")]
    KHz,
    #[strum(to_string = "HZ")]
    Hz,
}

impl FrequencyUnit {
    pub fn factor(self) -> f64 {
        match self {
            FrequencyUnit::GHz => 1e9,
            FrequencyUnit::MHz => 1e6,
            FrequencyUnit::KHz => 1e3,
            FrequencyUnit::Hz => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive, serialize_all = "UPPERCASE")]
pub enum Parameter {
    S,
    Y,
    Z,
    G,
    H,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive, serialize_all = "UPPERCASE")]
pub enum ValueFormat {
    /// Magnitude and angle in degrees.
    Ma,
    /// Magnitude in dB and angle in degrees.
    Db,
    /// Real and imaginary.
    Ri,
}

impl ValueFormat {
    fn decode(self, a: f64, b: f64) -> Complex64 {
        match self {
            ValueFormat::Ri => Complex64::new(a, b),
            ValueFormat::Ma => Complex64::from_polar(a, b.to_radians()),
            ValueFormat::Db => Complex64::from_polar(10f64.powf(a / 20.0), b.to_radians()),
        }
    }
}

/// The `#` option line. All tokens are optional and may come in any order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    pub unit: FrequencyUnit,
    pub parameter: Parameter,
    pub format: ValueFormat,
    pub resistance: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            unit: FrequencyUnit::GHz,
            parameter: Parameter::S,
            format: ValueFormat::Ma,
            resistance: 50.0,
        }
    }
}

impl Options {
    pub fn parse(line: &str) -> Result<Options, TouchstoneError> {
        let body = line
            .strip_prefix('#')
            .ok_or_else(|| TouchstoneError::NotAnOptionLine(line.to_string()))?;
        let illegal = || TouchstoneError::IllegalOption(line.to_string());

        let mut opts = Options::default();
        let (mut seen_unit, mut seen_param, mut seen_format, mut seen_resist) =
            (false, false, false, false);

        let mut tokens = body.split_whitespace();
        while let Some(token) = tokens.next() {
            if let Ok(unit) = FrequencyUnit::from_str(token) {
                if seen_unit {
                    return Err(illegal());
                }
                opts.unit = unit;
                seen_unit = true;
            } else if let Ok(parameter) = Parameter::from_str(token) {
                if seen_param {
                    return Err(illegal());
                }
                opts.parameter = parameter;
                seen_param = true;
            } else if let Ok(format) = ValueFormat::from_str(token) {
                if seen_format {
                    return Err(illegal());
                }
                opts.format = format;
                seen_format = true;
            } else if token.eq_ignore_ascii_case("r") && !seen_resist {
                opts.resistance = tokens
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(illegal)?;
                seen_resist = true;
            } else {
                return Err(illegal());
            }
        }
        Ok(opts)
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "# {} {} {} R {}",
            self.unit, self.parameter, self.format, self.resistance
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Touchstone {
    pub comments: Vec<String>,
    pub opts: Options,
    sdata: [Vec<Datapoint>; 4],
}

impl Touchstone {
    pub fn one_port(s11: &[Datapoint]) -> Touchstone {
        let mut ts = Touchstone::export_template();
        ts.sdata[0] = s11.to_vec();
        ts
    }

    /// S11 and S21 as measured; S12 and S22 are written as zeros.
    pub fn two_port(s11: &[Datapoint], s21: &[Datapoint]) -> Touchstone {
        let mut ts = Touchstone::export_template();
        let zeros: Vec<Datapoint> = s11.iter().map(|d| Datapoint::new(d.freq, 0.0, 0.0)).collect();
        ts.sdata = [s11.to_vec(), s21.to_vec(), zeros.clone(), zeros];
        ts
    }

    fn export_template() -> Touchstone {
        Touchstone {
            opts: Options {
                unit: FrequencyUnit::Hz,
                format: ValueFormat::Ri,
                ..Options::default()
            },
            ..Touchstone::default()
        }
    }

    pub fn s11(&self) -> &[Datapoint] {
        &self.sdata[0]
    }

    pub fn s21(&self) -> &[Datapoint] {
        &self.sdata[1]
    }

    pub fn s12(&self) -> &[Datapoint] {
        &self.sdata[2]
    }

    pub fn s22(&self) -> &[Datapoint] {
        &self.sdata[3]
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Touchstone, TouchstoneError> {
        let path = path.as_ref();
        info!("Attempting to open file {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Touchstone::loads(&contents)
    }

    /// Parses the whole file contents.
    pub fn loads(contents: &str) -> Result<Touchstone, TouchstoneError> {
        let mut ts = Touchstone::default();
        let mut lines = contents.lines();

        let mut opts_line = None;
        for line in lines.by_ref() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('!') {
                debug!("{}", line);
                ts.comments.push(line.to_string());
                continue;
            }
            opts_line = Some(line);
            break;
        }
        ts.opts = Options::parse(opts_line.ok_or(TouchstoneError::MissingOptionLine)?)?;

        let factor = ts.opts.unit.factor();
        let mut prev_freq = 0.0;
        let mut pair_count = None;
        for line in lines {
            let data = match line.split_once('!') {
                Some((data, comment)) => {
                    if data.trim().is_empty() {
                        ts.comments.push(format!("!{comment}"));
                    }
                    data
                }
                None => line,
            };
            let fields: Vec<&str> = data.split_whitespace().collect();
            let Some((freq_field, values)) = fields.split_first() else {
                continue;
            };

            let parse = |v: &str| -> Result<f64, TouchstoneError> {
                v.parse().map_err(|_| TouchstoneError::BadNumber {
                    value: v.to_string(),
                    line: line.to_string(),
                })
            };

            let freq = parse(freq_field)? * factor;
            if !freq.is_finite() {
                return Err(TouchstoneError::BadNumber {
                    value: freq_field.to_string(),
                    line: line.to_string(),
                });
            }
            if freq <= prev_freq {
                return Err(TouchstoneError::NotAscending(line.to_string()));
            }
            prev_freq = freq;

            if values.is_empty() || values.len() % 2 != 0 {
                return Err(TouchstoneError::OddValues(line.to_string()));
            }
            match pair_count {
                None => pair_count = Some(values.len()),
                Some(n) if n != values.len() => {
                    return Err(TouchstoneError::InconsistentPairs(line.to_string()))
                }
                Some(_) => {}
            }
            if values.len() > 8 {
                return Err(TouchstoneError::TooManyPairs(line.to_string()));
            }

            let freq = freq.round() as u64;
            for (slot, pair) in values.chunks_exact(2).enumerate() {
                let z = ts.opts.format.decode(parse(pair[0])?, parse(pair[1])?);
                ts.sdata[slot].push(Datapoint::from_complex(freq, z));
            }
        }
        Ok(ts)
    }

    /// Writes comments, the option line and the data, always as Hz and RI.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), TouchstoneError> {
        for comment in &self.comments {
            if comment.starts_with('!') {
                writeln!(writer, "{comment}")?;
            } else {
                writeln!(writer, "! {comment}")?;
            }
        }
        let opts = Options {
            unit: FrequencyUnit::Hz,
            format: ValueFormat::Ri,
            ..self.opts
        };
        writeln!(writer, "{opts}")?;

        let populated: Vec<&Vec<Datapoint>> =
            self.sdata.iter().filter(|s| !s.is_empty()).collect();
        let rows = populated.iter().map(|s| s.len()).min().unwrap_or(0);
        for i in 0..rows {
            write!(writer, "{}", populated[0][i].freq)?;
            for slot in &populated {
                write!(writer, " {} {}", slot[i].re, slot[i].im)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TouchstoneError> {
        let path = path.as_ref();
        info!("Writing Touchstone file {}", path.display());
        let file = File::create(path)?;
        self.write(BufWriter::new(file))
    }
}
