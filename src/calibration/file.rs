use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::{info, warn};

use super::{Calibration, CalibrationError, Standard};
use crate::domain::types::Datapoint;

/// Column header that marks the start of calibration data.
pub const CALIBRATION_HEADER: &str =
    "# Hz ShortR ShortI OpenR OpenI LoadR LoadI ThroughR ThroughI IsolationR IsolationI";

const TITLE: &str = "# Calibration data for vna-sweep";

impl Calibration {
    /// Writes the raw standards, one line per frequency of the short sweep.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        if !self.is_valid_1port() {
            return Err(CalibrationError::IncompleteStandards {
                missing: "short, open or load".to_string(),
            });
        }
        let path = path.as_ref();
        let two_port = self.is_valid_2port();

        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{TITLE}")?;
        writeln!(writer, "{CALIBRATION_HEADER}")?;
        for (i, short) in self.short.iter().enumerate() {
            let (open, load) = (&self.open[i], &self.load[i]);
            write!(
                writer,
                "{} {} {} {} {} {} {}",
                short.freq, short.re, short.im, open.re, open.im, load.re, load.im
            )?;
            if two_port {
                let (through, isolation) = (&self.through[i], &self.isolation[i]);
                write!(
                    writer,
                    " {} {} {} {}",
                    through.re, through.im, isolation.re, isolation.im
                )?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;

        info!(
            "Saved {} point calibration to {}",
            self.short.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces all standards with the contents of a calibration file and
    /// returns the number of frequencies read. Malformed lines are logged
    /// and skipped; a file without the column header yields no data. Error
    /// terms are discarded, call [`Calibration::calculate`] afterwards.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, CalibrationError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        self.reset();

        let mut parsed_header = false;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('!') {
                continue;
            }
            if line.starts_with('#') {
                if !parsed_header && line == CALIBRATION_HEADER {
                    parsed_header = true;
                }
                continue;
            }
            if !parsed_header {
                warn!("Read line without having read header: {}", line);
                continue;
            }
            if let Err(reason) = self.push_line(line) {
                warn!("Error parsing calibration data \"{}\": {}", line, reason);
            }
        }

        info!(
            "Loaded {} calibration points from {}",
            self.short.len(),
            path.display()
        );
        Ok(self.short.len())
    }

    fn push_line(&mut self, line: &str) -> Result<(), String> {
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() != 7 && fields.len() != 11 {
            return Err(format!("expected 7 or 11 fields, got {}", fields.len()));
        }

        let freq: u64 = fields[0]
            .parse()
            .map_err(|e| format!("bad frequency '{}': {}", fields[0], e))?;
        let values = fields[1..]
            .iter()
            .map(|v| v.parse::<f64>().map_err(|e| format!("bad value '{}': {}", v, e)))
            .collect::<Result<Vec<f64>, String>>()?;

        let standards = [
            Standard::Short,
            Standard::Open,
            Standard::Load,
            Standard::Through,
            Standard::Isolation,
        ];
        for (standard, pair) in standards.into_iter().zip(values.chunks_exact(2)) {
            self.standard_mut(standard)
                .push(Datapoint::new(freq, pair[0], pair[1]));
        }
        Ok(())
    }
}
