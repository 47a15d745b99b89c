//! Acquisition of a frequency sweep.
//!
//! A [`FrequencySweepPlan`] splits the requested span into instrument sized
//! segments; the [`SweepWorker`] reads each segment, averages and corrects
//! it, and publishes the results as [`SweepEvent`]s.

pub mod averaging;
mod error;
mod worker;

pub use error::SweepError;
pub use worker::{StopHandle, SweepEvent, SweepWorker, MAX_RAW_VALUE};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::deserialize_frequency;

/// An immutable description of a sweep: `segments` consecutive runs of
/// `points` frequencies, evenly spaced by `step` from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencySweepPlan {
    start: u64,
    end: u64,
    points: usize,
    segments: usize,
    step: u64,
}

impl FrequencySweepPlan {
    pub fn new(
        start: u64,
        end: u64,
        points: usize,
        segments: usize,
    ) -> Result<FrequencySweepPlan, SweepError> {
        let illegal = || {
            SweepError::InvalidRange(format!(
                "start {start}, end {end}, {points} points, {segments} segments"
            ))
        };
        if start == 0 || end <= start || points == 0 || segments == 0 {
            return Err(illegal());
        }
        let intervals = (points as u64)
            .checked_mul(segments as u64)
            .and_then(|n| n.checked_sub(1))
            .filter(|&n| n > 0)
            .ok_or_else(illegal)?;
        let step = (end - start) / intervals;
        if step < 1 {
            return Err(illegal());
        }
        Ok(FrequencySweepPlan {
            start,
            end,
            points,
            segments,
            step,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn span(&self) -> u64 {
        self.end - self.start
    }

    pub fn total_points(&self) -> usize {
        self.points * self.segments
    }

    /// First and last frequency of segment `index`.
    pub fn index_range(&self, index: usize) -> (u64, u64) {
        let start = self.start + (index * self.points) as u64 * self.step;
        let end = start + (self.points as u64 - 1) * self.step;
        (start, end)
    }

    /// Position of segment `index`'s first point in the full-span data.
    pub fn segment_offset(&self, index: usize) -> usize {
        index * self.points
    }

    pub fn frequencies(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.total_points() as u64).map(move |i| self.start + i * self.step)
    }
}

impl fmt::Display for FrequencySweepPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Sweep({}, {}, {}, {})",
            self.start, self.end, self.points, self.segments
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AveragingSettings {
    pub enabled: bool,
    /// Reads per segment.
    pub averages: usize,
    /// Reads per bin discarded as outliers.
    pub truncates: usize,
}

impl Default for AveragingSettings {
    fn default() -> Self {
        AveragingSettings {
            enabled: false,
            averages: 3,
            truncates: 0,
        }
    }
}

impl AveragingSettings {
    /// Number of reads per segment actually taken.
    pub fn repeats(&self) -> usize {
        if self.enabled && self.averages > 1 {
            self.averages
        } else {
            1
        }
    }
}

/// What the host asks the worker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    #[serde(deserialize_with = "deserialize_frequency")]
    pub start: u64,
    #[serde(deserialize_with = "deserialize_frequency")]
    pub end: u64,
    /// Points per segment.
    pub points: usize,
    pub segments: usize,
    /// Keep sweeping until stopped.
    pub continuous: bool,
    /// Electrical delay removed from raw data before correction, seconds.
    pub offset_delay: f64,
    pub averaging: AveragingSettings,
}

impl Default for SweepSettings {
    fn default() -> Self {
        SweepSettings {
            start: 3_600_000,
            end: 30_000_000,
            points: 101,
            segments: 1,
            continuous: false,
            offset_delay: 0.0,
            averaging: AveragingSettings::default(),
        }
    }
}

impl SweepSettings {
    pub fn plan(&self) -> Result<FrequencySweepPlan, SweepError> {
        FrequencySweepPlan::new(self.start, self.end, self.points, self.segments)
    }
}
