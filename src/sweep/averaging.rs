//! Averaging of repeated reads with rejection of the samples furthest from
//! the mean.

use log::{debug, info};
use num::complex::Complex64;

fn mean(samples: &[Complex64]) -> Complex64 {
    samples.iter().sum::<Complex64>() / samples.len() as f64
}

/// Mean of `samples` after dropping the `truncates` samples furthest from
/// their plain mean. An illegal count (zero, or not leaving at least one
/// sample) averages everything.
pub fn trimmed_mean(samples: &[Complex64], truncates: usize) -> Complex64 {
    let avg = mean(samples);
    if truncates == 0 {
        return avg;
    }
    if truncates >= samples.len() {
        info!("Not doing illegal truncate");
        return avg;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| (a - avg).norm().total_cmp(&(b - avg).norm()));
    mean(&sorted[..samples.len() - truncates])
}

/// Collapses `repeats` reads of one segment (each with one value per
/// frequency bin) into a single read, bin by bin.
pub fn average_repeats(repeats: &[Vec<Complex64>], truncates: usize) -> Vec<Complex64> {
    let Some(first) = repeats.first() else {
        return Vec::new();
    };
    debug!(
        "Averaging {} reads of {} bins, truncating {}",
        repeats.len(),
        first.len(),
        truncates
    );

    let mut bin = Vec::with_capacity(repeats.len());
    (0..first.len())
        .map(|i| {
            bin.clear();
            bin.extend(repeats.iter().map(|r| r[i]));
            trimmed_mean(&bin, truncates)
        })
        .collect()
}
