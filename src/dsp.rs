//! Time domain reflectometry on swept S11 data.

use log::debug;
use num::complex::Complex;
use rustfft::FftPlanner;
use spectrum_analyzer::windows::blackman_harris_4term;

use crate::domain::types::Datapoint;

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Length of the zero padded inverse transform.
pub const TDR_FFT_POINTS: usize = 1 << 14;

/// Velocity factors of common cable dielectrics.
pub const VF_SOLID_PE: f64 = 0.66;
pub const VF_FOAM_PE: f64 = 0.82;
pub const VF_PTFE: f64 = 0.695;
pub const VF_AIR: f64 = 1.0;

/// Windowed, zero padded inverse FFT of the S11 samples. Index `k` of the
/// result corresponds to a round trip time of `k / (N - 1) / step`.
pub fn impulse_response(data: &[Datapoint]) -> Vec<f64> {
    let ones = vec![1.0f32; data.len()];
    let window = blackman_harris_4term(&ones);

    let mut buffer: Vec<Complex<f64>> = data
        .iter()
        .zip(&window)
        .map(|(dp, &w)| dp.z() * f64::from(w))
        .collect();
    buffer.resize(TDR_FFT_POINTS.max(data.len()), Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(buffer.len());
    ifft.process(&mut buffer);

    let n = buffer.len() as f64;
    buffer.iter().map(|c| c.norm() / n).collect()
}

/// Estimated distance to the strongest reflection, in metres. Needs at least
/// two evenly spaced frequencies.
pub fn cable_length(data: &[Datapoint], velocity_factor: f64) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let step = data[1].freq.checked_sub(data[0].freq).filter(|&s| s > 0)? as f64;

    let response = impulse_response(data);
    let (peak, _) = response
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))?;

    let time = peak as f64 / (response.len() - 1) as f64 / step;
    let distance = time * velocity_factor * SPEED_OF_LIGHT;
    debug!("TDR peak at bin {} ({} s)", peak, time);
    Some(distance / 2.0)
}
