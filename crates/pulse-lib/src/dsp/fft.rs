use crate::error::{EcgError, EcgResult};
use realfft::RealFftPlanner;

/// One-sided magnitude spectrum of a zero-padded, power-of-two frame.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Transform length after padding
    pub n_fft: usize,
    /// `n_fft / 2 + 1` magnitudes
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn bin_hz(&self, fs: f64) -> f64 {
        fs / self.n_fft as f64
    }
}

/// Magnitude spectrum; the input is zero-padded up to the next power of two.
pub fn magnitude_spectrum(signal: &[f64]) -> EcgResult<Spectrum> {
    if signal.len() < 2 {
        return Err(EcgError::insufficient("fft input", signal.len(), 2));
    }
    let n_fft = signal.len().next_power_of_two();
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n_fft);
    let mut frame = r2c.make_input_vec();
    frame[..signal.len()].copy_from_slice(signal);
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut frame, &mut spectrum)
        .map_err(|_| EcgError::NumericDegenerate("fft frame"))?;
    let magnitudes: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
    if magnitudes.iter().any(|m| !m.is_finite()) {
        return Err(EcgError::NumericDegenerate("fft magnitudes"));
    }
    Ok(Spectrum { n_fft, magnitudes })
}

/// Strongest frequency inside `[low_hz, high_hz]`, refined by fitting a
/// parabola through the peak bin and its neighbours.
pub fn dominant_frequency(signal: &[f64], fs: f64, low_hz: f64, high_hz: f64) -> EcgResult<f64> {
    let spectrum = magnitude_spectrum(signal)?;
    let df = spectrum.bin_hz(fs);
    let mags = &spectrum.magnitudes;
    let first = ((low_hz / df).ceil() as usize).max(1);
    let last = ((high_hz / df).floor() as usize).min(mags.len() - 1);
    if first > last {
        return Err(EcgError::insufficient("spectral bins in band", 0, 1));
    }
    let mut peak = first;
    for k in first..=last {
        if mags[k] > mags[peak] {
            peak = k;
        }
    }
    if mags[peak] <= f64::EPSILON {
        return Err(EcgError::NumericDegenerate("flat spectrum"));
    }
    let mut offset = 0.0;
    if peak > 0 && peak + 1 < mags.len() {
        let (l, c, r) = (mags[peak - 1], mags[peak], mags[peak + 1]);
        let denom = l - 2.0 * c + r;
        if denom.abs() > f64::EPSILON {
            offset = (0.5 * (l - r) / denom).clamp(-0.5, 0.5);
        }
    }
    Ok(((peak as f64 + offset) * df).clamp(low_hz, high_hz))
}
