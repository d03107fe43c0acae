//! ECG-derived respiration from R–S amplitude modulation.
//!
//! Breathing changes the electrical axis of the heart, so the R–S amplitude
//! swings with each breath. Sampling that difference once per beat and
//! interpolating gives a continuous proxy waveform.

use crate::{
    dsp::{normalize_unit, CubicSpline},
    error::{EcgError, EcgResult},
    signal::PeakSet,
};
use std::collections::VecDeque;

/// Reconstructed respiration waveform over one ECG window.
#[derive(Debug, Clone, PartialEq)]
pub struct RespirationWave {
    /// One value per window sample, zero mean and unit peak magnitude.
    pub samples: Vec<f64>,
    /// Index of the last anchor; samples after it are held flat.
    pub last_anchor: usize,
}

/// Build the respiration proxy for a window of `values` with detected peaks.
///
/// Fewer than two usable R/S pairs is `InsufficientData`; a flat amplitude
/// series is `NumericDegenerate`.
pub fn extract_respiration(values: &[f64], peaks: &PeakSet) -> EcgResult<RespirationWave> {
    let mut xs: Vec<f64> = Vec::with_capacity(peaks.s_peaks.len());
    let mut ys: Vec<f64> = Vec::with_capacity(peaks.s_peaks.len());
    for (r, s) in peaks.pairs() {
        if r >= s || s >= values.len() {
            continue;
        }
        let mid = 0.5 * (r + s) as f64;
        if xs.last().map_or(false, |&last| mid <= last) {
            continue;
        }
        xs.push(mid);
        ys.push(values[r] - values[s]);
    }
    if xs.len() < 2 {
        return Err(EcgError::insufficient("R/S pairs", xs.len(), 2));
    }

    let spline = CubicSpline::natural(&xs, &ys)?;
    let mut samples = spline.resample(values.len());
    normalize_unit(&mut samples)?;
    Ok(RespirationWave {
        samples,
        last_anchor: spline.last_x().floor() as usize,
    })
}

/// FIFO of reconstructed respiration samples with a hard capacity.
#[derive(Debug, Clone)]
pub struct RespirationCache {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RespirationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Evict the oldest samples as needed, then append.
    pub fn extend(&mut self, new: &[f64]) {
        let new = if new.len() > self.capacity {
            &new[new.len() - self.capacity..]
        } else {
            new
        };
        let overflow = (self.samples.len() + new.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(new.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The newest `n` samples, oldest first.
    pub fn latest(&self, n: usize) -> Vec<f64> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
