use crate::{
    dsp::{count_zero_crossings, dominant_frequency, normalize_unit, Biquad},
    error::{EcgError, EcgResult},
    respiration::extract::RespirationCache,
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Which estimator is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateStrategy {
    /// Hysteresis zero crossings; spectral peak only when fewer than two crossings.
    ZeroCrossing,
    /// Spectral peak; zero crossings kept as the cross-check.
    Spectral,
}

/// Method that produced a reported rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateMethod {
    ZeroCrossing,
    Spectral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RespirationConfig {
    /// Hard cap of the reconstructed-sample FIFO.
    pub cache_capacity: usize,
    /// Analysis window (seconds of reconstructed signal).
    pub window_s: f64,
    /// Cached samples required before any estimate is attempted.
    pub min_cache_len: usize,
    /// Older samples run through the filter before the window to settle it (seconds).
    pub warmup_s: f64,
    /// Breathing band (Hz).
    pub band_hz: (f64, f64),
    /// Hysteresis as a fraction of the normalised amplitude.
    pub hysteresis: f64,
    pub strategy: RateStrategy,
    /// Reported rates are clamped into this range (breaths/min).
    pub rate_bounds: (f64, f64),
}

impl Default for RespirationConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 5000,
            window_s: 10.0,
            min_cache_len: 3000,
            warmup_s: 2.0,
            band_hz: (0.1, 0.5),
            hysteresis: 0.02,
            strategy: RateStrategy::ZeroCrossing,
            rate_bounds: (5.0, 50.0),
        }
    }
}

impl RespirationConfig {
    pub fn window_samples(&self, fs: f64) -> usize {
        (self.window_s * fs).round() as usize
    }

    pub fn required_samples(&self, fs: f64) -> usize {
        self.min_cache_len.max(self.window_samples(fs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    /// Clamped into `rate_bounds`.
    pub breaths_per_min: f64,
    /// Before clamping.
    pub raw_breaths_per_min: f64,
    pub method: RateMethod,
    pub crossings: usize,
    /// The other method's estimate, when it produced one.
    pub cross_check_bpm: Option<f64>,
}

/// Breathing rate from the newest window of the respiration cache.
pub fn estimate_rate(
    cache: &RespirationCache,
    fs: f64,
    cfg: &RespirationConfig,
) -> EcgResult<RateEstimate> {
    let (min_bpm, max_bpm) = cfg.rate_bounds;
    if !(min_bpm.is_finite() && max_bpm.is_finite() && min_bpm <= max_bpm) {
        return Err(EcgError::InvalidConfig(format!(
            "respiration rate bounds ({min_bpm}, {max_bpm}) are not an increasing range"
        )));
    }
    let need = cfg.required_samples(fs);
    if cache.len() < need {
        return Err(EcgError::insufficient("respiration samples", cache.len(), need));
    }
    let window_len = cfg.window_samples(fs);
    if window_len < 2 {
        return Err(EcgError::InvalidConfig(format!(
            "respiration window of {} s at {} Hz",
            cfg.window_s, fs
        )));
    }
    let warmup = ((cfg.warmup_s * fs).round() as usize).min(cache.len() - window_len);
    let mut segment = cache.latest(window_len + warmup);

    let dc = segment[warmup..].iter().sum::<f64>() / window_len as f64;
    for v in segment.iter_mut() {
        *v -= dc;
    }
    let (low, high) = cfg.band_hz;
    let mut bandpass = Biquad::bandpass(low, high, fs)?;
    let filtered = bandpass.filter(&segment);
    let mut window = filtered[warmup..].to_vec();
    normalize_unit(&mut window)?;

    let zc = count_zero_crossings(&window, cfg.hysteresis);
    let zc_bpm = zc.frequency(fs, window.len()).map(|hz| hz * 60.0);
    let spectral_bpm = match dominant_frequency(&window, fs, low, high) {
        Ok(hz) => Some(hz * 60.0),
        Err(err) => {
            trace!("spectral respiration estimate unavailable: {}", err);
            None
        }
    };
    trace!(
        "respiration window: {} crossings, zero-crossing {:?} bpm, spectral {:?} bpm",
        zc.count(),
        zc_bpm,
        spectral_bpm
    );

    let (raw, method, cross_check_bpm) = match (cfg.strategy, zc_bpm, spectral_bpm) {
        (RateStrategy::ZeroCrossing, Some(z), s) => (z, RateMethod::ZeroCrossing, s),
        (RateStrategy::ZeroCrossing, None, Some(s)) => (s, RateMethod::Spectral, None),
        (RateStrategy::Spectral, z, Some(s)) => (s, RateMethod::Spectral, z),
        (RateStrategy::Spectral, Some(z), None) => (z, RateMethod::ZeroCrossing, None),
        (_, None, None) => {
            return Err(EcgError::insufficient("respiration cycles in window", 0, 1));
        }
    };

    Ok(RateEstimate {
        breaths_per_min: clamp_rate(raw, cfg.rate_bounds),
        raw_breaths_per_min: raw,
        method,
        crossings: zc.count(),
        cross_check_bpm,
    })
}

fn clamp_rate(bpm: f64, (min, max): (f64, f64)) -> f64 {
    if bpm < min || bpm > max {
        debug!(
            "{}; clamping",
            EcgError::OutOfRange {
                what: "respiratory rate",
                value: bpm,
                min,
                max,
            }
        );
    }
    bpm.clamp(min, max)
}
