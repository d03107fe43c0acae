use crate::{
    dsp::{mean, median, moving_average, sample_std_dev, Biquad},
    signal::{EcgSample, PeakSet},
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// How the R-peak amplitude threshold is derived from the smoothed signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ThresholdStrategy {
    /// `threshold_factor * max(smoothed)`
    MaxFraction,
    /// The larger of `threshold_factor * max` and `mean + k * stddev`.
    MeanStd { k: f64 },
}

/// What the amplitude override is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmplitudeReference {
    /// Mean raw amplitude of the candidate R-peaks.
    PeakMean,
    /// Mean of the whole raw window.
    SignalMean,
}

/// Configurable parameters for R/S detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakDetectorConfig {
    /// Windows shorter than this are reported as empty.
    pub min_samples: usize,
    /// Width of the centred moving average (samples).
    pub smoothing_window: usize,
    /// Fraction of the smoothed maximum a candidate must exceed.
    pub threshold_factor: f64,
    pub threshold: ThresholdStrategy,
    /// Minimum spacing between accepted R-peaks (seconds).
    pub refractory_s: f64,
    /// Half-width of the raw-signal search used to re-centre each peak (seconds).
    pub correction_s: f64,
    /// Accepted spacing band around the median interval, as fractions of it.
    pub interval_band: (f64, f64),
    /// Peaks above this multiple of the mean peak amplitude bypass the spacing check.
    pub amplitude_override: f64,
    pub override_reference: AmplitudeReference,
    /// Forward search horizon for the S-wave (seconds).
    pub s_search_s: f64,
    /// Optional causal band-pass applied before smoothing (Hz).
    pub prefilter_hz: Option<(f64, f64)>,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        Self {
            min_samples: 100,
            smoothing_window: 5,
            threshold_factor: 0.6,
            threshold: ThresholdStrategy::MaxFraction,
            refractory_s: 0.200,
            correction_s: 0.050,
            interval_band: (0.5, 1.5),
            amplitude_override: 1.5,
            override_reference: AmplitudeReference::PeakMean,
            s_search_s: 0.120,
            prefilter_hz: None,
        }
    }
}

impl PeakDetectorConfig {
    pub fn refractory_samples(&self, fs: f64) -> usize {
        ((self.refractory_s * fs).round() as usize).max(1)
    }

    pub fn correction_samples(&self, fs: f64) -> usize {
        (self.correction_s * fs).floor() as usize
    }

    /// Rounded down so a paired S never lies further than `s_search_s` away.
    pub fn s_search_samples(&self, fs: f64) -> usize {
        ((self.s_search_s * fs).floor() as usize).max(1)
    }
}

/// Locate R-peaks and their paired S-waves in one window of samples.
///
/// Returns an empty set when the window is shorter than `min_samples` or the
/// signal carries no usable peaks; this is a normal state, not an error.
pub fn detect_peaks(samples: &[EcgSample], fs: f64, cfg: &PeakDetectorConfig) -> PeakSet {
    if samples.len() < cfg.min_samples.max(3) || !(fs > 0.0) {
        trace!(
            "insufficient data for peak detection: {} samples",
            samples.len()
        );
        return PeakSet::default();
    }
    let raw: Vec<f64> = samples.iter().map(|s| s.value).collect();
    if raw.iter().any(|v| !v.is_finite()) {
        debug!("non-finite ECG value in window, skipping detection");
        return PeakSet::default();
    }

    let detection = detection_signal(&raw, fs, cfg);
    let threshold = match adaptive_threshold(&detection, cfg) {
        Some(t) => t,
        None => return PeakSet::default(),
    };
    let refractory = cfg.refractory_samples(fs);

    let candidates = pick_candidates(&detection, threshold, refractory);
    let corrected =
        correct_to_raw_maximum(&raw, &candidates, cfg.correction_samples(fs), refractory);
    let r_peaks = reject_implausible(&raw, &corrected, cfg);
    let s_peaks = pair_s_waves(&detection, &r_peaks, cfg.s_search_samples(fs));

    debug!(
        "peak detection: {} candidates, {} R-peaks, {} S-peaks (threshold {:.4})",
        candidates.len(),
        r_peaks.len(),
        s_peaks.len(),
        threshold
    );
    PeakSet { r_peaks, s_peaks }
}

fn detection_signal(raw: &[f64], fs: f64, cfg: &PeakDetectorConfig) -> Vec<f64> {
    let filtered = match cfg.prefilter_hz {
        Some((low, high)) => match Biquad::bandpass(low, high, fs) {
            Ok(mut bp) => bp.filter(raw),
            Err(err) => {
                debug!("prefilter disabled: {}", err);
                raw.to_vec()
            }
        },
        None => raw.to_vec(),
    };
    moving_average(&filtered, cfg.smoothing_window)
}

fn adaptive_threshold(smoothed: &[f64], cfg: &PeakDetectorConfig) -> Option<f64> {
    let max = smoothed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let base = cfg.threshold_factor * max;
    let threshold = match cfg.threshold {
        ThresholdStrategy::MaxFraction => base,
        ThresholdStrategy::MeanStd { k } => {
            let m = mean(smoothed)?;
            let sd = sample_std_dev(smoothed)?;
            base.max(m + k * sd)
        }
    };
    threshold.is_finite().then_some(threshold)
}

fn pick_candidates(smoothed: &[f64], threshold: f64, refractory: usize) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..smoothed.len() - 1 {
        let y = smoothed[i];
        // A two-sample flat top counts once, at its first sample.
        if y > threshold && y > smoothed[i - 1] && y >= smoothed[i + 1] {
            match peaks.last() {
                Some(&last) if i - last < refractory => continue,
                _ => peaks.push(i),
            }
        }
    }
    peaks
}

/// Smoothing can shift the apparent peak, so re-centre on the raw maximum.
fn correct_to_raw_maximum(
    raw: &[f64],
    candidates: &[usize],
    search: usize,
    refractory: usize,
) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::with_capacity(candidates.len());
    for &c in candidates {
        let start = c.saturating_sub(search);
        let end = (c + search).min(raw.len() - 1);
        let mut idx = c;
        for j in start..=end {
            if raw[j] > raw[idx] {
                idx = j;
            }
        }
        match peaks.last_mut() {
            Some(last) if idx <= *last || idx - *last < refractory => {
                if raw[idx] > raw[*last] && idx > *last {
                    *last = idx;
                }
            }
            _ => peaks.push(idx),
        }
    }
    peaks
}

/// Drop peaks whose spacing to the previous beat falls outside the band
/// around the median interval, unless their amplitude alone marks them as beats.
fn reject_implausible(raw: &[f64], peaks: &[usize], cfg: &PeakDetectorConfig) -> Vec<usize> {
    if peaks.len() < 3 {
        return peaks.to_vec();
    }
    let intervals: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let median_rr = match median(&intervals) {
        Some(m) if m > 0.0 => m,
        _ => return peaks.to_vec(),
    };
    let mean_amp = match cfg.override_reference {
        AmplitudeReference::PeakMean => {
            let amplitudes: Vec<f64> = peaks.iter().map(|&p| raw[p]).collect();
            mean(&amplitudes)
        }
        AmplitudeReference::SignalMean => mean(raw),
    }
    .unwrap_or(0.0);
    let (lo, hi) = (cfg.interval_band.0 * median_rr, cfg.interval_band.1 * median_rr);
    let override_amp = cfg.amplitude_override * mean_amp;

    let mut kept = vec![peaks[0]];
    let mut reference = peaks[0];
    for &p in &peaks[1..] {
        let spacing = (p - reference) as f64;
        let strong = mean_amp > 0.0 && raw[p] > override_amp;
        if (spacing >= lo && spacing <= hi) || strong {
            kept.push(p);
            reference = p;
        } else if spacing > hi {
            // A late beat still anchors the next spacing check.
            trace!("dropping R-peak at {} after gap of {} samples", p, spacing);
            reference = p;
        } else {
            trace!("dropping R-peak at {} only {} samples after previous", p, spacing);
        }
    }
    kept
}

/// For each R, the nearest local minimum within `horizon` samples ahead.
/// Without an interior minimum the last sample of the search window is used.
fn pair_s_waves(signal: &[f64], r_peaks: &[usize], horizon: usize) -> Vec<usize> {
    let mut s_peaks = Vec::with_capacity(r_peaks.len());
    for &r in r_peaks {
        let end = (r + horizon).min(signal.len() - 1);
        if end <= r {
            break;
        }
        let s = (r + 1..end)
            .find(|&j| signal[j] < signal[j - 1] && signal[j] <= signal[j + 1])
            .unwrap_or(end);
        s_peaks.push(s);
    }
    s_peaks
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Beats with a tall R, a negative S 40 ms later and a small T wave.
    /// `resp` modulates beat amplitude as `(hz, depth)`.
    pub(crate) fn synthetic_ecg(
        fs: f64,
        rr: &[f64],
        resp: Option<(f64, f64)>,
    ) -> Vec<EcgSample> {
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 0.6;
        let samples = (duration * fs) as usize;
        let mut out = Vec::with_capacity(samples);
        for i in 0..samples {
            let time = i as f64 / fs;
            let mut v = 0.05 * (2.0 * PI * 1.0 * time).sin();
            for &bt in &beats {
                let gain = match resp {
                    Some((hz, depth)) => 1.0 + depth * (2.0 * PI * hz * bt).sin(),
                    None => 1.0,
                };
                let r = (-0.5 * ((time - bt) / 0.012).powi(2)).exp();
                let s = (-0.5 * ((time - bt - 0.040) / 0.012).powi(2)).exp();
                let tw = (-0.5 * ((time - bt - 0.280) / 0.050).powi(2)).exp();
                v += gain * (1.2 * r - 0.35 * s) + 0.2 * tw;
            }
            out.push(EcgSample::new((time * 1000.0).round() as i64, v));
        }
        out
    }

    fn regular_rr(n: usize, rr: f64) -> Vec<f64> {
        vec![rr; n]
    }

    #[test]
    fn short_window_yields_empty_set() {
        let ecg = synthetic_ecg(250.0, &[0.8], None);
        let peaks = detect_peaks(&ecg[..99], 250.0, &PeakDetectorConfig::default());
        assert!(peaks.is_empty());
        assert!(peaks.s_peaks.is_empty());
        assert!(detect_peaks(&[], 250.0, &PeakDetectorConfig::default()).is_empty());
    }

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let ecg = synthetic_ecg(fs, &rr, None);
        let peaks = detect_peaks(&ecg, fs, &PeakDetectorConfig::default());
        assert_eq!(peaks.r_peaks.len(), rr.len() + 1);
        let mut t = 0.5;
        for (k, &idx) in peaks.r_peaks.iter().enumerate() {
            if k > 0 {
                t += rr[k - 1];
            }
            let expected = (t * fs).round() as i64;
            assert!((idx as i64 - expected).abs() <= 1, "beat {k}: {idx} vs {expected}");
        }
    }

    #[test]
    fn peaks_respect_refractory_and_s_horizon() {
        let fs = 250.0;
        let cfg = PeakDetectorConfig::default();
        let ecg = synthetic_ecg(fs, &regular_rr(20, 0.75), Some((0.25, 0.15)));
        let peaks = detect_peaks(&ecg, fs, &cfg);
        assert_eq!(peaks.r_peaks.len(), 21);
        for w in peaks.r_peaks.windows(2) {
            assert!(w[1] > w[0]);
            assert!(w[1] - w[0] >= cfg.refractory_samples(fs));
        }
        assert_eq!(peaks.s_peaks.len(), peaks.r_peaks.len());
        for (r, s) in peaks.pairs() {
            assert!(s > r);
            assert!((s - r) as f64 <= 0.12 * fs);
            // S-wave sits about 40 ms after R.
            assert!((s as i64 - r as i64 - 10).abs() <= 2, "r {r} s {s}");
        }
    }

    #[test]
    fn drops_spurious_early_peak() {
        let fs = 250.0;
        let mut ecg = synthetic_ecg(fs, &regular_rr(10, 0.8), None);
        // A narrow artefact 300 ms after the fourth beat, tall enough to pass
        // the threshold but below the amplitude override.
        let beat = ((0.5 + 3.0 * 0.8) * fs) as usize;
        let spike = beat + 75;
        for d in 0..7usize {
            let w = 1.0 - (d as f64 - 3.0).abs() / 4.0;
            ecg[spike - 3 + d].value += 1.0 * w;
        }
        let peaks = detect_peaks(&ecg, fs, &PeakDetectorConfig::default());
        assert_eq!(peaks.r_peaks.len(), 11);
        assert!(!peaks.r_peaks.iter().any(|&p| p.abs_diff(spike) < 5));
    }

    #[test]
    fn signal_mean_reference_keeps_strong_early_peak() {
        let fs = 250.0;
        let cfg = PeakDetectorConfig {
            override_reference: AmplitudeReference::SignalMean,
            ..PeakDetectorConfig::default()
        };
        let mut ecg = synthetic_ecg(fs, &regular_rr(10, 0.8), None);
        let beat = ((0.5 + 3.0 * 0.8) * fs) as usize;
        let spike = beat + 75;
        for d in 0..7usize {
            let w = 1.0 - (d as f64 - 3.0).abs() / 4.0;
            ecg[spike - 3 + d].value += 1.0 * w;
        }
        // The window mean sits far below any R-wave, so the artefact passes.
        let peaks = detect_peaks(&ecg, fs, &cfg);
        assert_eq!(peaks.r_peaks.len(), 12);
        assert!(peaks.r_peaks.iter().any(|&p| p.abs_diff(spike) < 5));
    }

    #[test]
    fn prefiltered_detection_finds_beats() {
        let fs = 250.0;
        let cfg = PeakDetectorConfig {
            prefilter_hz: Some((5.0, 15.0)),
            ..PeakDetectorConfig::default()
        };
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let ecg = synthetic_ecg(fs, &rr, None);
        let peaks = detect_peaks(&ecg, fs, &cfg);
        assert_eq!(peaks.r_peaks.len(), rr.len() + 1);
        let mut t = 0.5;
        for (k, &idx) in peaks.r_peaks.iter().enumerate() {
            if k > 0 {
                t += rr[k - 1];
            }
            let expected = (t * fs).round() as i64;
            assert!((idx as i64 - expected).abs() <= 1, "beat {k}: {idx} vs {expected}");
        }
        for (r, s) in peaks.pairs() {
            assert!(s > r && (s - r) as f64 <= 0.12 * fs);
        }
    }

    #[test]
    fn mean_std_threshold_still_finds_beats() {
        let fs = 250.0;
        let cfg = PeakDetectorConfig {
            threshold: ThresholdStrategy::MeanStd { k: 3.0 },
            ..PeakDetectorConfig::default()
        };
        let ecg = synthetic_ecg(fs, &regular_rr(12, 0.9), None);
        let peaks = detect_peaks(&ecg, fs, &cfg);
        assert_eq!(peaks.r_peaks.len(), 13);
    }

    #[test]
    fn s_wave_falls_back_to_window_end() {
        let signal: Vec<f64> = (0..20).map(|i| -(i as f64)).collect();
        assert_eq!(pair_s_waves(&signal, &[2], 5), vec![7]);
        let dip = [0.0, 5.0, 3.0, 1.0, 2.0, 0.5, 0.0];
        assert_eq!(pair_s_waves(&dip, &[1], 5), vec![3]);
        assert!(pair_s_waves(&dip, &[6], 5).is_empty());
    }
}
