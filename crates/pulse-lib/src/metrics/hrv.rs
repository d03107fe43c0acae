use crate::{
    dsp::sample_std_dev,
    error::{EcgError, EcgResult},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};

/// Physiological bounds for a usable RR interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HrvConfig {
    pub min_rr_ms: f64,
    pub max_rr_ms: f64,
}

impl Default for HrvConfig {
    fn default() -> Self {
        Self {
            min_rr_ms: 300.0,
            max_rr_ms: 2000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvTime {
    pub n: usize,
    /// Mean NN interval (ms)
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

impl HrvTime {
    pub fn heart_rate_bpm(&self) -> f64 {
        60_000.0 / self.avnn
    }
}

/// SDNN in ms over the intervals inside the configured bounds.
///
/// Fewer than two valid intervals is `InsufficientData`; out-of-range
/// intervals are discarded, never clamped.
pub fn sdnn(rr: &RRSeries, cfg: &HrvConfig) -> EcgResult<f64> {
    let valid = rr.retain_range(cfg.min_rr_ms, cfg.max_rr_ms);
    if valid.len() < 2 {
        return Err(EcgError::insufficient("valid RR intervals", valid.len(), 2));
    }
    let sd = sample_std_dev(&valid.rr)
        .ok_or(EcgError::insufficient("valid RR intervals", valid.len(), 2))?;
    if !sd.is_finite() {
        return Err(EcgError::NumericDegenerate("SDNN"));
    }
    Ok(sd)
}

/// Time-domain summary over the valid intervals.
pub fn hrv_time(rr: &RRSeries, cfg: &HrvConfig) -> EcgResult<HrvTime> {
    let rr = rr.retain_range(cfg.min_rr_ms, cfg.max_rr_ms);
    let n = rr.rr.len();
    if n < 2 {
        return Err(EcgError::insufficient("valid RR intervals", n, 2));
    }
    let avnn = rr.rr.iter().sum::<f64>() / n as f64;
    let sdnn = sdnn(&rr, cfg)?;
    let diffs = rr.rr.windows(2).map(|w| (w[1] - w[0]).powi(2));
    let rmssd = (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt();
    let count = rr
        .rr
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > 50.0)
        .count();
    let pnn50 = (count as f64) / (n as f64 - 1.0);

    Ok(HrvTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn sdnn_matches_sample_std_dev() {
        let rr = RRSeries {
            rr: vec![800.0, 820.0, 780.0, 810.0],
        };
        let value = sdnn(&rr, &HrvConfig::default()).unwrap();
        assert_close(value, 17.078251276599332, 1e-9);
    }

    #[test]
    fn out_of_range_intervals_are_discarded() {
        let rr = RRSeries {
            rr: vec![800.0, 250.0, 820.0, 2600.0, 780.0, 810.0],
        };
        let value = sdnn(&rr, &HrvConfig::default()).unwrap();
        assert_close(value, 17.078251276599332, 1e-9);
    }

    #[test]
    fn single_interval_is_unavailable() {
        let rr = RRSeries { rr: vec![800.0] };
        assert!(matches!(
            sdnn(&rr, &HrvConfig::default()),
            Err(EcgError::InsufficientData { have: 1, .. })
        ));
        let none = RRSeries::from_timestamps(&[1000]);
        assert!(sdnn(&none, &HrvConfig::default()).is_err());
    }

    #[test]
    fn time_domain_summary() {
        let rr = RRSeries {
            rr: vec![800.0, 900.0, 820.0, 780.0],
        };
        let m = hrv_time(&rr, &HrvConfig::default()).unwrap();
        assert_eq!(m.n, 4);
        assert_close(m.avnn, 825.0, 1e-9);
        // diffs: 100, -80, -40
        assert_close(m.rmssd, ((10000.0 + 6400.0 + 1600.0) / 3.0_f64).sqrt(), 1e-9);
        assert_close(m.pnn50, 2.0 / 3.0, 1e-9);
        assert_close(m.heart_rate_bpm(), 60_000.0 / 825.0, 1e-9);
    }
}
