use crate::{
    detectors::PeakDetectorConfig, error::EcgError, metrics::HrvConfig,
    respiration::RespirationConfig,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Everything an [`EcgSession`](crate::session::EcgSession) needs to know up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sampling_rate_hz: f64,
    /// Samples handed to the detector on each recompute.
    pub analysis_window: usize,
    /// Samples kept in the ECG buffer; at least `analysis_window`.
    pub buffer_retention: usize,
    /// Samples in [`EcgSession::chart_view`](crate::session::EcgSession::chart_view).
    pub view_len: usize,
    pub detector: PeakDetectorConfig,
    pub hrv: HrvConfig,
    pub respiration: RespirationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 250.0,
            analysis_window: 5000,
            buffer_retention: 7500,
            view_len: 1000,
            detector: PeakDetectorConfig::default(),
            hrv: HrvConfig::default(),
            respiration: RespirationConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: SessionConfig = toml::from_str(contents).context("parsing session config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("loading {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialising session config")
    }

    pub fn validate(&self) -> Result<(), EcgError> {
        let fs = self.sampling_rate_hz;
        if !(fs.is_finite() && fs > 0.0) {
            return Err(EcgError::InvalidConfig(format!(
                "sampling_rate_hz must be positive, got {fs}"
            )));
        }
        if self.analysis_window < self.detector.min_samples {
            return Err(EcgError::InvalidConfig(format!(
                "analysis_window {} is shorter than detector.min_samples {}",
                self.analysis_window, self.detector.min_samples
            )));
        }
        if self.view_len == 0 || self.view_len > self.buffer_retention {
            return Err(EcgError::InvalidConfig(format!(
                "view_len {} must be between 1 and buffer_retention {}",
                self.view_len, self.buffer_retention
            )));
        }
        if self.buffer_retention < self.analysis_window {
            return Err(EcgError::InvalidConfig(format!(
                "buffer_retention {} is shorter than analysis_window {}",
                self.buffer_retention, self.analysis_window
            )));
        }

        let det = &self.detector;
        if !(det.threshold_factor > 0.0 && det.threshold_factor <= 1.0) {
            return Err(EcgError::InvalidConfig(format!(
                "detector.threshold_factor must be in (0, 1], got {}",
                det.threshold_factor
            )));
        }
        if det.smoothing_window == 0 {
            return Err(EcgError::InvalidConfig(
                "detector.smoothing_window must be at least 1".into(),
            ));
        }
        let (lo, hi) = det.interval_band;
        if !(lo > 0.0 && hi > lo) {
            return Err(EcgError::InvalidConfig(format!(
                "detector.interval_band ({lo}, {hi}) is not an increasing positive range"
            )));
        }
        if let Some((low, high)) = det.prefilter_hz {
            crate::dsp::Biquad::bandpass(low, high, fs)?;
        }

        if !(self.hrv.min_rr_ms > 0.0 && self.hrv.max_rr_ms > self.hrv.min_rr_ms) {
            return Err(EcgError::InvalidConfig(format!(
                "hrv RR bounds [{}, {}] are not increasing",
                self.hrv.min_rr_ms, self.hrv.max_rr_ms
            )));
        }

        let resp = &self.respiration;
        if resp.cache_capacity < resp.required_samples(fs) {
            return Err(EcgError::InvalidConfig(format!(
                "respiration.cache_capacity {} cannot hold the {} samples an estimate needs",
                resp.cache_capacity,
                resp.required_samples(fs)
            )));
        }
        let (low, high) = resp.band_hz;
        crate::dsp::Biquad::bandpass(low, high, fs)?;
        let (min, max) = resp.rate_bounds;
        if !(min > 0.0 && max > min) {
            return Err(EcgError::InvalidConfig(format!(
                "respiration.rate_bounds ({min}, {max}) are not increasing"
            )));
        }
        Ok(())
    }
}
