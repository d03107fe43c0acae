//! One live ECG session: the buffer, the respiration cache and the
//! recompute that turns them into a [`Snapshot`].

use crate::{
    config::SessionConfig,
    detectors::detect_peaks,
    error::{EcgError, EcgResult},
    metrics::{hrv_time, sdnn, HrvTime},
    respiration::{estimate_rate, extract_respiration, RateEstimate, RespirationCache},
    signal::{EcgBuffer, EcgSample, PeakSet, RRSeries},
};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Result of one recompute over the newest analysis window.
///
/// Peak indices are relative to `window_offset`. Every metric is `None`
/// when it could not be computed this cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub window_offset: u64,
    pub window_len: usize,
    #[serde(flatten)]
    pub peaks: PeakSet,
    /// SDNN (ms)
    pub hrv: Option<f64>,
    pub hrv_time: Option<HrvTime>,
    pub heart_rate_bpm: Option<f64>,
    /// Reconstructed respiration over the window; empty when unavailable.
    pub respiration_signal: Vec<f64>,
    /// Breaths per minute
    pub respiratory_rate: Option<f64>,
    pub rate_estimate: Option<RateEstimate>,
    pub respiration_cache_len: usize,
}

/// The last `len` buffered samples with peaks re-indexed into them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowView {
    pub offset: u64,
    pub samples: Vec<EcgSample>,
    pub peaks: PeakSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub samples_received: u64,
    pub samples_rejected: u64,
    pub duration_s: f64,
    pub heart_rate_bpm: Option<f64>,
    pub hrv_sdnn_ms: Option<f64>,
    pub respiratory_rate: Option<f64>,
}

/// All per-connection state. Created on connect, dropped on disconnect.
#[derive(Debug, Clone)]
pub struct EcgSession {
    config: SessionConfig,
    buffer: EcgBuffer,
    respiration: RespirationCache,
    /// Absolute ECG index one past the last sample appended to `respiration`.
    resp_cursor: Option<u64>,
    first_timestamp_ms: Option<i64>,
}

impl EcgSession {
    pub fn new(config: SessionConfig) -> EcgResult<Self> {
        config.validate()?;
        Ok(Self {
            buffer: EcgBuffer::new(config.buffer_retention),
            respiration: RespirationCache::new(config.respiration.cache_capacity),
            resp_cursor: None,
            first_timestamp_ms: None,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn buffer(&self) -> &EcgBuffer {
        &self.buffer
    }

    pub fn respiration_cache(&self) -> &RespirationCache {
        &self.respiration
    }

    /// Append a batch from the sensor and recompute.
    pub fn push_samples(&mut self, batch: &[EcgSample]) -> Snapshot {
        let accepted = self.buffer.extend(batch);
        if self.first_timestamp_ms.is_none() && accepted > 0 {
            self.first_timestamp_ms = batch.first().map(|s| s.timestamp_ms);
        }
        trace!(
            "accepted {}/{} samples, buffer {}",
            accepted,
            batch.len(),
            self.buffer.len()
        );
        self.recompute()
    }

    /// Derive peaks and metrics from the newest window.
    ///
    /// Running this again without new samples yields the same snapshot and
    /// leaves the respiration cache untouched.
    pub fn recompute(&mut self) -> Snapshot {
        let fs = self.config.sampling_rate_hz;
        let window = self.buffer.window(self.config.analysis_window);
        let peaks = detect_peaks(&window.samples, fs, &self.config.detector);

        let rr = RRSeries::from_peaks(&peaks.r_peaks, &window.samples);
        let hrv = available("HRV", sdnn(&rr, &self.config.hrv));
        let hrv_time = available("HRV summary", hrv_time(&rr, &self.config.hrv));

        let values = window.values();
        let respiration_signal = match extract_respiration(&values, &peaks) {
            Ok(wave) => {
                let end = window.offset + wave.last_anchor as u64 + 1;
                let start = self.resp_cursor.unwrap_or(window.offset).max(window.offset);
                if end > start {
                    let from = (start - window.offset) as usize;
                    let to = (end - window.offset) as usize;
                    self.respiration.extend(&wave.samples[from..to]);
                    self.resp_cursor = Some(end);
                    trace!("respiration cache +{} -> {}", to - from, self.respiration.len());
                }
                wave.samples
            }
            Err(err) => {
                debug!("respiration signal unavailable: {}", err.into_availability());
                Vec::new()
            }
        };

        let rate_estimate = available(
            "respiratory rate",
            estimate_rate(&self.respiration, fs, &self.config.respiration),
        );

        Snapshot {
            window_offset: window.offset,
            window_len: window.len(),
            heart_rate_bpm: hrv_time.map(|h| h.heart_rate_bpm()),
            hrv,
            hrv_time,
            respiration_signal,
            respiratory_rate: rate_estimate.as_ref().map(|r| r.breaths_per_min),
            rate_estimate,
            respiration_cache_len: self.respiration.len(),
            peaks,
        }
    }

    /// Chart view of the last `len` samples with the snapshot's peaks in it.
    pub fn view(&self, snapshot: &Snapshot, len: usize) -> WindowView {
        let window = self.buffer.window(len);
        let delta = snapshot.window_offset as i64 - window.offset as i64;
        WindowView {
            peaks: snapshot.peaks.reindex(delta, window.len()),
            offset: window.offset,
            samples: window.samples,
        }
    }

    /// [`view`](Self::view) with the configured `view_len`.
    pub fn chart_view(&self, snapshot: &Snapshot) -> WindowView {
        self.view(snapshot, self.config.view_len)
    }

    pub fn summary(&self, snapshot: &Snapshot) -> SessionSummary {
        let duration_s = match (self.first_timestamp_ms, self.buffer.last()) {
            (Some(first), Some(last)) => (last.timestamp_ms - first) as f64 / 1000.0,
            _ => 0.0,
        };
        SessionSummary {
            samples_received: self.buffer.end_offset(),
            samples_rejected: self.buffer.rejected(),
            duration_s,
            heart_rate_bpm: snapshot.heart_rate_bpm,
            hrv_sdnn_ms: snapshot.hrv,
            respiratory_rate: snapshot.respiratory_rate,
        }
    }

    /// Forget all samples and derived state, keeping the configuration.
    pub fn reset(&mut self) {
        self.buffer = EcgBuffer::new(self.config.buffer_retention);
        self.respiration.clear();
        self.resp_cursor = None;
        self.first_timestamp_ms = None;
    }
}

fn available<T>(what: &str, result: Result<T, EcgError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("{} unavailable: {}", what, err.into_availability());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ecg::tests::synthetic_ecg;

    fn session() -> EcgSession {
        EcgSession::new(SessionConfig::default()).unwrap()
    }

    fn stream(session: &mut EcgSession, ecg: &[EcgSample], batch: usize) -> Vec<Snapshot> {
        ecg.chunks(batch).map(|c| session.push_samples(c)).collect()
    }

    #[test]
    fn recovers_heart_and_breathing_rate() {
        let fs = 250.0;
        // 72 bpm, breathing at 0.25 Hz.
        let ecg = synthetic_ecg(fs, &vec![60.0 / 72.0; 72], Some((0.25, 0.2)));
        let mut s = session();
        let snapshots = stream(&mut s, &ecg, 250);
        let last = snapshots.last().unwrap();

        let hr = last.heart_rate_bpm.unwrap();
        assert!((hr - 72.0).abs() < 1.0, "heart rate {hr}");
        assert!(last.hrv.unwrap() < 5.0);
        let rate = last.respiratory_rate.unwrap();
        assert!((rate - 15.0).abs() <= 3.0, "respiratory rate {rate}");
        assert!(snapshots
            .iter()
            .all(|snap| snap.respiration_cache_len <= 5000));
        assert!(snapshots
            .iter()
            .filter_map(|snap| snap.respiratory_rate)
            .all(|r| (5.0..=50.0).contains(&r)));
    }

    #[test]
    fn recompute_is_idempotent() {
        let fs = 250.0;
        let ecg = synthetic_ecg(fs, &vec![0.8; 30], Some((0.25, 0.2)));
        let mut s = session();
        let first = stream(&mut s, &ecg, 500).pop().unwrap();
        let cache_len = s.respiration_cache().len();
        let second = s.recompute();
        assert_eq!(first, second);
        assert_eq!(s.respiration_cache().len(), cache_len);
    }

    #[test]
    fn peaks_stay_inside_window() {
        let fs = 250.0;
        let ecg = synthetic_ecg(fs, &vec![0.9; 40], None);
        let mut s = session();
        for snap in stream(&mut s, &ecg, 333) {
            assert!(snap.window_len <= 5000);
            assert!(snap.peaks.r_peaks.iter().all(|&r| r < snap.window_len));
            for (r, s) in snap.peaks.pairs() {
                assert!(s > r && s < snap.window_len);
            }
        }
    }

    #[test]
    fn too_few_beats_leaves_metrics_unavailable() {
        let fs = 250.0;
        let ecg = synthetic_ecg(fs, &[], None);
        let mut s = session();
        let snap = s.push_samples(&ecg);
        assert!(snap.peaks.r_peaks.len() <= 1);
        assert_eq!(snap.hrv, None);
        assert_eq!(snap.heart_rate_bpm, None);
        assert!(snap.respiration_signal.is_empty());
        assert_eq!(snap.respiratory_rate, None);

        let tiny = s.push_samples(&[]);
        assert_eq!(tiny.respiration_cache_len, 0);
    }

    #[test]
    fn view_reindexes_peaks() {
        let fs = 250.0;
        let ecg = synthetic_ecg(fs, &vec![0.8; 10], None);
        let mut s = session();
        let snap = s.push_samples(&ecg);
        let view = s.view(&snap, 1000);
        assert_eq!(view.samples.len(), 1000);
        assert_eq!(view.offset, (ecg.len() - 1000) as u64);
        let shift = view.offset - snap.window_offset;
        for &r in &view.peaks.r_peaks {
            assert!(snap.peaks.r_peaks.contains(&(r + shift as usize)));
        }
        assert!(!view.peaks.r_peaks.is_empty());
    }

    #[test]
    fn chart_view_uses_configured_length() {
        let fs = 250.0;
        let ecg = synthetic_ecg(fs, &vec![0.8; 10], None);
        let mut s = EcgSession::new(SessionConfig {
            view_len: 600,
            ..SessionConfig::default()
        })
        .unwrap();
        let snap = s.push_samples(&ecg);
        let view = s.chart_view(&snap);
        assert_eq!(view.samples.len(), 600);
        assert_eq!(view, s.view(&snap, 600));
    }

    #[test]
    fn summary_and_reset() {
        let fs = 250.0;
        let ecg = synthetic_ecg(fs, &vec![0.8; 20], None);
        let mut s = session();
        let snap = stream(&mut s, &ecg, 250).pop().unwrap();
        let summary = s.summary(&snap);
        assert_eq!(summary.samples_received, ecg.len() as u64);
        assert_eq!(summary.samples_rejected, 0);
        let expected = (ecg.last().unwrap().timestamp_ms - ecg[0].timestamp_ms) as f64 / 1000.0;
        assert!((summary.duration_s - expected).abs() < 1e-9);
        assert!((summary.heart_rate_bpm.unwrap() - 75.0).abs() < 1.0);

        s.reset();
        assert!(s.buffer().is_empty());
        assert!(s.respiration_cache().is_empty());
        assert_eq!(s.summary(&Snapshot::default()).duration_s, 0.0);
    }

    #[test]
    fn snapshot_serialises_flat_peak_lists() {
        let snap = Snapshot {
            peaks: PeakSet {
                r_peaks: vec![10],
                s_peaks: vec![20],
            },
            ..Snapshot::default()
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["r_peaks"][0], 10);
        assert_eq!(json["s_peaks"][0], 20);
        assert!(json["hrv"].is_null());
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = SessionConfig {
            sampling_rate_hz: 0.0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            EcgSession::new(cfg),
            Err(EcgError::InvalidConfig(_))
        ));
    }

    fn assert_send<T: Send>() {}

    #[test]
    fn session_is_send() {
        assert_send::<EcgSession>();
    }
}
