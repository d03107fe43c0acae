use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One ECG reading as delivered by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcgSample {
    /// Milliseconds, monotonically non-decreasing within a session
    pub timestamp_ms: i64,
    pub value: f64,
}

impl EcgSample {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Append-only sample store with bounded retention.
///
/// Every sample gets an absolute index when appended. Once old samples are
/// evicted `start_offset` moves forward, so an absolute index stays
/// meaningful for as long as the sample it names is retained.
#[derive(Debug, Clone)]
pub struct EcgBuffer {
    samples: VecDeque<EcgSample>,
    retention: usize,
    start_offset: u64,
    rejected: u64,
}

impl EcgBuffer {
    pub fn new(retention: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(retention.min(1 << 16)),
            retention: retention.max(1),
            start_offset: 0,
            rejected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Absolute index of the oldest retained sample.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Absolute index one past the newest sample.
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.samples.len() as u64
    }

    /// Number of samples refused because their timestamp went backwards.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn last(&self) -> Option<&EcgSample> {
        self.samples.back()
    }

    /// Append a batch, returning how many samples were accepted.
    pub fn extend(&mut self, batch: &[EcgSample]) -> usize {
        let mut accepted = 0;
        for sample in batch {
            if let Some(last) = self.samples.back() {
                if sample.timestamp_ms < last.timestamp_ms {
                    warn!(
                        "dropping out-of-order sample at {} ms (last {} ms)",
                        sample.timestamp_ms, last.timestamp_ms
                    );
                    self.rejected += 1;
                    continue;
                }
            }
            self.samples.push_back(*sample);
            accepted += 1;
        }
        let excess = self.samples.len().saturating_sub(self.retention);
        if excess > 0 {
            self.samples.drain(..excess);
            self.start_offset += excess as u64;
        }
        accepted
    }

    /// Copy out the newest `len` samples.
    pub fn window(&self, len: usize) -> EcgWindow {
        let len = len.min(self.samples.len());
        let skip = self.samples.len() - len;
        EcgWindow {
            offset: self.start_offset + skip as u64,
            samples: self.samples.iter().skip(skip).copied().collect(),
        }
    }

    pub fn clear(&mut self) {
        self.start_offset = self.end_offset();
        self.samples.clear();
    }
}

/// Contiguous copy of buffer samples plus the absolute index of the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcgWindow {
    pub offset: u64,
    pub samples: Vec<EcgSample>,
}

impl EcgWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.timestamp_ms).collect()
    }

    /// Duration in seconds between first and last sample.
    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0,
            _ => 0.0,
        }
    }
}

/// R- and S-wave sample indices, relative to the window they were found in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSet {
    pub r_peaks: Vec<usize>,
    /// `s_peaks[i]` pairs with `r_peaks[i]`; a trailing R without S is allowed.
    pub s_peaks: Vec<usize>,
}

impl PeakSet {
    pub fn is_empty(&self) -> bool {
        self.r_peaks.is_empty()
    }

    /// Matched (R, S) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.r_peaks.iter().copied().zip(self.s_peaks.iter().copied())
    }

    /// Shift every index by `delta`, dropping those that fall outside `0..len`.
    pub fn reindex(&self, delta: i64, len: usize) -> PeakSet {
        let shift = |idx: usize| -> Option<usize> {
            let moved = idx as i64 + delta;
            (moved >= 0 && (moved as usize) < len).then_some(moved as usize)
        };
        let mut out = PeakSet::default();
        for (r, s) in self.pairs() {
            if let (Some(r), Some(s)) = (shift(r), shift(s)) {
                out.r_peaks.push(r);
                out.s_peaks.push(s);
            }
        }
        if let Some(&r) = self.r_peaks.get(self.s_peaks.len()) {
            if let Some(r) = shift(r) {
                out.r_peaks.push(r);
            }
        }
        out
    }
}

/// RR intervals (milliseconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    /// Differences of consecutive beat timestamps, unfiltered.
    pub fn from_timestamps(timestamps: &[i64]) -> Self {
        let mut rr = Vec::new();
        for w in timestamps.windows(2) {
            rr.push((w[1] - w[0]) as f64);
        }
        Self { rr }
    }

    /// Intervals of the given R-peaks, looked up in `samples`.
    pub fn from_peaks(r_peaks: &[usize], samples: &[EcgSample]) -> Self {
        let timestamps: Vec<i64> = r_peaks
            .iter()
            .filter_map(|&idx| samples.get(idx).map(|s| s.timestamp_ms))
            .collect();
        Self::from_timestamps(&timestamps)
    }

    /// Keep only intervals inside `[min_ms, max_ms]`; the rest are discarded.
    pub fn retain_range(&self, min_ms: f64, max_ms: f64) -> Self {
        Self {
            rr: self
                .rr
                .iter()
                .copied()
                .filter(|&rr| rr >= min_ms && rr <= max_ms)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, start_ms: i64) -> Vec<EcgSample> {
        (0..n)
            .map(|i| EcgSample::new(start_ms + 4 * i as i64, i as f64))
            .collect()
    }

    #[test]
    fn buffer_tracks_offset_after_eviction() {
        let mut buffer = EcgBuffer::new(10);
        assert_eq!(buffer.extend(&ramp(25, 0)), 25);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.start_offset(), 15);
        assert_eq!(buffer.end_offset(), 25);
        let window = buffer.window(4);
        assert_eq!(window.offset, 21);
        assert_eq!(window.values(), vec![21.0, 22.0, 23.0, 24.0]);
    }

    #[test]
    fn buffer_rejects_backwards_timestamps() {
        let mut buffer = EcgBuffer::new(100);
        buffer.extend(&ramp(5, 1000));
        let accepted = buffer.extend(&[EcgSample::new(900, 1.0), EcgSample::new(1016, 2.0)]);
        assert_eq!(accepted, 1);
        assert_eq!(buffer.rejected(), 1);
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn rr_series_filters_without_clamping() {
        let rr = RRSeries::from_timestamps(&[0, 200, 1000, 3500, 4300]);
        assert_eq!(rr.rr, vec![200.0, 800.0, 2500.0, 800.0]);
        let valid = rr.retain_range(300.0, 2000.0);
        assert_eq!(valid.rr, vec![800.0, 800.0]);
    }

    #[test]
    fn reindex_drops_pairs_outside_view() {
        let peaks = PeakSet {
            r_peaks: vec![10, 200, 400],
            s_peaks: vec![20, 210],
        };
        let view = peaks.reindex(-100, 350);
        assert_eq!(view.r_peaks, vec![100, 300]);
        assert_eq!(view.s_peaks, vec![110]);
    }
}
