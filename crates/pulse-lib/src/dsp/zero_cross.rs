/// Zero crossings found with a hysteresis band.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZeroCrossings {
    /// Sample index at which each crossing was confirmed.
    pub positions: Vec<usize>,
}

impl ZeroCrossings {
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    /// Oscillation frequency in Hz over a window of `window_len` samples:
    /// `crossings / window_seconds / 2`. Fewer than two crossings is `None`.
    pub fn frequency(&self, fs: f64, window_len: usize) -> Option<f64> {
        if self.positions.len() < 2 || window_len == 0 || !(fs > 0.0) {
            return None;
        }
        let window_s = window_len as f64 / fs;
        Some(self.count() as f64 / window_s / 2.0)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Unknown,
    Above,
    Below,
}

/// Count sign changes, ignoring excursions inside `±threshold`.
///
/// A crossing is only counted when the signal moves from definitively above
/// `+threshold` to definitively below `-threshold`, or the reverse.
pub fn count_zero_crossings(signal: &[f64], threshold: f64) -> ZeroCrossings {
    let threshold = threshold.abs();
    let mut side = Side::Unknown;
    let mut positions = Vec::new();
    for (i, &x) in signal.iter().enumerate() {
        if x > threshold {
            if side == Side::Below {
                positions.push(i);
            }
            side = Side::Above;
        } else if x < -threshold {
            if side == Side::Above {
                positions.push(i);
            }
            side = Side::Below;
        }
    }
    ZeroCrossings { positions }
}
