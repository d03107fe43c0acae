//! Second-order IIR section.
//!
//! `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`, evaluated in
//! direct form I so the state is just the last two inputs and outputs.

use crate::error::{EcgError, EcgResult};
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b,
            a,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Band-pass between `low_hz` and `high_hz` with unity gain at the centre.
    ///
    /// Both cut-offs are normalised to Nyquist; the centre is their midpoint
    /// and the bandwidth their difference, giving `Q = centre / bandwidth`.
    pub fn bandpass(low_hz: f64, high_hz: f64, fs: f64) -> EcgResult<Self> {
        let nyquist = fs / 2.0;
        if !(fs > 0.0) || !(low_hz >= 0.0) || !(high_hz > low_hz) || high_hz >= nyquist {
            return Err(EcgError::InvalidConfig(format!(
                "band-pass [{low_hz}, {high_hz}] Hz invalid at fs {fs} Hz"
            )));
        }
        let low = low_hz / nyquist;
        let high = high_hz / nyquist;
        let centre = 0.5 * (low + high);
        let bandwidth = high - low;
        let w0 = PI * centre;
        let q = centre / bandwidth;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        let coeffs = Self::new(
            [alpha / a0, 0.0, -alpha / a0],
            [-2.0 * w0.cos() / a0, (1.0 - alpha) / a0],
        );
        if !coeffs.is_stable() {
            return Err(EcgError::NumericDegenerate("band-pass coefficients"));
        }
        Ok(coeffs)
    }

    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.b[1] * self.x1 + self.b[2] * self.x2
            - self.a[0] * self.y1
            - self.a[1] * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Filter a whole block causally, starting from the current state.
    pub fn filter(&mut self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&x| self.process(x)).collect()
    }

    /// Poles inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a.iter().all(|c| c.is_finite())
            && self.a[1].abs() < 1.0
            && self.a[0].abs() < 1.0 + self.a[1]
    }

    /// Magnitude response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64, fs: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / fs;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = self.b[0] + self.b[1] * c1 + self.b[2] * c2;
        let num_im = self.b[1] * s1 + self.b[2] * s2;
        let den_re = 1.0 + self.a[0] * c1 + self.a[1] * c2;
        let den_im = self.a[0] * s1 + self.a[1] * s2;
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}
