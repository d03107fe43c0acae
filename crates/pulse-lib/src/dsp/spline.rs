use crate::error::{EcgError, EcgResult};

/// Natural cubic spline through unevenly spaced control points.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot; zero at both ends.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit through `(xs[i], ys[i])`. `xs` must be strictly increasing.
    pub fn natural(xs: &[f64], ys: &[f64]) -> EcgResult<Self> {
        let n = xs.len();
        if n != ys.len() {
            return Err(EcgError::InvalidConfig(format!(
                "spline knots: {} x values vs {} y values",
                n,
                ys.len()
            )));
        }
        if n < 2 {
            return Err(EcgError::insufficient("spline knots", n, 2));
        }
        if xs.windows(2).any(|w| !(w[1] > w[0])) || ys.iter().any(|y| !y.is_finite()) {
            return Err(EcgError::NumericDegenerate("spline knots"));
        }

        // Thomas algorithm on the interior second derivatives.
        let mut m = vec![0.0; n];
        if n > 2 {
            let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
            let inner = n - 2;
            let mut diag = vec![0.0; inner];
            let mut rhs = vec![0.0; inner];
            for i in 0..inner {
                diag[i] = 2.0 * (h[i] + h[i + 1]);
                rhs[i] = 6.0 * ((ys[i + 2] - ys[i + 1]) / h[i + 1] - (ys[i + 1] - ys[i]) / h[i]);
            }
            for i in 1..inner {
                let w = h[i] / diag[i - 1];
                diag[i] -= w * h[i];
                rhs[i] -= w * rhs[i - 1];
            }
            m[inner] = rhs[inner - 1] / diag[inner - 1];
            for i in (0..inner - 1).rev() {
                m[i + 1] = (rhs[i] - h[i + 1] * m[i + 2]) / diag[i];
            }
        }
        if m.iter().any(|v| !v.is_finite()) {
            return Err(EcgError::NumericDegenerate("spline second derivatives"));
        }
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m,
        })
    }

    /// Value at `x`; outside the knot range the end values are held.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        let k = self.xs.partition_point(|&xi| xi <= x).saturating_sub(1).min(n - 2);
        let h = self.xs[k + 1] - self.xs[k];
        let a = (self.xs[k + 1] - x) / h;
        let b = (x - self.xs[k]) / h;
        a * self.ys[k]
            + b * self.ys[k + 1]
            + ((a.powi(3) - a) * self.m[k] + (b.powi(3) - b) * self.m[k + 1]) * h * h / 6.0
    }

    /// Evaluate at every integer index `0..len`.
    pub fn resample(&self, len: usize) -> Vec<f64> {
        (0..len).map(|i| self.eval(i as f64)).collect()
    }

    pub fn last_x(&self) -> f64 {
        self.xs[self.xs.len() - 1]
    }
}

/// Zero-mean the signal, then divide by its largest absolute deviation.
pub fn normalize_unit(data: &mut [f64]) -> EcgResult<()> {
    if data.is_empty() {
        return Err(EcgError::insufficient("normalisation input", 0, 1));
    }
    super::smooth::remove_mean(data);
    let scale = data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !scale.is_finite() || scale <= 1e-12 {
        return Err(EcgError::NumericDegenerate("zero-variance signal"));
    }
    for v in data.iter_mut() {
        *v /= scale;
    }
    Ok(())
}
