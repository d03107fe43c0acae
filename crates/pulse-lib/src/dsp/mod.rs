pub mod biquad;
pub mod fft;
pub mod smooth;
pub mod spline;
pub mod zero_cross;

pub use biquad::Biquad;
pub use fft::{dominant_frequency, magnitude_spectrum, Spectrum};
pub use smooth::{mean, median, moving_average, remove_mean, sample_std_dev};
pub use spline::{normalize_unit, CubicSpline};
pub use zero_cross::{count_zero_crossings, ZeroCrossings};
