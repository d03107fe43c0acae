pub mod ecg;

pub use ecg::{detect_peaks, AmplitudeReference, PeakDetectorConfig, ThresholdStrategy};
