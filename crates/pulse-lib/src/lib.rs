//! Streaming single-lead ECG processing: R/S peak detection, SDNN heart-rate
//! variability and ECG-derived respiration rate.
//!
//! Feed sample batches into an [`EcgSession`]; each push recomputes a
//! [`Snapshot`] over the newest analysis window.

pub mod config;
pub mod detectors;
pub mod dsp;
pub mod error;
pub mod metrics;
pub mod respiration;
pub mod session;
pub mod signal;

pub use config::SessionConfig;
pub use detectors::*;
pub use error::{EcgError, EcgResult};
pub use metrics::*;
pub use respiration::*;
pub use session::{EcgSession, SessionSummary, Snapshot, WindowView};
pub use signal::*;
