use thiserror::Error;

/// Reasons a metric is unavailable for the current recompute.
///
/// None of these are fatal: callers treat every variant as "not available
/// this cycle" and keep feeding samples.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EcgError {
    #[error("insufficient data: {what} (have {have}, need {need})")]
    InsufficientData {
        what: &'static str,
        have: usize,
        need: usize,
    },
    #[error("{what} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("numerically degenerate {0}")]
    NumericDegenerate(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EcgError {
    pub fn insufficient(what: &'static str, have: usize, need: usize) -> Self {
        EcgError::InsufficientData { what, have, need }
    }

    /// Degenerate numerics are reported to callers as missing data.
    pub fn into_availability(self) -> Self {
        match self {
            EcgError::NumericDegenerate(what) => EcgError::InsufficientData {
                what,
                have: 0,
                need: 1,
            },
            other => other,
        }
    }
}

pub type EcgResult<T> = Result<T, EcgError>;
