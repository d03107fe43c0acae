pub mod extract;
pub mod rate;

pub use extract::{extract_respiration, RespirationCache, RespirationWave};
pub use rate::{estimate_rate, RateEstimate, RateMethod, RateStrategy, RespirationConfig};
