//! Anomaly detection module.
//!
//! Provides the quantile anomaly detector applied to each facility's
//! imputed series.

mod quantile;

pub use quantile::QuantileDetector;
