//! Imputation module for handling missing values.
//!
//! Missing values in a group's series are filled with the median of that
//! group's observed values so the anomaly detector can run on a complete
//! array.

mod statistical;

pub use statistical::{ImputedSeries, StatisticalImputer};
