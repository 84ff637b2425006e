//! Dataset quality checks.
//!
//! Missing-value counts, the completeness ratio and descriptive statistics
//! over the metric columns of a [`FacilityDataset`](crate::dataset::FacilityDataset).

mod analyzer;

pub use analyzer::{
    ColumnMissing, ColumnStatistics, CompletenessReport, DataQualityAnalyzer, MissingValueReport,
    QualityVerdict,
};
