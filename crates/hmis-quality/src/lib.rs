//! HMIS Data Quality Library
//!
//! Per-facility outlier detection and dataset quality checks for HMIS
//! exports, built on Polars.
//!
//! # Overview
//!
//! - **Period Normalization**: week, quarter and month-name period labels
//!   mapped to the calendar date the period starts on
//! - **Group Partitioning**: one time series per facility for a chosen metric
//! - **Median Imputation**: gaps filled with the facility's own median
//! - **Quantile Detection**: points outside the facility's empirical
//!   `[Q(low), Q(high)]` range flagged as possible outliers
//! - **Aggregation**: per-facility outlier counts and dataset-level totals,
//!   optionally restricted to one calendar year
//! - **Logical Rules**: rows where one metric is not higher / lower / equal
//!   to another
//! - **Quality Checks**: missing values, completeness ratio, descriptive
//!   statistics
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hmis_quality::{AnalysisConfig, OutlierPipeline};
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("data.csv".into()))?
//!     .finish()?;
//!
//! let config = AnalysisConfig::builder()
//!     .high_quantile(0.99)
//!     .year(2023)
//!     .build()?;
//!
//! let outcome = OutlierPipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run_dataframe(&df, "ANC 1st visit")?;
//!
//! println!(
//!     "{} of {} facilities have possible outliers",
//!     outcome.dataset_summary.groups_with_outliers,
//!     outcome.dataset_summary.total_groups
//! );
//! for skipped in &outcome.skipped {
//!     println!("skipped {}: {}", skipped.group, skipped.reason);
//! }
//! ```
//!
//! # Errors
//!
//! Column, period-format and threshold problems fail the whole run before
//! any facility is processed. A facility with no recorded values is skipped
//! and listed in [`AnalysisOutcome::skipped`]. See [`error::QualityError`].

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod imputers;
pub mod partition;
pub mod period;
pub mod pipeline;
pub mod quality;
pub mod registry;
pub mod reporting;
pub mod rules;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use aggregate::{
    Aggregation, AnnotatedOutlierCount, AnomalyTable, DatasetSummary, GroupOutlierCount,
    OutlierSummary, ResultAggregator,
};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, ConfigValidationError, QuantileThresholds, RecordOrder,
};
pub use dataset::{DatasetSchema, FacilityDataset, FacilityRecord};
pub use detection::QuantileDetector;
pub use error::{QualityError, Result as QualityResult, ResultExt};
pub use imputers::{ImputedSeries, StatisticalImputer};
pub use partition::{GroupPartitioner, GroupSeries};
pub use period::{PeriodFormat, PeriodNormalizer};
pub use pipeline::{
    AnalysisStage, ClosureProgressReporter, GroupExecutor, OutlierPipeline, OutlierPipelineBuilder,
    ProgressReporter, ProgressUpdate,
};
pub use quality::{CompletenessReport, DataQualityAnalyzer, MissingValueReport, QualityVerdict};
pub use registry::FacilityRegistry;
pub use reporting::{AnalysisReport, QualitySection, ReportGenerator, ReportParams};
pub use rules::{LogicalRuleChecker, Relationship, RuleCheck, RuleViolation};
pub use types::{
    AnalysisOutcome, AnomalyRecord, GroupDetection, GroupOutcome, QuantileBounds, SkippedGroup,
};
