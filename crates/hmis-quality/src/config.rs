//! Configuration types for the data quality analyzer.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic analysis setup.

use crate::error::QualityError;
use serde::{Deserialize, Serialize};

/// Default grouping column used by HMIS exports.
pub const DEFAULT_GROUP_COLUMN: &str = "organisationunitname";

/// Default period column used by HMIS exports.
pub const DEFAULT_PERIOD_COLUMN: &str = "periodname";

/// Lower quantile used when none is configured.
pub const DEFAULT_LOW_QUANTILE: f64 = 0.0000001;

/// Upper quantile used when none is configured.
pub const DEFAULT_HIGH_QUANTILE: f64 = 0.999999999;

/// Quantile bounds for the anomaly detector.
///
/// Values strictly below the `low` quantile or strictly above the `high`
/// quantile of a group's series are classified as outliers. Both bounds
/// must satisfy `0 < low < high < 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for QuantileThresholds {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_QUANTILE,
            high: DEFAULT_HIGH_QUANTILE,
        }
    }
}

impl QuantileThresholds {
    /// Create validated thresholds.
    pub fn new(low: f64, high: f64) -> Result<Self, QualityError> {
        let thresholds = Self { low, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check `0 < low < high < 1`.
    pub fn validate(&self) -> Result<(), QualityError> {
        // NaN fails every comparison below, so it is rejected too
        let ordered = self.low > 0.0 && self.low < self.high && self.high < 1.0;
        if ordered {
            Ok(())
        } else {
            Err(QualityError::InvalidThreshold {
                low: self.low,
                high: self.high,
            })
        }
    }
}

/// Ordering of the aggregated anomaly table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordOrder {
    /// Sort by group, then by period
    #[default]
    GroupThenTime,
    /// Sort by period, then by group
    TimeThenGroup,
}

/// Configuration for an outlier analysis run.
///
/// Use [`AnalysisConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use hmis_quality::config::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .group_column("facility")
///     .high_quantile(0.99)
///     .year(2023)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Column holding the facility / organisation unit name.
    /// Default: "organisationunitname"
    pub group_column: String,

    /// Column holding the period labels.
    /// Default: "periodname"
    pub period_column: String,

    /// Quantile bounds applied uniformly to every group.
    pub thresholds: QuantileThresholds,

    /// Range the user may move the high quantile within, inclusive.
    /// Default: (0.9, 0.999999999)
    pub high_range: (f64, f64),

    /// Restrict summary counts to a single calendar year.
    /// Default: None
    pub year: Option<i32>,

    /// Ordering of the aggregated anomaly table.
    /// Default: GroupThenTime
    pub record_order: RecordOrder,

    /// Whether to process groups on the rayon thread pool.
    /// Default: true
    pub parallel: bool,

    /// Summed per-column missing percentage at which the dataset is flagged.
    /// Default: 10.0
    pub missing_alert_percent: f64,

    /// Completeness ratio below which the dataset is flagged (0.0 - 1.0).
    /// Default: 0.8
    pub completeness_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            group_column: DEFAULT_GROUP_COLUMN.to_string(),
            period_column: DEFAULT_PERIOD_COLUMN.to_string(),
            thresholds: QuantileThresholds::default(),
            high_range: (0.9, DEFAULT_HIGH_QUANTILE),
            year: None,
            record_order: RecordOrder::default(),
            parallel: true,
            missing_alert_percent: 10.0,
            completeness_threshold: 0.8,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.group_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyColumnName("group_column"));
        }
        if self.period_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyColumnName("period_column"));
        }
        if self.group_column == self.period_column {
            return Err(ConfigValidationError::SameColumn(self.group_column.clone()));
        }

        if self.thresholds.validate().is_err() {
            return Err(ConfigValidationError::InvalidQuantiles {
                low: self.thresholds.low,
                high: self.thresholds.high,
            });
        }

        let (min, max) = self.high_range;
        if !(min > 0.0 && min <= max && max < 1.0) {
            return Err(ConfigValidationError::InvalidHighRange { min, max });
        }
        if !(min..=max).contains(&self.thresholds.high) {
            return Err(ConfigValidationError::HighOutOfRange {
                value: self.thresholds.high,
                min,
                max,
            });
        }

        if !(0.0..=100.0).contains(&self.missing_alert_percent) {
            return Err(ConfigValidationError::InvalidPercentage {
                field: "missing_alert_percent".to_string(),
                value: self.missing_alert_percent,
            });
        }

        if !(0.0..=1.0).contains(&self.completeness_threshold) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "completeness_threshold".to_string(),
                value: self.completeness_threshold,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Column name for '{0}' must not be empty")]
    EmptyColumnName(&'static str),

    #[error("Grouping and period columns must differ (both are '{0}')")]
    SameColumn(String),

    #[error("Invalid quantiles: low={low}, high={high} (need 0 < low < high < 1)")]
    InvalidQuantiles { low: f64, high: f64 },

    #[error("Invalid high quantile range: [{min}, {max}]")]
    InvalidHighRange { min: f64, max: f64 },

    #[error("High quantile {value} outside the allowed range [{min}, {max}]")]
    HighOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Invalid percentage for '{field}': {value} (must be between 0 and 100)")]
    InvalidPercentage { field: String, value: f64 },

    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },
}

impl From<ConfigValidationError> for QualityError {
    fn from(err: ConfigValidationError) -> Self {
        QualityError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`AnalysisConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    group_column: Option<String>,
    period_column: Option<String>,
    low_quantile: Option<f64>,
    high_quantile: Option<f64>,
    high_range: Option<(f64, f64)>,
    year: Option<i32>,
    record_order: Option<RecordOrder>,
    parallel: Option<bool>,
    missing_alert_percent: Option<f64>,
    completeness_threshold: Option<f64>,
}

impl AnalysisConfigBuilder {
    /// Set the grouping (facility) column.
    pub fn group_column(mut self, column: impl Into<String>) -> Self {
        self.group_column = Some(column.into());
        self
    }

    /// Set the period label column.
    pub fn period_column(mut self, column: impl Into<String>) -> Self {
        self.period_column = Some(column.into());
        self
    }

    /// Set the lower quantile.
    pub fn low_quantile(mut self, low: f64) -> Self {
        self.low_quantile = Some(low);
        self
    }

    /// Set the upper quantile.
    ///
    /// Must lie inside the configured [`high_range`](Self::high_range).
    pub fn high_quantile(mut self, high: f64) -> Self {
        self.high_quantile = Some(high);
        self
    }

    /// Set the allowed range for the upper quantile.
    pub fn high_range(mut self, min: f64, max: f64) -> Self {
        self.high_range = Some((min, max));
        self
    }

    /// Restrict summary counts to one calendar year.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Set the ordering of the aggregated anomaly table.
    pub fn record_order(mut self, order: RecordOrder) -> Self {
        self.record_order = Some(order);
        self
    }

    /// Enable or disable parallel group processing.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Set the missing percentage that flags poor quality.
    pub fn missing_alert_percent(mut self, percent: f64) -> Self {
        self.missing_alert_percent = Some(percent);
        self
    }

    /// Set the minimum acceptable completeness ratio.
    pub fn completeness_threshold(mut self, threshold: f64) -> Self {
        self.completeness_threshold = Some(threshold);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalysisConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalysisConfig, ConfigValidationError> {
        let defaults = AnalysisConfig::default();
        let config = AnalysisConfig {
            group_column: self.group_column.unwrap_or(defaults.group_column),
            period_column: self.period_column.unwrap_or(defaults.period_column),
            thresholds: QuantileThresholds {
                low: self.low_quantile.unwrap_or(DEFAULT_LOW_QUANTILE),
                high: self.high_quantile.unwrap_or(DEFAULT_HIGH_QUANTILE),
            },
            high_range: self.high_range.unwrap_or(defaults.high_range),
            year: self.year,
            record_order: self.record_order.unwrap_or_default(),
            parallel: self.parallel.unwrap_or(true),
            missing_alert_percent: self
                .missing_alert_percent
                .unwrap_or(defaults.missing_alert_percent),
            completeness_threshold: self
                .completeness_threshold
                .unwrap_or(defaults.completeness_threshold),
        };

        config.validate()?;
        Ok(config)
    }
}
