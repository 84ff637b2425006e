//! Quantile anomaly detection.
//!
//! For each group the detector fits the empirical low and high quantiles of
//! the median-imputed series and flags every point strictly outside that
//! range. Quantiles use linear interpolation between order statistics (see
//! [`quantile_linear`]), so the same input always yields the same flags.

use crate::config::QuantileThresholds;
use crate::error::{QualityError, Result};
use crate::imputers::{ImputedSeries, StatisticalImputer};
use crate::partition::GroupSeries;
use crate::types::{AnomalyRecord, GroupDetection, GroupOutcome, QuantileBounds, SkippedGroup};
use crate::utils::quantile_linear;
use tracing::warn;

/// Classifies points outside `[Q(low), Q(high)]` as outliers.
#[derive(Debug, Clone, Copy)]
pub struct QuantileDetector {
    thresholds: QuantileThresholds,
}

impl QuantileDetector {
    /// Create a detector, validating `0 < low < high < 1`.
    pub fn new(thresholds: QuantileThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> QuantileThresholds {
        self.thresholds
    }

    /// Fit quantile bounds on complete values.
    pub fn bounds(&self, values: &[f64]) -> Option<QuantileBounds> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(QuantileBounds {
            low: quantile_linear(&sorted, self.thresholds.low)?,
            high: quantile_linear(&sorted, self.thresholds.high)?,
        })
    }

    /// Run detection on an imputed series.
    pub fn detect(&self, series: &ImputedSeries) -> Result<GroupDetection> {
        let bounds = self
            .bounds(&series.values)
            .ok_or_else(|| QualityError::DegenerateGroup(series.group.clone()))?;

        let records = series
            .values
            .iter()
            .enumerate()
            .map(|(idx, &imputed)| AnomalyRecord {
                group: series.group.clone(),
                period: series.periods[idx],
                value: series.original[idx].filter(|v| !v.is_nan()),
                imputed_value: imputed,
                is_outlier: imputed < bounds.low || imputed > bounds.high,
                was_missing: series.was_missing(idx),
            })
            .collect();

        Ok(GroupDetection {
            group: series.group.clone(),
            bounds,
            fill_value: series.fill_value,
            records,
        })
    }

    /// Impute and detect one group, turning recoverable failures into a skip.
    pub fn detect_group(&self, series: GroupSeries) -> Result<GroupOutcome> {
        let group = series.group.clone();
        let result =
            StatisticalImputer::impute_median(series).and_then(|imputed| self.detect(&imputed));

        match result {
            Ok(detection) => Ok(GroupOutcome::Detected(detection)),
            Err(e) if e.is_recoverable() => {
                warn!("Skipping group '{}': {}", group, e);
                Ok(GroupOutcome::Skipped(SkippedGroup {
                    group,
                    code: e.error_code().to_string(),
                    reason: e.to_string(),
                }))
            }
            Err(e) => Err(e),
        }
    }
}
