//! Statistical imputation of group series.

use crate::error::{QualityError, Result};
use crate::partition::GroupSeries;
use crate::utils::{is_missing, median_sorted, sorted_observed};
use chrono::NaiveDate;
use tracing::debug;

/// A group series with every missing value filled.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputedSeries {
    pub group: String,
    pub periods: Vec<NaiveDate>,
    /// Values as recorded.
    pub original: Vec<Option<f64>>,
    /// Values with gaps filled, same length as `original`.
    pub values: Vec<f64>,
    /// The median used to fill gaps.
    pub fill_value: f64,
}

impl ImputedSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn was_missing(&self, idx: usize) -> bool {
        is_missing(self.original[idx])
    }
}

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Median of the observed values, `None` when nothing was observed.
    pub fn median(values: &[Option<f64>]) -> Option<f64> {
        median_sorted(&sorted_observed(values))
    }

    /// Fill every missing value of `series` with the group median.
    ///
    /// # Errors
    ///
    /// Returns [`QualityError::DegenerateGroup`] when the series has no
    /// observed value, since the median is then undefined.
    pub fn impute_median(series: GroupSeries) -> Result<ImputedSeries> {
        let fill_value = Self::median(&series.values)
            .ok_or_else(|| QualityError::DegenerateGroup(series.group.clone()))?;

        let values: Vec<f64> = series
            .values
            .iter()
            .map(|v| match v {
                Some(x) if !x.is_nan() => *x,
                _ => fill_value,
            })
            .collect();

        let filled = series.missing_count();
        if filled > 0 {
            debug!(
                "Filled {} missing values in '{}' with median {:.2}",
                filled, series.group, fill_value
            );
        }

        Ok(ImputedSeries {
            group: series.group,
            periods: series.periods,
            original: series.values,
            values,
            fill_value,
        })
    }
}
