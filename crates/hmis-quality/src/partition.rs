//! Group partitioning.
//!
//! Splits a [`FacilityDataset`] into one [`GroupSeries`] per facility for a
//! single metric. Groups keep their first-appearance order and each series
//! keeps the input order of its rows.

use crate::dataset::FacilityDataset;
use crate::error::Result;
use crate::utils::is_missing;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// The (period, value) points of one group for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSeries {
    pub group: String,
    pub periods: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl GroupSeries {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            periods: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, period: NaiveDate, value: Option<f64>) {
        self.periods.push(period);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| is_missing(**v)).count()
    }
}

pub struct GroupPartitioner;

impl GroupPartitioner {
    /// Partition `dataset` by grouping key for `metric`.
    ///
    /// Groups whose values are all missing are kept; the validator reports
    /// them downstream.
    pub fn partition(dataset: &FacilityDataset, metric: &str) -> Result<Vec<GroupSeries>> {
        let metric_idx = dataset.metric_index(metric)?;

        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<GroupSeries> = Vec::new();

        for record in dataset.records() {
            let idx = *positions.entry(record.group.as_str()).or_insert_with(|| {
                groups.push(GroupSeries::new(record.group.as_str()));
                groups.len() - 1
            });
            groups[idx].push(record.period, record.values[metric_idx]);
        }

        debug!(
            "Partitioned {} rows of '{}' into {} groups",
            dataset.len(),
            metric,
            groups.len()
        );
        Ok(groups)
    }
}
