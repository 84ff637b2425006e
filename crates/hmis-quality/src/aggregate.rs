//! Result aggregation.
//!
//! Merges per-group detection outcomes into one [`AnomalyTable`] and derives
//! the facility-level [`OutlierSummary`] and dataset-level [`DatasetSummary`].
//! All counts are recomputed from the records on every call; nothing is
//! updated incrementally.

use crate::config::RecordOrder;
use crate::error::{QualityError, Result};
use crate::registry::FacilityRegistry;
use crate::types::{AnomalyRecord, GroupOutcome, SkippedGroup};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// Anomaly table
// ============================================================================

/// Every detected record across all groups, in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyTable {
    records: Vec<AnomalyRecord>,
}

impl AnomalyTable {
    /// Build a table, sorting records by `order`.
    ///
    /// Records of a group that share a period keep their input order.
    pub fn from_records(mut records: Vec<AnomalyRecord>, order: RecordOrder) -> Self {
        match order {
            RecordOrder::GroupThenTime => {
                records.sort_by(|a, b| a.group.cmp(&b.group).then(a.period.cmp(&b.period)))
            }
            RecordOrder::TimeThenGroup => {
                records.sort_by(|a, b| a.period.cmp(&b.period).then(a.group.cmp(&b.group)))
            }
        }
        Self { records }
    }

    pub fn records(&self) -> &[AnomalyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only records whose period falls in `year`.
    pub fn filter_year(&self, year: i32) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| r.period.year() == year)
                .cloned()
                .collect(),
        }
    }

    /// Distinct groups in the table, sorted by name.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.records.iter().map(|r| r.group.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    pub fn group_records<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a AnomalyRecord> + 'a {
        self.records.iter().filter(move |r| r.group == group)
    }

    /// Groups with at least one flagged record, sorted by name.
    pub fn groups_with_outliers(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self
            .records
            .iter()
            .filter(|r| r.is_outlier)
            .map(|r| r.group.as_str())
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    /// Per-group outlier and missing counts.
    pub fn outlier_summary(&self) -> OutlierSummary {
        let mut counts: BTreeMap<&str, GroupOutlierCount> = BTreeMap::new();
        for record in &self.records {
            let entry = counts
                .entry(record.group.as_str())
                .or_insert_with(|| GroupOutlierCount {
                    group: record.group.clone(),
                    ..Default::default()
                });
            entry.time_points += 1;
            entry.outlier_count += usize::from(record.is_outlier);
            entry.missing_count += usize::from(record.was_missing);
        }

        let mut rows: Vec<GroupOutlierCount> = counts.into_values().collect();
        rows.sort_by(|a, b| {
            b.outlier_count
                .cmp(&a.outlier_count)
                .then_with(|| a.group.cmp(&b.group))
        });
        OutlierSummary { rows }
    }

    /// Export as a frame with columns `group_column`, `period`, `metric`,
    /// `imputed_value`, `outlier` and `missing`.
    pub fn to_dataframe(&self, group_column: &str, metric: &str) -> Result<DataFrame> {
        let groups: Vec<&str> = self.records.iter().map(|r| r.group.as_str()).collect();
        let periods: Vec<NaiveDate> = self.records.iter().map(|r| r.period).collect();
        let values: Vec<Option<f64>> = self.records.iter().map(|r| r.value).collect();
        let imputed: Vec<f64> = self.records.iter().map(|r| r.imputed_value).collect();
        let outliers: Vec<bool> = self.records.iter().map(|r| r.is_outlier).collect();
        let missing: Vec<bool> = self.records.iter().map(|r| r.was_missing).collect();

        let df = DataFrame::new(vec![
            Series::new(group_column.into(), groups).into(),
            Series::new("period".into(), periods).into(),
            Series::new(metric.into(), values).into(),
            Series::new("imputed_value".into(), imputed).into(),
            Series::new("outlier".into(), outliers).into(),
            Series::new("missing".into(), missing).into(),
        ])?;
        Ok(df)
    }
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutlierCount {
    pub group: String,
    pub outlier_count: usize,
    pub missing_count: usize,
    pub time_points: usize,
}

/// Outlier counts per group, most outliers first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlierSummary {
    rows: Vec<GroupOutlierCount>,
}

/// An outlier count joined with the facility master list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedOutlierCount {
    pub facility: String,
    pub outlier_count: usize,
    pub missing_count: usize,
    pub district: String,
}

impl OutlierSummary {
    pub fn rows(&self) -> &[GroupOutlierCount] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Outlier count of `group`, `None` if the group is absent.
    pub fn count_for(&self, group: &str) -> Option<usize> {
        self.rows
            .iter()
            .find(|row| row.group == group)
            .map(|row| row.outlier_count)
    }

    pub fn dataset_summary(&self) -> DatasetSummary {
        DatasetSummary {
            total_groups: self.rows.len(),
            groups_with_outliers: self.rows.iter().filter(|r| r.outlier_count > 0).count(),
            total_outliers: self.rows.iter().map(|r| r.outlier_count).sum(),
            total_missing: self.rows.iter().map(|r| r.missing_count).sum(),
        }
    }

    /// Attach districts, dropping facilities absent from `registry`.
    pub fn annotate(&self, registry: &FacilityRegistry) -> Vec<AnnotatedOutlierCount> {
        self.rows
            .iter()
            .filter_map(|row| {
                registry.district(&row.group).map(|district| AnnotatedOutlierCount {
                    facility: row.group.clone(),
                    outlier_count: row.outlier_count,
                    missing_count: row.missing_count,
                    district: district.to_string(),
                })
            })
            .collect()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let df = df![
            "Facility" => self.rows.iter().map(|r| r.group.as_str()).collect::<Vec<_>>(),
            "Outlier Count" => self.rows.iter().map(|r| r.outlier_count as u64).collect::<Vec<_>>(),
            "Counts of Missing Values" => self.rows.iter().map(|r| r.missing_count as u64).collect::<Vec<_>>(),
            "Time Points" => self.rows.iter().map(|r| r.time_points as u64).collect::<Vec<_>>(),
        ]?;
        Ok(df)
    }

    /// Export the registry-annotated rows with a `District` column.
    pub fn to_annotated_dataframe(&self, registry: &FacilityRegistry) -> Result<DataFrame> {
        let rows = self.annotate(registry);
        let df = df![
            "Facility" => rows.iter().map(|r| r.facility.as_str()).collect::<Vec<_>>(),
            "Outlier Count" => rows.iter().map(|r| r.outlier_count as u64).collect::<Vec<_>>(),
            "Counts of Missing Values" => rows.iter().map(|r| r.missing_count as u64).collect::<Vec<_>>(),
            "District" => rows.iter().map(|r| r.district.as_str()).collect::<Vec<_>>(),
        ]?;
        Ok(df)
    }
}

/// Dataset-level outlier statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_groups: usize,
    pub groups_with_outliers: usize,
    pub total_outliers: usize,
    pub total_missing: usize,
}

impl DatasetSummary {
    /// Share of groups with at least one outlier, in percent.
    ///
    /// # Errors
    ///
    /// [`QualityError::DivisionUndefined`] when there are no groups.
    pub fn percentage_with_outliers(&self) -> Result<f64> {
        if self.total_groups == 0 {
            return Err(QualityError::DivisionUndefined("total_groups".to_string()));
        }
        Ok(self.groups_with_outliers as f64 / self.total_groups as f64 * 100.0)
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Output of [`ResultAggregator::aggregate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub anomalies: AnomalyTable,
    pub outlier_summary: OutlierSummary,
    pub dataset_summary: DatasetSummary,
    pub skipped: Vec<SkippedGroup>,
}

pub struct ResultAggregator;

impl ResultAggregator {
    /// Merge group outcomes into one table and derive the summaries.
    ///
    /// With `year` set, records outside that calendar year are dropped before
    /// anything is counted, so groups with no record in the year disappear
    /// from the totals. Skipped groups are returned sorted by name.
    pub fn aggregate(outcomes: Vec<GroupOutcome>, order: RecordOrder, year: Option<i32>) -> Aggregation {
        let mut records = Vec::new();
        let mut skipped = Vec::new();

        for outcome in outcomes {
            match outcome {
                GroupOutcome::Detected(detection) => records.extend(detection.records),
                GroupOutcome::Skipped(skip) => skipped.push(skip),
            }
        }
        skipped.sort_by(|a, b| a.group.cmp(&b.group));

        let mut anomalies = AnomalyTable::from_records(records, order);
        if let Some(year) = year {
            anomalies = anomalies.filter_year(year);
        }

        let outlier_summary = anomalies.outlier_summary();
        let dataset_summary = outlier_summary.dataset_summary();

        debug!(
            "Aggregated {} records from {} groups ({} skipped)",
            anomalies.len(),
            dataset_summary.total_groups,
            skipped.len()
        );

        Aggregation {
            anomalies,
            outlier_summary,
            dataset_summary,
            skipped,
        }
    }
}
