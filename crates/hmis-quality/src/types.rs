use crate::aggregate::{AnomalyTable, DatasetSummary, OutlierSummary};
use crate::config::QuantileThresholds;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Detection result for one (group, period) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub group: String,
    pub period: NaiveDate,
    /// Value as recorded, `None` when it was missing.
    pub value: Option<f64>,
    /// Value the detector classified (median-filled when missing).
    pub imputed_value: f64,
    pub is_outlier: bool,
    pub was_missing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileBounds {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDetection {
    pub group: String,
    pub bounds: QuantileBounds,
    pub fill_value: f64,
    pub records: Vec<AnomalyRecord>,
}

impl GroupDetection {
    pub fn outlier_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_outlier).count()
    }
}

/// A group left out of detection, with the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedGroup {
    pub group: String,
    pub code: String,
    pub reason: String,
}

/// Outcome of running detection on one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Detected(GroupDetection),
    Skipped(SkippedGroup),
}

impl GroupOutcome {
    pub fn group(&self) -> &str {
        match self {
            Self::Detected(detection) => &detection.group,
            Self::Skipped(skipped) => &skipped.group,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Everything one analysis run hands to the display layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub metric: String,
    pub thresholds: QuantileThresholds,
    pub year: Option<i32>,
    pub anomalies: AnomalyTable,
    pub outlier_summary: OutlierSummary,
    pub dataset_summary: DatasetSummary,
    pub skipped: Vec<SkippedGroup>,
    pub duration_ms: u64,
}
