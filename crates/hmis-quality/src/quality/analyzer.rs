use crate::dataset::FacilityDataset;
use crate::error::{QualityError, Result};
use crate::utils::{is_missing, quantile_linear, round_to, sorted_observed};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Pass/fail outcome of a dataset-level check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityVerdict {
    Good,
    Poor,
}

impl QualityVerdict {
    pub fn is_good(self) -> bool {
        self == Self::Good
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing_count: usize,
    /// Share of rows missing, rounded to a whole percent.
    pub missing_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingValueReport {
    pub columns: Vec<ColumnMissing>,
    /// Sum of the per-column percentages.
    pub total_missing_percent: f64,
    /// Rows with at least one missing metric.
    pub flagged_rows: Vec<usize>,
    pub verdict: QualityVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub non_missing_cells: usize,
    pub total_cells: usize,
    /// `non_missing_cells / total_cells`, rounded to two decimals.
    pub ratio: f64,
    pub verdict: QualityVerdict,
}

/// Descriptive statistics of one metric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation, `None` below two observations.
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

pub struct DataQualityAnalyzer;

impl DataQualityAnalyzer {
    /// Per-column missing counts and the rows that contain gaps.
    ///
    /// The dataset is flagged poor when the summed column percentages reach
    /// `alert_percent`.
    pub fn missing_values(dataset: &FacilityDataset, alert_percent: f64) -> Result<MissingValueReport> {
        if dataset.is_empty() {
            return Err(QualityError::DivisionUndefined("row count".to_string()));
        }
        let rows = dataset.len() as f64;

        let columns: Vec<ColumnMissing> = dataset
            .metric_names()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let missing_count = dataset
                    .records()
                    .iter()
                    .filter(|r| is_missing(r.values[idx]))
                    .count();
                ColumnMissing {
                    column: name.clone(),
                    missing_count,
                    missing_percent: round_to(missing_count as f64 / rows * 100.0, 0),
                }
            })
            .collect();

        let flagged_rows = dataset
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.values.iter().any(|v| is_missing(*v)))
            .map(|(row, _)| row)
            .collect();

        let total_missing_percent: f64 = columns.iter().map(|c| c.missing_percent).sum();
        let verdict = if total_missing_percent >= alert_percent {
            warn!(
                "Poor data quality: {:.0}% missing values (alert at {:.0}%)",
                total_missing_percent, alert_percent
            );
            QualityVerdict::Poor
        } else {
            QualityVerdict::Good
        };

        Ok(MissingValueReport {
            columns,
            total_missing_percent,
            flagged_rows,
            verdict,
        })
    }

    /// Fraction of non-missing cells over all metric cells.
    pub fn completeness(dataset: &FacilityDataset, threshold: f64) -> Result<CompletenessReport> {
        let (rows, cols) = dataset.shape();
        let total_cells = rows * cols;
        if total_cells == 0 {
            return Err(QualityError::DivisionUndefined("cell count".to_string()));
        }

        let non_missing_cells = dataset
            .records()
            .iter()
            .flat_map(|r| r.values.iter())
            .filter(|v| !is_missing(**v))
            .count();
        let ratio = round_to(non_missing_cells as f64 / total_cells as f64, 2);

        debug!(
            "Completeness {}/{} cells = {:.2}",
            non_missing_cells, total_cells, ratio
        );

        Ok(CompletenessReport {
            non_missing_cells,
            total_cells,
            ratio,
            verdict: if ratio >= threshold {
                QualityVerdict::Good
            } else {
                QualityVerdict::Poor
            },
        })
    }

    /// Count, mean, spread and quartiles of every metric column.
    pub fn describe(dataset: &FacilityDataset) -> Vec<ColumnStatistics> {
        dataset
            .metric_names()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let values: Vec<Option<f64>> =
                    dataset.records().iter().map(|r| r.values[idx]).collect();
                Self::column_statistics(name, &values)
            })
            .collect()
    }

    fn column_statistics(name: &str, values: &[Option<f64>]) -> ColumnStatistics {
        let sorted = sorted_observed(values);
        let count = sorted.len();

        let mean = (count > 0).then(|| sorted.iter().sum::<f64>() / count as f64);
        let std = match (mean, count) {
            (Some(m), n) if n > 1 => {
                let ss: f64 = sorted.iter().map(|v| (v - m).powi(2)).sum();
                Some((ss / (n - 1) as f64).sqrt())
            }
            _ => None,
        };

        ColumnStatistics {
            column: name.to_string(),
            count,
            mean,
            std,
            min: sorted.first().copied(),
            q25: quantile_linear(&sorted, 0.25),
            median: quantile_linear(&sorted, 0.5),
            q75: quantile_linear(&sorted, 0.75),
            max: sorted.last().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FacilityRecord;
    use chrono::NaiveDate;

    fn dataset(rows: Vec<Vec<Option<f64>>>) -> FacilityDataset {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| FacilityRecord {
                period: NaiveDate::from_ymd_opt(2023, 1 + i as u32, 1).unwrap(),
                group: "Clinic A".to_string(),
                values,
            })
            .collect();
        FacilityDataset::new(vec!["anc1".to_string(), "anc4".to_string()], records).unwrap()
    }

    #[test]
    fn test_missing_values_report() {
        let ds = dataset(vec![
            vec![Some(1.0), None],
            vec![Some(2.0), Some(3.0)],
            vec![None, Some(4.0)],
            vec![Some(5.0), Some(6.0)],
        ]);

        let report = DataQualityAnalyzer::missing_values(&ds, 10.0).unwrap();
        assert_eq!(report.columns[0].missing_count, 1);
        assert_eq!(report.columns[0].missing_percent, 25.0);
        assert_eq!(report.total_missing_percent, 50.0);
        assert_eq!(report.flagged_rows, vec![0, 2]);
        assert_eq!(report.verdict, QualityVerdict::Poor);
    }

    #[test]
    fn test_missing_values_good() {
        let ds = dataset(vec![vec![Some(1.0), Some(2.0)]]);
        let report = DataQualityAnalyzer::missing_values(&ds, 10.0).unwrap();
        assert!(report.verdict.is_good());
        assert!(report.flagged_rows.is_empty());
    }

    #[test]
    fn test_missing_percent_rounds_to_whole_number() {
        let ds = dataset(vec![
            vec![None, Some(1.0)],
            vec![Some(1.0), Some(1.0)],
            vec![Some(1.0), Some(1.0)],
        ]);
        let report = DataQualityAnalyzer::missing_values(&ds, 10.0).unwrap();
        assert_eq!(report.columns[0].missing_percent, 33.0);
    }

    #[test]
    fn test_completeness() {
        let ds = dataset(vec![
            vec![Some(1.0), None],
            vec![Some(2.0), Some(3.0)],
        ]);
        let report = DataQualityAnalyzer::completeness(&ds, 0.8).unwrap();
        assert_eq!(report.non_missing_cells, 3);
        assert_eq!(report.total_cells, 4);
        assert_eq!(report.ratio, 0.75);
        assert_eq!(report.verdict, QualityVerdict::Poor);
    }

    #[test]
    fn test_empty_dataset_is_undefined() {
        let ds = dataset(vec![]);
        let err = DataQualityAnalyzer::completeness(&ds, 0.8).unwrap_err();
        assert_eq!(err.error_code(), "DIVISION_UNDEFINED");
        assert!(DataQualityAnalyzer::missing_values(&ds, 10.0).is_err());
    }

    #[test]
    fn test_describe() {
        let ds = dataset(vec![
            vec![Some(1.0), None],
            vec![Some(2.0), None],
            vec![Some(3.0), Some(7.0)],
            vec![Some(4.0), None],
        ]);
        let stats = DataQualityAnalyzer::describe(&ds);

        assert_eq!(stats[0].count, 4);
        assert_eq!(stats[0].mean, Some(2.5));
        assert_eq!(stats[0].q25, Some(1.75));
        assert_eq!(stats[0].median, Some(2.5));
        assert_eq!(stats[0].max, Some(4.0));
        assert!((stats[0].std.unwrap() - 1.2909944).abs() < 1e-6);

        assert_eq!(stats[1].count, 1);
        assert_eq!(stats[1].std, None);
        assert_eq!(stats[1].min, Some(7.0));
    }
}
