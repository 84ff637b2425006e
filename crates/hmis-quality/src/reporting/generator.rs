use crate::aggregate::{DatasetSummary, GroupOutlierCount};
use crate::config::{AnalysisConfig, QuantileThresholds};
use crate::dataset::FacilityDataset;
use crate::error::Result;
use crate::quality::{ColumnStatistics, CompletenessReport, DataQualityAnalyzer, MissingValueReport};
use crate::registry::FacilityRegistry;
use crate::rules::{Relationship, RuleCheck};
use crate::types::{AnalysisOutcome, SkippedGroup};
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Number of facilities listed in [`AnalysisReport::top_facilities`].
pub const TOP_FACILITIES: usize = 10;

// ============================================================================
// Report Types
// ============================================================================

/// Full analysis report, used for `--json` output and `--emit-report` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    pub input_file: String,
    pub metric: String,
    pub thresholds: QuantileThresholds,
    pub year: Option<i32>,
    pub duration_ms: u64,

    pub dataset_summary: DatasetSummary,
    /// `None` when there were no groups to divide by
    pub percentage_with_outliers: Option<f64>,

    /// Facilities with the most outliers, highest first
    pub top_facilities: Vec<GroupOutlierCount>,
    pub skipped_groups: Vec<SkippedGroup>,

    pub quality: QualitySection,
    pub rule_checks: Vec<RuleSummary>,

    /// Paths of files written alongside the report
    pub output_files: Vec<String>,
}

/// Dataset-level quality checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualitySection {
    pub shape: (usize, usize),
    pub missing_values: Option<MissingValueReport>,
    pub completeness: Option<CompletenessReport>,
    pub statistics: Vec<ColumnStatistics>,
}

impl QualitySection {
    /// Run every quality check on `dataset`.
    ///
    /// Checks that are undefined for the dataset (no rows or no metric
    /// cells) are left empty and logged.
    pub fn collect(dataset: &FacilityDataset, config: &AnalysisConfig) -> Self {
        let missing_values = DataQualityAnalyzer::missing_values(dataset, config.missing_alert_percent)
            .inspect_err(|e| warn!("Missing-value check skipped: {}", e))
            .ok();
        let completeness = DataQualityAnalyzer::completeness(dataset, config.completeness_threshold)
            .inspect_err(|e| warn!("Completeness check skipped: {}", e))
            .ok();

        Self {
            shape: dataset.shape(),
            missing_values,
            completeness,
            statistics: DataQualityAnalyzer::describe(dataset),
        }
    }
}

/// Counts from one logical rule check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub relationship: Relationship,
    pub left_column: String,
    pub right_column: String,
    pub violations: usize,
    pub evaluated_rows: usize,
    pub skipped_rows: usize,
}

impl From<&RuleCheck> for RuleSummary {
    fn from(check: &RuleCheck) -> Self {
        Self {
            relationship: check.relationship,
            left_column: check.left_column.clone(),
            right_column: check.right_column.clone(),
            violations: check.violations.len(),
            evaluated_rows: check.evaluated_rows,
            skipped_rows: check.skipped_rows,
        }
    }
}

/// Inputs for [`ReportGenerator::build_report`].
pub struct ReportParams<'a> {
    pub input_file: &'a str,
    pub outcome: &'a AnalysisOutcome,
    pub quality: QualitySection,
    pub rule_checks: &'a [RuleCheck],
    pub output_files: Vec<String>,
}

// ============================================================================
// Generator
// ============================================================================

/// Writes analysis exports and reports to an output directory.
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
        }
    }
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn build_report(params: ReportParams<'_>) -> AnalysisReport {
        let ReportParams {
            input_file,
            outcome,
            quality,
            rule_checks,
            output_files,
        } = params;

        AnalysisReport {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_file: input_file.to_string(),
            metric: outcome.metric.clone(),
            thresholds: outcome.thresholds,
            year: outcome.year,
            duration_ms: outcome.duration_ms,
            dataset_summary: outcome.dataset_summary,
            percentage_with_outliers: outcome.dataset_summary.percentage_with_outliers().ok(),
            top_facilities: outcome
                .outlier_summary
                .rows()
                .iter()
                .filter(|row| row.outlier_count > 0)
                .take(TOP_FACILITIES)
                .cloned()
                .collect(),
            skipped_groups: outcome.skipped.clone(),
            quality,
            rule_checks: rule_checks.iter().map(RuleSummary::from).collect(),
            output_files,
        }
    }

    /// Write `df` as `<file_name>.csv` in the output directory.
    pub fn write_csv(&self, df: &mut DataFrame, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_dir.join(format!("{}.csv", file_name));
        let mut file = File::create(&output_path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)?;

        info!("Saved {} rows to {}", df.height(), output_path.display());
        Ok(output_path)
    }

    /// Write the anomaly table and the per-facility counts.
    ///
    /// With a registry, the counts file is restricted to registered
    /// facilities and carries their district.
    pub fn write_outcome(
        &self,
        outcome: &AnalysisOutcome,
        group_column: &str,
        registry: Option<&FacilityRegistry>,
    ) -> Result<Vec<PathBuf>> {
        let mut anomalies = outcome.anomalies.to_dataframe(group_column, &outcome.metric)?;
        let mut counts = match registry {
            Some(registry) => outcome.outlier_summary.to_annotated_dataframe(registry)?,
            None => outcome.outlier_summary.to_dataframe()?,
        };

        Ok(vec![
            self.write_csv(&mut anomalies, "outliers")?,
            self.write_csv(&mut counts, "outlier_counts")?,
        ])
    }

    /// Write `checks` violations as `rule_violations.csv`.
    pub fn write_rule_violations(&self, checks: &[RuleCheck], group_column: &str) -> Result<Option<PathBuf>> {
        let mut frames = Vec::new();
        for check in checks.iter().filter(|c| !c.is_satisfied()) {
            let rule = format!("{} {} {}", check.left_column, check.relationship, check.right_column);
            let mut df = check.to_dataframe(group_column)?;
            df.rename(check.left_column.as_str(), "left".into())?;
            df.rename(check.right_column.as_str(), "right".into())?;
            df.with_column(Column::new("rule".into(), vec![rule; df.height()]))?;
            frames.push(df);
        }

        let mut frames = frames.into_iter();
        let Some(mut combined) = frames.next() else {
            return Ok(None);
        };
        for df in frames {
            combined.vstack_mut(&df)?;
        }
        self.write_csv(&mut combined, "rule_violations").map(Some)
    }

    /// Write a report as `<base_name>_report.json`.
    pub fn write_report_to_file(&self, report: &AnalysisReport, base_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self.output_dir.join(format!("{}_report.json", base_name));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}
