//! Integration tests for the outlier analysis pipeline.
//!
//! These tests run the pipeline end to end on small HMIS-style CSV exports.

use chrono::NaiveDate;
use hmis_quality::{
    AnalysisConfig, AnalysisStage, DataQualityAnalyzer, DatasetSchema, FacilityDataset,
    FacilityRegistry, LogicalRuleChecker, OutlierPipeline, PeriodFormat, ProgressUpdate,
    QualityVerdict, Relationship,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const ANC1: &str = "ANC 1st visit";
const ANC4: &str = "ANC 4th visit";

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn config(year: Option<i32>) -> AnalysisConfig {
    let mut builder = AnalysisConfig::builder()
        .low_quantile(0.0001)
        .high_quantile(0.9);
    if let Some(year) = year {
        builder = builder.year(year);
    }
    builder.build().unwrap()
}

fn pipeline(year: Option<i32>) -> OutlierPipeline {
    OutlierPipeline::builder().config(config(year)).build().unwrap()
}

fn monthly_dataset() -> FacilityDataset {
    let df = load_csv("monthly_anc.csv");
    FacilityDataset::from_dataframe(&df, &DatasetSchema::from(&config(None))).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_monthly_ingestion() {
    let dataset = monthly_dataset();

    assert_eq!(dataset.shape(), (18, 2));
    assert_eq!(dataset.metric_names(), &[ANC1.to_string(), ANC4.to_string()]);
    assert_eq!(dataset.period_format(), Some(PeriodFormat::MonthYear));
    assert_eq!(dataset.records()[0].period, date(2022, 12, 1));
    assert_eq!(dataset.records()[0].group, "Clinic A");
}

#[test]
fn test_mixed_period_formats_fail() {
    let df = load_csv("quarterly_bad.csv");
    let err = pipeline(None).run_dataframe(&df, "Deliveries").unwrap_err();
    assert_eq!(err.error_code(), "FORMAT_ERROR");
}

#[test]
fn test_missing_group_column_fails() {
    let df = load_csv("monthly_anc.csv");
    let config = AnalysisConfig::builder()
        .group_column("facility")
        .low_quantile(0.0001)
        .high_quantile(0.9)
        .build()
        .unwrap();
    let err = OutlierPipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run_dataframe(&df, ANC1)
        .unwrap_err();
    assert_eq!(err.error_code(), "MISSING_COLUMN");
}

// ============================================================================
// Outlier Pipeline
// ============================================================================

#[test]
fn test_monthly_outliers() {
    let outcome = pipeline(None).run(&monthly_dataset(), ANC1).unwrap();

    // Clinic C never reported first visits
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].group, "Clinic C");
    assert_eq!(outcome.skipped[0].code, "DEGENERATE_GROUP");

    let flagged: Vec<(&str, NaiveDate, Option<f64>)> = outcome
        .anomalies
        .records()
        .iter()
        .filter(|r| r.is_outlier)
        .map(|r| (r.group.as_str(), r.period, r.value))
        .collect();
    assert_eq!(flagged, vec![("Clinic A", date(2023, 4, 1), Some(250.0))]);

    let summary = outcome.dataset_summary;
    assert_eq!(summary.total_groups, 2);
    assert_eq!(summary.groups_with_outliers, 1);
    assert_eq!(summary.total_missing, 1);
    assert_eq!(summary.percentage_with_outliers().unwrap(), 50.0);
}

#[test]
fn test_imputed_value_recorded() {
    let outcome = pipeline(None).run(&monthly_dataset(), ANC1).unwrap();

    let gap = outcome
        .anomalies
        .group_records("Clinic B")
        .find(|r| r.was_missing)
        .unwrap();
    assert_eq!(gap.period, date(2023, 1, 1));
    assert_eq!(gap.value, None);
    // median of 15, 15, 16, 17, 17
    assert_eq!(gap.imputed_value, 16.0);
    assert!(!gap.is_outlier);
}

#[test]
fn test_every_time_point_appears_once() {
    let dataset = monthly_dataset();
    let outcome = pipeline(None).run(&dataset, ANC1).unwrap();

    for group in ["Clinic A", "Clinic B"] {
        let input: Vec<NaiveDate> = dataset
            .records()
            .iter()
            .filter(|r| r.group == group)
            .map(|r| r.period)
            .collect();
        let output: Vec<NaiveDate> = outcome.anomalies.group_records(group).map(|r| r.period).collect();
        assert_eq!(input, output);
    }
    assert_eq!(outcome.anomalies.group_records("Clinic C").count(), 0);
}

#[test]
fn test_year_filter() {
    let dataset = monthly_dataset();

    let in_2022 = pipeline(Some(2022)).run(&dataset, ANC1).unwrap();
    assert_eq!(in_2022.anomalies.len(), 2);
    assert_eq!(in_2022.dataset_summary.groups_with_outliers, 0);
    assert_eq!(in_2022.dataset_summary.percentage_with_outliers().unwrap(), 0.0);

    let in_2023 = pipeline(Some(2023)).run(&dataset, ANC1).unwrap();
    assert_eq!(in_2023.anomalies.len(), 10);
    assert_eq!(in_2023.outlier_summary.count_for("Clinic A"), Some(1));

    let in_2030 = pipeline(Some(2030)).run(&dataset, ANC1).unwrap();
    let err = in_2030.dataset_summary.percentage_with_outliers().unwrap_err();
    assert_eq!(err.error_code(), "DIVISION_UNDEFINED");
}

#[test]
fn test_weekly_outliers() {
    let df = load_csv("weekly_malaria.csv");
    let outcome = pipeline(None).run_dataframe(&df, "Malaria cases").unwrap();

    let first = &outcome.anomalies.records()[0];
    assert_eq!(first.group, "Facility X");
    assert_eq!(first.period, date(2022, 12, 26));

    let flagged: Vec<NaiveDate> = outcome
        .anomalies
        .records()
        .iter()
        .filter(|r| r.is_outlier)
        .map(|r| r.period)
        .collect();
    // W5 2023 starts four weeks after 2022-12-26
    assert_eq!(flagged, vec![date(2023, 1, 23)]);
    assert_eq!(outcome.outlier_summary.count_for("Facility Y"), Some(0));
}

#[test]
fn test_week_one_belongs_to_previous_year() {
    let df = load_csv("weekly_malaria.csv");
    let outcome = pipeline(Some(2023)).run_dataframe(&df, "Malaria cases").unwrap();
    assert_eq!(outcome.anomalies.len(), 14);
}

#[test]
fn test_sequential_and_parallel_agree() {
    let dataset = monthly_dataset();
    let sequential_config = AnalysisConfig {
        parallel: false,
        ..config(None)
    };
    let sequential = OutlierPipeline::builder()
        .config(sequential_config)
        .build()
        .unwrap()
        .run(&dataset, ANC1)
        .unwrap();
    let parallel = pipeline(None).run(&dataset, ANC1).unwrap();

    assert_eq!(sequential.anomalies, parallel.anomalies);
    assert_eq!(sequential.outlier_summary, parallel.outlier_summary);
    assert_eq!(sequential.skipped, parallel.skipped);
}

#[test]
fn test_progress_updates() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();

    OutlierPipeline::builder()
        .config(config(None))
        .on_progress(move |update| sink.lock().unwrap().push(update))
        .build()
        .unwrap()
        .run(&monthly_dataset(), ANC1)
        .unwrap();

    let updates = updates.lock().unwrap();
    let per_group: Vec<&ProgressUpdate> = updates
        .iter()
        .filter(|u| u.stage == AnalysisStage::Detecting && u.items_total.is_some())
        .collect();
    assert_eq!(per_group.len(), 3);
    assert!(per_group.iter().all(|u| u.items_total == Some(3)));

    let progress: Vec<f32> = updates
        .iter()
        .filter(|u| u.items_total.is_none())
        .map(|u| u.progress)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(updates.last().unwrap().stage, AnalysisStage::Complete);
}

// ============================================================================
// Exports and Registry
// ============================================================================

#[test]
fn test_anomaly_export_frame() {
    let outcome = pipeline(None).run(&monthly_dataset(), ANC1).unwrap();
    let df = outcome.anomalies.to_dataframe("organisationunitname", ANC1).unwrap();

    assert_eq!(df.shape(), (12, 6));
    assert_eq!(df.column("period").unwrap().dtype(), &DataType::Date);
    assert_eq!(df.column(ANC1).unwrap().null_count(), 1);
}

#[test]
fn test_registry_annotation() {
    let registry =
        FacilityRegistry::from_dataframe(&load_csv("facility_list.csv"), "facility", "district")
            .unwrap();
    let outcome = pipeline(None).run(&monthly_dataset(), ANC1).unwrap();

    let annotated = outcome.outlier_summary.annotate(&registry);
    let rows: Vec<(&str, usize, &str)> = annotated
        .iter()
        .map(|r| (r.facility.as_str(), r.outlier_count, r.district.as_str()))
        .collect();
    assert_eq!(rows, vec![("Clinic A", 1, "North"), ("Clinic B", 0, "South")]);

    let df = outcome.outlier_summary.to_annotated_dataframe(&registry).unwrap();
    assert_eq!(df.height(), 2);
}

// ============================================================================
// Rules and Quality Checks
// ============================================================================

#[test]
fn test_first_visits_not_below_fourth_visits() {
    let dataset = monthly_dataset();
    let check = LogicalRuleChecker::check(&dataset, ANC1, ANC4, Relationship::Higher).unwrap();

    assert_eq!(check.evaluated_rows, 10);
    assert_eq!(check.skipped_rows, 8);
    assert_eq!(check.violations.len(), 1);
    assert_eq!(check.violations[0].group, "Clinic B");
    assert_eq!(check.violations[0].period, date(2023, 4, 1));
}

#[test]
fn test_equal_rule_on_same_column() {
    let dataset = monthly_dataset();
    let check = LogicalRuleChecker::check(&dataset, ANC4, ANC4, Relationship::Equal).unwrap();
    assert!(check.is_satisfied());
}

#[test]
fn test_quality_checks() {
    let dataset = monthly_dataset();

    let missing = DataQualityAnalyzer::missing_values(&dataset, 10.0).unwrap();
    assert_eq!(missing.columns[0].missing_count, 7);
    assert_eq!(missing.columns[0].missing_percent, 39.0);
    assert_eq!(missing.columns[1].missing_percent, 6.0);
    assert_eq!(missing.verdict, QualityVerdict::Poor);
    assert_eq!(missing.flagged_rows.len(), 8);

    let completeness = DataQualityAnalyzer::completeness(&dataset, 0.8).unwrap();
    assert_eq!(completeness.non_missing_cells, 28);
    assert_eq!(completeness.ratio, 0.78);
    assert_eq!(completeness.verdict, QualityVerdict::Poor);

    let selected = dataset.select_metrics(&[ANC4]).unwrap();
    let completeness = DataQualityAnalyzer::completeness(&selected, 0.8).unwrap();
    assert_eq!(completeness.verdict, QualityVerdict::Good);
}
