//! Property tests for the quantile outlier pipeline.

use chrono::{Days, NaiveDate};
use hmis_quality::{AnalysisConfig, AnalysisOutcome, FacilityDataset, FacilityRecord, OutlierPipeline};
use proptest::prelude::*;

fn arb_groups() -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::option::weighted(0.8, 0.0f64..1000.0), 1..20),
        1..6,
    )
}

fn dataset(groups: &[Vec<Option<f64>>]) -> FacilityDataset {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let records = groups
        .iter()
        .enumerate()
        .flat_map(|(g, values)| {
            values.iter().enumerate().map(move |(i, value)| FacilityRecord {
                period: start + Days::new(7 * i as u64),
                group: format!("Facility {}", g),
                values: vec![*value],
            })
        })
        .collect();
    FacilityDataset::new(vec!["cases".to_string()], records).unwrap()
}

fn run(dataset: &FacilityDataset, low: f64, high: f64, parallel: bool) -> AnalysisOutcome {
    let config = AnalysisConfig::builder()
        .low_quantile(low)
        .high_quantile(high)
        .high_range(0.5, 0.999999999)
        .parallel(parallel)
        .build()
        .unwrap();
    OutlierPipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run(dataset, "cases")
        .unwrap()
}

// ── Outlier counts are bounded by the series length ─────────────────────

proptest! {
    #[test]
    fn outlier_count_never_exceeds_time_points(
        groups in arb_groups(),
        low in 0.001f64..0.4,
        high in 0.5f64..0.999,
    ) {
        let outcome = run(&dataset(&groups), low, high, true);
        for row in outcome.outlier_summary.rows() {
            prop_assert!(row.outlier_count <= row.time_points);
        }
    }
}

// ── Same inputs, same table ─────────────────────────────────────────────

proptest! {
    #[test]
    fn detection_is_deterministic(groups in arb_groups(), high in 0.5f64..0.999) {
        let ds = dataset(&groups);
        let first = run(&ds, 0.01, high, true);
        let second = run(&ds, 0.01, high, true);
        prop_assert_eq!(first.anomalies, second.anomalies);
        prop_assert_eq!(first.skipped, second.skipped);
    }

    #[test]
    fn parallel_matches_sequential(groups in arb_groups()) {
        let ds = dataset(&groups);
        let parallel = run(&ds, 0.05, 0.95, true);
        let sequential = run(&ds, 0.05, 0.95, false);
        prop_assert_eq!(parallel.anomalies, sequential.anomalies);
        prop_assert_eq!(parallel.outlier_summary, sequential.outlier_summary);
    }
}

// ── Raising the high quantile never adds outliers ───────────────────────

proptest! {
    #[test]
    fn raising_high_quantile_is_monotone(
        groups in arb_groups(),
        high in 0.5f64..0.99,
        step in 0.0f64..0.009,
    ) {
        let ds = dataset(&groups);
        let lower = run(&ds, 0.01, high, true);
        let higher = run(&ds, 0.01, high + step, true);

        for row in higher.outlier_summary.rows() {
            let before = lower.outlier_summary.count_for(&row.group).unwrap_or(0);
            prop_assert!(row.outlier_count <= before, "{}: {} > {}", row.group, row.outlier_count, before);
        }
    }
}

// ── Every input point comes back exactly once ───────────────────────────

proptest! {
    #[test]
    fn every_time_point_round_trips(groups in arb_groups()) {
        let ds = dataset(&groups);
        let outcome = run(&ds, 0.05, 0.95, true);

        for (g, values) in groups.iter().enumerate() {
            let name = format!("Facility {}", g);
            let returned: Vec<Option<f64>> = outcome
                .anomalies
                .group_records(&name)
                .map(|r| r.value)
                .collect();

            if values.iter().all(Option::is_none) {
                prop_assert!(returned.is_empty());
                prop_assert!(outcome.skipped.iter().any(|s| s.group == name));
            } else {
                prop_assert_eq!(&returned, values);
            }
        }
    }
}
