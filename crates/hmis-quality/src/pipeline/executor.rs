//! Per-group detection executor.
//!
//! Runs imputation and quantile detection on every group series, either in
//! input order on the current thread or on the rayon pool. Both modes return
//! outcomes in the order the groups were given.

use crate::detection::QuantileDetector;
use crate::error::Result;
use crate::partition::GroupSeries;
use crate::pipeline::progress::{AnalysisStage, ProgressReporter, ProgressUpdate};
use crate::types::GroupOutcome;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Executes detection over a set of independent group series.
pub struct GroupExecutor<'a> {
    detector: QuantileDetector,
    parallel: bool,
    reporter: Option<&'a dyn ProgressReporter>,
}

impl<'a> GroupExecutor<'a> {
    pub fn new(detector: QuantileDetector, parallel: bool) -> Self {
        Self {
            detector,
            parallel,
            reporter: None,
        }
    }

    /// Report one update per finished group.
    pub fn with_reporter(mut self, reporter: Option<&'a dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Process every group.
    ///
    /// Recoverable per-group failures come back as
    /// [`GroupOutcome::Skipped`]; any other error aborts the whole batch.
    pub fn execute(&self, groups: Vec<GroupSeries>) -> Result<Vec<GroupOutcome>> {
        let total = groups.len();
        let done = AtomicUsize::new(0);

        info!(
            "Running detection on {} groups ({})",
            total,
            if self.parallel { "parallel" } else { "sequential" }
        );

        let process = |series: GroupSeries| -> Result<GroupOutcome> {
            let outcome = self.detector.detect_group(series)?;
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Processed group '{}' ({}/{})", outcome.group(), finished, total);
            if let Some(reporter) = self.reporter {
                reporter.report(ProgressUpdate::with_items(
                    AnalysisStage::Detecting,
                    format!("Group: {}", outcome.group()),
                    finished,
                    total,
                    format!("Processed {}", outcome.group()),
                ));
            }
            Ok(outcome)
        };

        if self.parallel {
            groups.into_par_iter().map(process).collect()
        } else {
            groups.into_iter().map(process).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuantileThresholds;
    use crate::pipeline::progress::ClosureProgressReporter;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn groups() -> Vec<GroupSeries> {
        (0..12)
            .map(|g| {
                let mut s = GroupSeries::new(format!("Clinic {:02}", g));
                for m in 1..=12 {
                    let value = if m == 6 && g % 3 == 0 {
                        None
                    } else {
                        Some((g * 10 + m) as f64)
                    };
                    s.push(NaiveDate::from_ymd_opt(2023, m, 1).unwrap(), value);
                }
                s
            })
            .collect()
    }

    fn detector() -> QuantileDetector {
        QuantileDetector::new(QuantileThresholds { low: 0.05, high: 0.95 }).unwrap()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = GroupExecutor::new(detector(), false).execute(groups()).unwrap();
        let parallel = GroupExecutor::new(detector(), true).execute(groups()).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_order_preserved() {
        let outcomes = GroupExecutor::new(detector(), true).execute(groups()).unwrap();
        let names: Vec<&str> = outcomes.iter().map(|o| o.group()).collect();
        let expected: Vec<String> = (0..12).map(|g| format!("Clinic {:02}", g)).collect();
        assert_eq!(names, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_reports_once_per_group() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let reporter = ClosureProgressReporter::new(move |update: ProgressUpdate| {
            assert_eq!(update.stage, AnalysisStage::Detecting);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        GroupExecutor::new(detector(), true)
            .with_reporter(Some(&reporter))
            .execute(groups())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_empty_input() {
        let outcomes = GroupExecutor::new(detector(), true).execute(Vec::new()).unwrap();
        assert!(outcomes.is_empty());
    }
}
