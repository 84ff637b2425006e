//! Outlier analysis pipeline.
//!
//! Wires the stages together: validate, partition, detect per group,
//! aggregate. Column and threshold errors surface before any group is
//! touched; per-group failures are collected as skipped groups.

use crate::aggregate::ResultAggregator;
use crate::config::{AnalysisConfig, ConfigValidationError};
use crate::dataset::{DatasetSchema, FacilityDataset};
use crate::detection::QuantileDetector;
use crate::error::{Result, ResultExt};
use crate::partition::GroupPartitioner;
use crate::pipeline::executor::GroupExecutor;
use crate::pipeline::progress::{
    AnalysisStage, ClosureProgressReporter, ProgressReporter, ProgressUpdate,
};
use crate::types::AnalysisOutcome;
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Per-group quantile outlier pipeline.
///
/// Use [`OutlierPipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use hmis_quality::{AnalysisConfig, OutlierPipeline};
///
/// let outcome = OutlierPipeline::builder()
///     .config(AnalysisConfig::builder().high_quantile(0.99).build()?)
///     .on_progress(|update| println!("{}", update.message))
///     .build()?
///     .run_dataframe(&df, "anc1")?;
///
/// println!("{} groups flagged", outcome.dataset_summary.groups_with_outliers);
/// ```
pub struct OutlierPipeline {
    config: AnalysisConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(OutlierPipeline: Send, Sync);

impl OutlierPipeline {
    pub fn builder() -> OutlierPipelineBuilder {
        OutlierPipelineBuilder::default()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Ingest `df` with the configured schema, then [`run`](Self::run).
    pub fn run_dataframe(&self, df: &DataFrame, metric: &str) -> Result<AnalysisOutcome> {
        let schema = DatasetSchema::from(&self.config);
        let dataset = FacilityDataset::from_dataframe(df, &schema).context("Ingesting dataset")?;
        self.run(&dataset, metric)
    }

    /// Detect outliers in `metric` for every group of `dataset`.
    ///
    /// # Errors
    ///
    /// Fails before processing any group when the thresholds are invalid or
    /// `metric` is not a column of the dataset. Degenerate groups do not
    /// fail the run; they are listed in [`AnalysisOutcome::skipped`].
    pub fn run(&self, dataset: &FacilityDataset, metric: &str) -> Result<AnalysisOutcome> {
        match self.run_internal(dataset, metric) {
            Ok(outcome) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Analyzed {} groups in {} ms",
                    outcome.dataset_summary.total_groups, outcome.duration_ms
                )));
                Ok(outcome)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Analysis failed: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, dataset: &FacilityDataset, metric: &str) -> Result<AnalysisOutcome> {
        let start_time = Instant::now();

        info!("Starting outlier analysis of '{}'...", metric);
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Validating,
            0.0,
            "Validating thresholds and columns...",
        ));
        let detector = QuantileDetector::new(self.config.thresholds)?;
        dataset.metric_index(metric)?;

        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Partitioning,
            0.0,
            "Partitioning dataset by group...",
        ));
        let groups = GroupPartitioner::partition(dataset, metric)?;
        info!("Partitioned {} rows into {} groups", dataset.len(), groups.len());

        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Detecting,
            0.0,
            format!("Detecting outliers in {} groups...", groups.len()),
        ));
        let outcomes = GroupExecutor::new(detector, self.config.parallel)
            .with_reporter(self.progress_reporter.as_deref())
            .execute(groups)?;

        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Aggregating,
            0.0,
            "Aggregating group results...",
        ));
        let aggregation =
            ResultAggregator::aggregate(outcomes, self.config.record_order, self.config.year);

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Analysis complete: {}/{} groups with outliers, {} skipped, {} ms",
            aggregation.dataset_summary.groups_with_outliers,
            aggregation.dataset_summary.total_groups,
            aggregation.skipped.len(),
            duration_ms
        );

        Ok(AnalysisOutcome {
            metric: metric.to_string(),
            thresholds: self.config.thresholds,
            year: self.config.year,
            anomalies: aggregation.anomalies,
            outlier_summary: aggregation.outlier_summary,
            dataset_summary: aggregation.dataset_summary,
            skipped: aggregation.skipped,
            duration_ms,
        })
    }
}

/// Builder for [`OutlierPipeline`].
#[derive(Default)]
pub struct OutlierPipelineBuilder {
    config: Option<AnalysisConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(OutlierPipelineBuilder: Send);

impl OutlierPipelineBuilder {
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline, validating the configuration.
    pub fn build(self) -> std::result::Result<OutlierPipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(OutlierPipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}
