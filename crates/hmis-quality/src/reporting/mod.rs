//! Report generation module.
//!
//! Exports the anomaly table and per-facility counts as CSV, and assembles
//! the [`AnalysisReport`] used for `--json` output and `--emit-report` files.
//!
//! # Example
//!
//! ```rust,ignore
//! use hmis_quality::reporting::{QualitySection, ReportGenerator, ReportParams};
//!
//! let generator = ReportGenerator::new("outputs");
//! let files = generator.write_outcome(&outcome, "organisationunitname", None)?;
//! let report = ReportGenerator::build_report(ReportParams {
//!     input_file: "data.csv",
//!     outcome: &outcome,
//!     quality: QualitySection::collect(&dataset, &config),
//!     rule_checks: &[],
//!     output_files: files.iter().map(|p| p.display().to_string()).collect(),
//! });
//! generator.write_report_to_file(&report, "data")?;
//! ```

mod generator;

pub use generator::{
    AnalysisReport, QualitySection, ReportGenerator, ReportParams, RuleSummary, TOP_FACILITIES,
};
