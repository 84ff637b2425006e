//! Pipeline module.
//!
//! The outlier analysis pipeline, its per-group executor and progress
//! reporting.

mod builder;
mod executor;
pub mod progress;

pub use builder::{OutlierPipeline, OutlierPipelineBuilder};
pub use executor::GroupExecutor;
pub use progress::{AnalysisStage, ClosureProgressReporter, ProgressReporter, ProgressUpdate};
