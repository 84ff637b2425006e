//! Custom error types for the data quality analyzer.
//!
//! This module provides the error hierarchy using `thiserror`. Errors fall
//! into two classes:
//!
//! - **Fatal** errors (unrecognized period labels, missing columns, invalid
//!   thresholds) are checked before any per-group work starts and abort the
//!   whole analysis.
//! - **Recoverable** errors ([`QualityError::DegenerateGroup`]) only affect a
//!   single group, which is skipped and reported alongside the results.
//!
//! Errors are serializable so they can be forwarded to a display layer as
//! `{ "code": ..., "message": ... }` objects.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the data quality analyzer.
#[derive(Error, Debug)]
pub enum QualityError {
    /// A period label did not match any recognized format.
    #[error("Unrecognized period label '{label}': {reason}")]
    Format { label: String, reason: String },

    /// A group has no usable values (every value is missing).
    #[error("Group '{0}' has no observed values")]
    DegenerateGroup(String),

    /// A percentage was requested over zero groups.
    #[error("Percentage is undefined: {0} is zero")]
    DivisionUndefined(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    MissingColumn(String),

    /// A row has no grouping key.
    #[error("Row {row} has no value in grouping column '{column}'")]
    MissingGroupKey { column: String, row: usize },

    /// Quantile thresholds outside `0 < low < high < 1`.
    #[error("Invalid quantile thresholds: low={low}, high={high} (need 0 < low < high < 1)")]
    InvalidThreshold { low: f64, high: f64 },

    /// Relationship tag other than `higher`, `lower` or `equal`.
    #[error("Unknown relationship '{0}' (expected higher, lower or equal)")]
    InvalidRelationship(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<QualityError>,
    },
}

impl QualityError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        QualityError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Format { .. } => "FORMAT_ERROR",
            Self::DegenerateGroup(_) => "DEGENERATE_GROUP",
            Self::DivisionUndefined(_) => "DIVISION_UNDEFINED",
            Self::MissingColumn(_) => "MISSING_COLUMN",
            Self::MissingGroupKey { .. } => "MISSING_GROUP_KEY",
            Self::InvalidThreshold { .. } => "INVALID_THRESHOLD",
            Self::InvalidRelationship(_) => "INVALID_RELATIONSHIP",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error only affects a single group.
    ///
    /// Recoverable errors are turned into skipped-group entries by the
    /// pipeline; everything else aborts the analysis.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DegenerateGroup(_) => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

impl Serialize for QualityError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("QualityError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for quality analysis operations.
pub type Result<T> = std::result::Result<T, QualityError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| QualityError::Polars(e).with_context(context))
    }
}
