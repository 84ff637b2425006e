//! Shared utilities for the data quality analyzer.
//!
//! This module contains the dtype checks, numeric parsing and order
//! statistics used across the ingestion, detection and quality modules.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType holds text.
#[inline]
pub fn is_text_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String | DataType::Categorical(_, _))
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 6] = [',', '$', '%', '€', '£', ' '];

/// Common error/missing value markers in data.
pub const ERROR_MARKERS: [&str; 8] = [
    "error", "unknown", "n/a", "na", "null", "missing", "none", "#n/a",
];

/// Clean a string for numeric parsing by removing formatting characters.
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Check if a string is an error/missing value marker.
pub fn is_error_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    ERROR_MARKERS.iter().any(|&marker| lower == marker)
}

/// Try to parse a string as a numeric value (f64).
///
/// Handles thousands separators (`"1,204"`), which HMIS exports use for
/// large monthly counts. Error markers and NaN parse as missing.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    if is_error_marker(s) {
        return None;
    }
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// A metric cell counts as missing when absent or NaN.
#[inline]
pub fn is_missing(value: Option<f64>) -> bool {
    value.is_none_or(f64::is_nan)
}

// =============================================================================
// Order Statistics
// =============================================================================

/// Sort observed values ascending, dropping missing ones.
pub fn sorted_observed(values: &[Option<f64>]) -> Vec<f64> {
    let mut observed: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| !is_missing(*v))
        .flatten()
        .collect();
    observed.sort_by(f64::total_cmp);
    observed
}

/// Empirical quantile of ascending `sorted` values.
///
/// Uses linear interpolation between order statistics: with `h = (n - 1) * q`
/// the result is `x[floor(h)] + (h - floor(h)) * (x[ceil(h)] - x[floor(h)])`.
/// Returns `None` for an empty slice or `q` outside `[0, 1]`.
pub fn quantile_linear(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    let fraction = h - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Median of ascending `sorted` values (mean of the middle pair for even counts).
pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    quantile_linear(sorted, 0.5)
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_clean_numeric_string() {
        assert_eq!(clean_numeric_string("1,234"), "1234");
        assert_eq!(clean_numeric_string("  42%  "), "42");
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string("42"), Some(42.0));
        assert_eq!(parse_numeric_string("1,204"), Some(1204.0));
        assert_eq!(parse_numeric_string("-3.5"), Some(-3.5));
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("N/A"), None);
        assert_eq!(parse_numeric_string("NaN"), None);
        assert_eq!(parse_numeric_string("Clinic"), None);
    }

    #[test]
    fn test_quantile_linear_interpolates() {
        let sorted = [10.0, 10.0, 10.0, 10.0, 1000.0];
        // h = 4 * 0.9 = 3.6 -> 10 + 0.6 * 990
        let q = quantile_linear(&sorted, 0.9).unwrap();
        assert!((q - 604.0).abs() < 1e-9);
        assert_eq!(quantile_linear(&sorted, 0.0), Some(10.0));
        assert_eq!(quantile_linear(&sorted, 1.0), Some(1000.0));
    }

    #[test]
    fn test_quantile_linear_edge_cases() {
        assert_eq!(quantile_linear(&[], 0.5), None);
        assert_eq!(quantile_linear(&[7.0], 0.3), Some(7.0));
        assert_eq!(quantile_linear(&[1.0, 2.0], 1.5), None);
    }

    #[test]
    fn test_median_sorted() {
        assert_eq!(median_sorted(&[1.0, 3.0, 5.0]), Some(3.0));
        assert_eq!(median_sorted(&[1.0, 2.0, 3.0, 10.0]), Some(2.5));
        assert_eq!(median_sorted(&[]), None);
    }

    #[test]
    fn test_sorted_observed_drops_missing_and_nan() {
        let values = [Some(3.0), None, Some(f64::NAN), Some(1.0)];
        assert_eq!(sorted_observed(&values), vec![1.0, 3.0]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.3333, 2), 33.33);
        assert_eq!(round_to(12.5, 0), 13.0);
    }
}
