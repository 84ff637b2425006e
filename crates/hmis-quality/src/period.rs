//! Period label normalization.
//!
//! HMIS exports label reporting periods in several textual formats
//! (`"January 2023"`, `"Jan-23"`, `"W1 2023"`, `"2023Q1"`). This module
//! detects the single format used by a dataset and maps every label to the
//! calendar date on which the period starts, so periods can be ordered and
//! filtered by year.

use crate::error::{QualityError, Result};
use chrono::{Datelike, Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static QUARTER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})\s*Q([1-4])$").expect("Invalid regex: YYYYQn"));
static WEEK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^W(\d{1,2})\s+(\d{4})$").expect("Invalid regex: Wn YYYY"));
static ISO_DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid regex: YYYY-MM-DD"));
static MONTH_YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{4}$",
    )
    .expect("Invalid regex: Month YYYY")
});
static MONTH_SHORT_YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{3}-\d{2}$").expect("Invalid regex: Mon-YY"));

/// A recognized period label format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodFormat {
    /// `"2023Q1"`: quarter start month
    Quarter,
    /// `"W1 2023"`: Monday-aligned week
    Week,
    /// `"2023-01-31"`: plain calendar date
    IsoDate,
    /// `"January 2023"`: full month name and four-digit year
    MonthYear,
    /// `"Jan-23"`: abbreviated month and two-digit year
    MonthShortYear,
}

impl PeriodFormat {
    /// Formats in the order they are tried during detection.
    pub const DETECTION_ORDER: [PeriodFormat; 5] = [
        PeriodFormat::Quarter,
        PeriodFormat::Week,
        PeriodFormat::IsoDate,
        PeriodFormat::MonthYear,
        PeriodFormat::MonthShortYear,
    ];

    /// Human-readable pattern for error messages.
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Quarter => "<YYYY>Q<n>",
            Self::Week => "W<n> <YYYY>",
            Self::IsoDate => "<YYYY>-<MM>-<DD>",
            Self::MonthYear => "<Month> <YYYY>",
            Self::MonthShortYear => "<Mon>-<YY>",
        }
    }

    /// Parse a single label with this format, returning the period start.
    pub fn parse(&self, label: &str) -> Option<NaiveDate> {
        let label = label.trim();
        match self {
            Self::Quarter => {
                let caps = QUARTER_PATTERN.captures(label)?;
                let year: i32 = caps[1].parse().ok()?;
                let quarter: u32 = caps[2].parse().ok()?;
                NaiveDate::from_ymd_opt(year, 3 * (quarter - 1) + 1, 1)
            }
            Self::Week => {
                let caps = WEEK_PATTERN.captures(label)?;
                let week: u64 = caps[1].parse().ok()?;
                let year: i32 = caps[2].parse().ok()?;
                if !(1..=53).contains(&week) {
                    return None;
                }
                week_one_start(year)?.checked_add_days(Days::new(7 * (week - 1)))
            }
            Self::IsoDate => {
                if !ISO_DATE_PATTERN.is_match(label) {
                    return None;
                }
                NaiveDate::parse_from_str(label, "%Y-%m-%d").ok()
            }
            Self::MonthYear => {
                if !MONTH_YEAR_PATTERN.is_match(label) {
                    return None;
                }
                NaiveDate::parse_from_str(&format!("1 {}", label), "%d %B %Y").ok()
            }
            Self::MonthShortYear => {
                if !MONTH_SHORT_YEAR_PATTERN.is_match(label) {
                    return None;
                }
                NaiveDate::parse_from_str(&format!("01-{}", label), "%d-%b-%y").ok()
            }
        }
    }

    /// Find the first format in [`DETECTION_ORDER`](Self::DETECTION_ORDER)
    /// that parses `label`.
    pub fn detect(label: &str) -> Option<Self> {
        Self::DETECTION_ORDER
            .into_iter()
            .find(|format| format.parse(label).is_some())
    }
}

/// Monday on or before January 1 of `year`.
fn week_one_start(year: i32) -> Option<NaiveDate> {
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let offset = jan_first.weekday().num_days_from_monday() as u64;
    jan_first.checked_sub_days(Days::new(offset))
}

/// Converts period labels to period start dates.
pub struct PeriodNormalizer;

impl PeriodNormalizer {
    /// Detect the format used by a column of labels.
    ///
    /// Detection looks at the first label only; the column is assumed to be
    /// uniformly formatted and [`normalize`](Self::normalize) enforces that.
    pub fn detect_format<S: AsRef<str>>(labels: &[S]) -> Result<PeriodFormat> {
        let first = labels.first().map(|l| l.as_ref()).ok_or_else(|| {
            QualityError::Format {
                label: String::new(),
                reason: "no period labels to inspect".to_string(),
            }
        })?;

        PeriodFormat::detect(first).ok_or_else(|| QualityError::Format {
            label: first.to_string(),
            reason: format!(
                "expected one of {}",
                PeriodFormat::DETECTION_ORDER
                    .iter()
                    .map(|f| f.pattern())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }

    /// Normalize every label to its period start date.
    ///
    /// Fails on the first label that does not match the detected format;
    /// no partial output is returned.
    pub fn normalize<S: AsRef<str>>(labels: &[S]) -> Result<Vec<NaiveDate>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        let format = Self::detect_format(labels)?;
        debug!("Detected period format {:?} ({})", format, format.pattern());

        labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                format.parse(label).ok_or_else(|| QualityError::Format {
                    label: label.to_string(),
                    reason: format!("does not match detected format {}", format.pattern()),
                })
            })
            .collect()
    }
}
