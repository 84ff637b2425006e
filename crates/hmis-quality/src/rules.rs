//! Logical rule checks between two metric columns.
//!
//! A rule states how `left` should relate to `right` on every row. The
//! checker returns the rows where that statement does not hold. Rows with a
//! missing value on either side are neither satisfying nor violating and are
//! only counted as skipped.

use crate::dataset::FacilityDataset;
use crate::error::{QualityError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Expected relationship of the left column to the right column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    /// Left is expected to be at least right.
    Higher,
    /// Left is expected to be at most right.
    Lower,
    /// Left is expected to equal right.
    Equal,
}

impl Relationship {
    /// Whether the pair `(left, right)` breaks the relationship.
    pub fn is_violated(self, left: f64, right: f64) -> bool {
        match self {
            Self::Higher => left < right,
            Self::Lower => left > right,
            Self::Equal => left != right,
        }
    }
}

impl FromStr for Relationship {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "higher" => Ok(Self::Higher),
            "lower" => Ok(Self::Lower),
            "equal" => Ok(Self::Equal),
            _ => Err(QualityError::InvalidRelationship(s.to_string())),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Higher => "higher",
            Self::Lower => "lower",
            Self::Equal => "equal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Row index in the dataset.
    pub row: usize,
    pub period: NaiveDate,
    pub group: String,
    pub left: f64,
    pub right: f64,
}

/// Result of checking one rule over a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCheck {
    pub relationship: Relationship,
    pub left_column: String,
    pub right_column: String,
    pub violations: Vec<RuleViolation>,
    pub evaluated_rows: usize,
    pub skipped_rows: usize,
}

impl RuleCheck {
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violating rows with the group, period and both compared columns.
    pub fn to_dataframe(&self, group_column: &str) -> Result<DataFrame> {
        let df = df![
            group_column => self.violations.iter().map(|v| v.group.as_str()).collect::<Vec<_>>(),
            "period" => self.violations.iter().map(|v| v.period.to_string()).collect::<Vec<_>>(),
            self.left_column.as_str() => self.violations.iter().map(|v| v.left).collect::<Vec<_>>(),
            self.right_column.as_str() => self.violations.iter().map(|v| v.right).collect::<Vec<_>>(),
        ]?;
        Ok(df)
    }
}

pub struct LogicalRuleChecker;

impl LogicalRuleChecker {
    /// Resolve both rule columns against `dataset`.
    pub fn resolve_columns(dataset: &FacilityDataset, left: &str, right: &str) -> Result<(usize, usize)> {
        Ok((dataset.metric_index(left)?, dataset.metric_index(right)?))
    }

    /// Check `left <relationship> right` on every row of `dataset`.
    ///
    /// Both columns are resolved before any row is looked at, so an unknown
    /// column fails with `MissingColumn` and no partial result.
    pub fn check(
        dataset: &FacilityDataset,
        left: &str,
        right: &str,
        relationship: Relationship,
    ) -> Result<RuleCheck> {
        let (left_idx, right_idx) = Self::resolve_columns(dataset, left, right)?;

        let mut violations = Vec::new();
        let mut evaluated_rows = 0;
        let mut skipped_rows = 0;

        for (row, record) in dataset.records().iter().enumerate() {
            let (Some(l), Some(r)) = (record.values[left_idx], record.values[right_idx]) else {
                skipped_rows += 1;
                continue;
            };
            evaluated_rows += 1;
            if relationship.is_violated(l, r) {
                violations.push(RuleViolation {
                    row,
                    period: record.period,
                    group: record.group.clone(),
                    left: l,
                    right: r,
                });
            }
        }

        info!(
            "Rule '{} {} {}': {} violations in {} rows ({} skipped)",
            left,
            relationship,
            right,
            violations.len(),
            evaluated_rows,
            skipped_rows
        );

        Ok(RuleCheck {
            relationship,
            left_column: left.to_string(),
            right_column: right.to_string(),
            violations,
            evaluated_rows,
            skipped_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FacilityRecord;

    fn dataset(rows: &[(Option<f64>, Option<f64>)]) -> FacilityDataset {
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, (a, b))| FacilityRecord {
                period: NaiveDate::from_ymd_opt(2023, 1 + i as u32, 1).unwrap(),
                group: format!("Clinic {}", i),
                values: vec![*a, *b],
            })
            .collect();
        FacilityDataset::new(vec!["anc1".to_string(), "anc4".to_string()], records).unwrap()
    }

    #[test]
    fn test_equal_rule_all_satisfied() {
        let ds = dataset(&[(Some(1.0), Some(1.0)), (Some(5.0), Some(5.0))]);
        let check = LogicalRuleChecker::check(&ds, "anc1", "anc4", Relationship::Equal).unwrap();
        assert!(check.is_satisfied());
        assert_eq!(check.evaluated_rows, 2);
    }

    #[test]
    fn test_higher_rule_violation() {
        let ds = dataset(&[(Some(10.0), Some(8.0)), (Some(3.0), Some(9.0)), (Some(4.0), Some(4.0))]);
        let check = LogicalRuleChecker::check(&ds, "anc1", "anc4", Relationship::Higher).unwrap();
        assert_eq!(check.violations.len(), 1);
        assert_eq!(check.violations[0].row, 1);
        assert_eq!(check.violations[0].group, "Clinic 1");
    }

    #[test]
    fn test_lower_rule_violation() {
        let ds = dataset(&[(Some(10.0), Some(8.0)), (Some(3.0), Some(9.0))]);
        let check = LogicalRuleChecker::check(&ds, "anc1", "anc4", Relationship::Lower).unwrap();
        assert_eq!(check.violations.len(), 1);
        assert_eq!(check.violations[0].left, 10.0);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let ds = dataset(&[(None, Some(8.0)), (Some(3.0), None), (Some(1.0), Some(2.0))]);
        let check = LogicalRuleChecker::check(&ds, "anc1", "anc4", Relationship::Equal).unwrap();
        assert_eq!(check.skipped_rows, 2);
        assert_eq!(check.evaluated_rows, 1);
        assert_eq!(check.violations.len(), 1);
    }

    #[test]
    fn test_unknown_column() {
        let ds = dataset(&[(Some(1.0), Some(1.0))]);
        let err = LogicalRuleChecker::check(&ds, "anc1", "penta3", Relationship::Equal).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
    }

    #[test]
    fn test_resolve_columns() {
        let ds = dataset(&[(Some(1.0), Some(1.0))]);
        assert_eq!(LogicalRuleChecker::resolve_columns(&ds, "anc4", "anc1").unwrap(), (1, 0));
        let err = LogicalRuleChecker::resolve_columns(&ds, "penta3", "anc1").unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
    }

    #[test]
    fn test_relationship_parsing() {
        assert_eq!("Higher".parse::<Relationship>().unwrap(), Relationship::Higher);
        assert_eq!(" lower ".parse::<Relationship>().unwrap(), Relationship::Lower);
        assert_eq!(Relationship::Equal.to_string(), "equal");
        let err = "greater".parse::<Relationship>().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RELATIONSHIP");
    }

    #[test]
    fn test_violations_dataframe() {
        let ds = dataset(&[(Some(1.0), Some(2.0))]);
        let check = LogicalRuleChecker::check(&ds, "anc1", "anc4", Relationship::Higher).unwrap();
        let df = check.to_dataframe("organisationunitname").unwrap();
        assert_eq!(df.shape(), (1, 4));
    }
}
