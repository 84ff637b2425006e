//! Typed dataset ingestion.
//!
//! Column access by name and implicit coercion stop here: a polars
//! `DataFrame` is validated once against a [`DatasetSchema`] and converted
//! into a [`FacilityDataset`] whose records carry a parsed period date, a
//! grouping key and one optional `f64` per metric column. Everything
//! downstream works on that shape.

use crate::config::AnalysisConfig;
use crate::error::{QualityError, Result, ResultExt};
use crate::period::{PeriodFormat, PeriodNormalizer};
use crate::utils::{is_error_marker, is_missing, is_numeric_dtype, is_text_dtype, parse_numeric_string};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Names of the two structural columns of an HMIS export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub period_column: String,
    pub group_column: String,
}

impl DatasetSchema {
    pub fn new(period_column: impl Into<String>, group_column: impl Into<String>) -> Self {
        Self {
            period_column: period_column.into(),
            group_column: group_column.into(),
        }
    }
}

impl From<&AnalysisConfig> for DatasetSchema {
    fn from(config: &AnalysisConfig) -> Self {
        Self::new(&config.period_column, &config.group_column)
    }
}

/// One row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub period: NaiveDate,
    pub group: String,
    /// One entry per metric, aligned with [`FacilityDataset::metric_names`].
    pub values: Vec<Option<f64>>,
}

/// A validated, statically shaped facility dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FacilityDataset {
    metric_names: Vec<String>,
    records: Vec<FacilityRecord>,
    period_format: Option<PeriodFormat>,
}

impl FacilityDataset {
    /// Build a dataset from already typed records.
    ///
    /// Metric names must be unique and every record must carry exactly one
    /// value per metric. NaN values are stored as missing.
    pub fn new(metric_names: Vec<String>, mut records: Vec<FacilityRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &metric_names {
            if !seen.insert(name.as_str()) {
                return Err(QualityError::InvalidConfig(format!(
                    "duplicate metric column '{}'",
                    name
                )));
            }
        }

        for (row, record) in records.iter_mut().enumerate() {
            if record.values.len() != metric_names.len() {
                return Err(QualityError::InvalidConfig(format!(
                    "row {} has {} values but the dataset has {} metrics",
                    row,
                    record.values.len(),
                    metric_names.len()
                )));
            }
            for value in record.values.iter_mut() {
                if is_missing(*value) {
                    *value = None;
                }
            }
        }

        Ok(Self {
            metric_names,
            records,
            period_format: None,
        })
    }

    /// Validate a `DataFrame` against `schema` and convert it.
    ///
    /// Both schema columns must exist. Period labels are normalized with
    /// [`PeriodNormalizer`]; native date columns are accepted as-is. Every
    /// other numeric column becomes a metric, as does every text column
    /// holding at least one parseable number.
    pub fn from_dataframe(df: &DataFrame, schema: &DatasetSchema) -> Result<Self> {
        let period_column = df
            .column(&schema.period_column)
            .map_err(|_| QualityError::MissingColumn(schema.period_column.clone()))?;
        let group_column = df
            .column(&schema.group_column)
            .map_err(|_| QualityError::MissingColumn(schema.group_column.clone()))?;

        let (periods, period_format) = read_periods(period_column)?;
        let groups = read_groups(group_column, &schema.group_column)?;

        let mut metric_names = Vec::new();
        let mut metric_values: Vec<Vec<Option<f64>>> = Vec::new();
        for column in df.get_columns() {
            let name = column.name().as_str();
            if name == schema.period_column || name == schema.group_column {
                continue;
            }
            match read_metric(column).context(format!("Reading metric column '{}'", name))? {
                Some(values) => {
                    metric_names.push(name.to_string());
                    metric_values.push(values);
                }
                None => debug!("Column '{}' holds no numeric values, not a metric", name),
            }
        }

        let records = periods
            .into_iter()
            .zip(groups)
            .enumerate()
            .map(|(row, (period, group))| FacilityRecord {
                period,
                group,
                values: metric_values.iter().map(|column| column[row]).collect(),
            })
            .collect();

        info!(
            "Ingested {} rows with {} metric columns",
            df.height(),
            metric_names.len()
        );

        Ok(Self {
            metric_names,
            records,
            period_format,
        })
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    pub fn records(&self) -> &[FacilityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows by metric columns.
    pub fn shape(&self) -> (usize, usize) {
        (self.records.len(), self.metric_names.len())
    }

    /// Period format detected at ingestion, if labels were parsed.
    pub fn period_format(&self) -> Option<PeriodFormat> {
        self.period_format
    }

    /// Position of a metric, or `MissingColumn`.
    pub fn metric_index(&self, name: &str) -> Result<usize> {
        self.metric_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| QualityError::MissingColumn(name.to_string()))
    }

    /// All values of one metric, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let idx = self.metric_index(name)?;
        Ok(self.records.iter().map(|r| r.values[idx]).collect())
    }

    /// Keep only the named metrics, in the order given.
    pub fn select_metrics<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| self.metric_index(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let metric_names = indices.iter().map(|&i| self.metric_names[i].clone()).collect();
        let records = self
            .records
            .iter()
            .map(|record| FacilityRecord {
                period: record.period,
                group: record.group.clone(),
                values: indices.iter().map(|&i| record.values[i]).collect(),
            })
            .collect();

        let mut selected = Self::new(metric_names, records)?;
        selected.period_format = self.period_format;
        Ok(selected)
    }
}

fn read_periods(column: &Column) -> Result<(Vec<NaiveDate>, Option<PeriodFormat>)> {
    let series = column.as_materialized_series();
    let name = series.name().to_string();

    let text = match series.dtype() {
        DataType::Date => series.cast(&DataType::String)?,
        DataType::Datetime(_, _) => series.cast(&DataType::Date)?.cast(&DataType::String)?,
        _ => series.cast(&DataType::String)?,
    };
    let native_dates = matches!(series.dtype(), DataType::Date | DataType::Datetime(_, _));

    let labels = text
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, label)| {
            label
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .ok_or_else(|| QualityError::Format {
                    label: String::new(),
                    reason: format!("row {} has no value in period column '{}'", row, name),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let dates = PeriodNormalizer::normalize(&labels)?;
    let format = if native_dates || labels.is_empty() {
        None
    } else {
        PeriodNormalizer::detect_format(&labels).ok()
    };
    Ok((dates, format))
}

fn read_groups(column: &Column, column_name: &str) -> Result<Vec<String>> {
    let text = column.as_materialized_series().cast(&DataType::String)?;
    text.str()?
        .into_iter()
        .enumerate()
        .map(|(row, key)| {
            key.map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| QualityError::MissingGroupKey {
                    column: column_name.to_string(),
                    row,
                })
        })
        .collect()
}

/// Read a metric column as `f64`, or `None` when it is not a metric.
fn read_metric(column: &Column) -> Result<Option<Vec<Option<f64>>>> {
    let series = column.as_materialized_series();
    let dtype = series.dtype();

    if is_numeric_dtype(dtype) {
        let floats = series.cast(&DataType::Float64)?;
        let values = floats
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        return Ok(Some(values));
    }

    if is_text_dtype(dtype) {
        let text = series.cast(&DataType::String)?;
        let raw: Vec<Option<&str>> = text.str()?.into_iter().collect();
        let values: Vec<Option<f64>> = raw
            .iter()
            .map(|cell| cell.and_then(parse_numeric_string))
            .collect();
        let has_text = raw
            .iter()
            .flatten()
            .any(|cell| !cell.trim().is_empty() && !is_error_marker(cell));
        let has_numbers = values.iter().any(|v| v.is_some());
        if has_numbers || !has_text {
            return Ok(Some(values));
        }
        return Ok(None);
    }

    if matches!(dtype, DataType::Null) {
        return Ok(Some(vec![None; series.len()]));
    }

    Ok(None)
}
