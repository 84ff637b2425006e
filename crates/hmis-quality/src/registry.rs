//! Facility master list.
//!
//! A read-only lookup from facility name to district, passed explicitly to
//! whatever needs it. Outlier summaries use it to attach districts and to
//! drop facilities that are not on the master list.

use crate::error::{QualityError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityRegistry {
    districts: BTreeMap<String, String>,
}

impl FacilityRegistry {
    pub fn from_pairs<I, F, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, D)>,
        F: Into<String>,
        D: Into<String>,
    {
        Self {
            districts: pairs
                .into_iter()
                .map(|(facility, district)| (facility.into(), district.into()))
                .collect(),
        }
    }

    /// Load from a master-list frame with a facility and a district column.
    ///
    /// Rows missing either value are ignored.
    pub fn from_dataframe(df: &DataFrame, facility_column: &str, district_column: &str) -> Result<Self> {
        let facilities = df
            .column(facility_column)
            .map_err(|_| QualityError::MissingColumn(facility_column.to_string()))?
            .as_materialized_series()
            .cast(&DataType::String)?;
        let districts = df
            .column(district_column)
            .map_err(|_| QualityError::MissingColumn(district_column.to_string()))?
            .as_materialized_series()
            .cast(&DataType::String)?;

        let pairs = facilities
            .str()?
            .into_iter()
            .zip(districts.str()?.into_iter())
            .filter_map(|(facility, district)| {
                Some((facility?.trim().to_string(), district?.trim().to_string()))
            });

        Ok(Self::from_pairs(pairs))
    }

    pub fn district(&self, facility: &str) -> Option<&str> {
        self.districts.get(facility).map(String::as_str)
    }

    pub fn contains(&self, facility: &str) -> bool {
        self.districts.contains_key(facility)
    }

    pub fn len(&self) -> usize {
        self.districts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}
