use crate::pollutant::Pollutant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier shared by a stream reach and its contributing catchment.
pub type Comid = u64;

// How a basin was modeled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// One HUC basin modeled alone.
    #[default]
    Single,
    /// Upstream contributions aggregated into the downstream basin.
    Combined,
}

impl RunType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Single => "single",
            RunType::Combined => "combined",
        }
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "single" => Ok(RunType::Single),
            "combined" => Ok(RunType::Combined),
            other => Err(format!("unknown run_type '{}'", other)),
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TotalN / TotalP / Sediment for one row. Missing values are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantValues {
    pub total_n: f64,
    pub total_p: f64,
    pub sediment: f64,
}

impl PollutantValues {
    pub fn new(total_n: f64, total_p: f64, sediment: f64) -> Self {
        PollutantValues {
            total_n,
            total_p,
            sediment,
        }
    }

    pub fn missing() -> Self {
        PollutantValues::new(f64::NAN, f64::NAN, f64::NAN)
    }

    pub fn get(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::TotalN => self.total_n,
            Pollutant::TotalP => self.total_p,
            Pollutant::Sediment => self.sediment,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: f64) {
        match pollutant {
            Pollutant::TotalN => self.total_n = value,
            Pollutant::TotalP => self.total_p = value,
            Pollutant::Sediment => self.sediment = value,
        }
    }
}

impl Default for PollutantValues {
    fn default() -> Self {
        PollutantValues::new(0.0, 0.0, 0.0)
    }
}

// One modeled observation from the loading model output
#[derive(Debug, Clone, PartialEq)]
pub struct RawResultRow {
    pub comid: Comid,
    pub run_group: String,
    pub source: String,
    pub run_type: Option<RunType>,
    pub values: PollutantValues,
}

impl RawResultRow {
    pub fn new(
        comid: Comid,
        run_group: &str,
        source: &str,
        run_type: Option<RunType>,
        values: PollutantValues,
    ) -> Self {
        RawResultRow {
            comid,
            run_group: run_group.to_string(),
            source: source.to_string(),
            run_type,
            values,
        }
    }
}

/// Long-format model output. Row order is input order.
#[derive(Debug, Clone, Default)]
pub struct RawResults {
    rows: Vec<RawResultRow>,
    has_run_type: bool,
}

impl RawResults {
    /// The run_type column is taken to exist when any row carries a run type.
    pub fn new(rows: Vec<RawResultRow>) -> Self {
        let has_run_type = rows.iter().any(|row| row.run_type.is_some());
        RawResults { rows, has_run_type }
    }

    pub fn with_run_type_column(rows: Vec<RawResultRow>, has_run_type: bool) -> Self {
        RawResults { rows, has_run_type }
    }

    pub fn rows(&self) -> &[RawResultRow] {
        &self.rows
    }

    pub fn has_run_type(&self) -> bool {
        self.has_run_type
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// One spatial feature
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryRecord {
    pub comid: Comid,
    pub catchment_hectares: Option<f64>,
    /// Feature geometry as WKT, passed through untouched.
    pub geometry: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl GeometryRecord {
    pub fn new(comid: Comid) -> Self {
        GeometryRecord {
            comid,
            ..Default::default()
        }
    }

    pub fn with_hectares(mut self, hectares: f64) -> Self {
        self.catchment_hectares = Some(hectares);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeometryTable {
    records: Vec<GeometryRecord>,
    has_catchment_hectares: bool,
}

impl GeometryTable {
    /// The catchment_hectares column is taken to exist when any record has an area.
    pub fn new(records: Vec<GeometryRecord>) -> Self {
        let has_catchment_hectares = records.iter().any(|r| r.catchment_hectares.is_some());
        GeometryTable {
            records,
            has_catchment_hectares,
        }
    }

    pub fn with_area_column(records: Vec<GeometryRecord>, has_catchment_hectares: bool) -> Self {
        GeometryTable {
            records,
            has_catchment_hectares,
        }
    }

    pub fn records(&self) -> &[GeometryRecord] {
        &self.records
    }

    pub fn has_catchment_hectares(&self) -> bool {
        self.has_catchment_hectares
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
