use crate::error::AssessmentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Pollutants reported by the loading model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pollutant {
    TotalN,
    TotalP,
    Sediment,
}

impl Pollutant {
    pub const ALL: [Pollutant; 3] = [Pollutant::TotalN, Pollutant::TotalP, Pollutant::Sediment];

    /// Label used by the model output tables.
    pub fn name(self) -> &'static str {
        match self {
            Pollutant::TotalN => "TotalN",
            Pollutant::TotalP => "TotalP",
            Pollutant::Sediment => "Sediment",
        }
    }

    /// Abbreviation used in derived column names.
    pub fn abbrev(self) -> &'static str {
        match self {
            Pollutant::TotalN => "tn",
            Pollutant::TotalP => "tp",
            Pollutant::Sediment => "tss",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn from_abbrev(abbrev: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.abbrev() == abbrev)
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Geometry a comid refers to: the stream reach or its contributing catchment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComidType {
    Reach,
    Catch,
}

impl ComidType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComidType::Reach => "reach",
            ComidType::Catch => "catch",
        }
    }

    /// Reaches carry concentrations, catchments carry area-normalized load rates.
    pub fn quantity(self) -> QuantityType {
        match self {
            ComidType::Reach => QuantityType::Conc,
            ComidType::Catch => QuantityType::LoadRate,
        }
    }
}

impl FromStr for ComidType {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reach" => Ok(ComidType::Reach),
            "catch" => Ok(ComidType::Catch),
            other => Err(AssessmentError::InvalidComidType(other.to_string())),
        }
    }
}

impl fmt::Display for ComidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuantityType {
    /// kg/ha/yr
    LoadRate,
    /// mg/L
    Conc,
}

impl QuantityType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuantityType::LoadRate => "loadrate",
            QuantityType::Conc => "conc",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "loadrate" => Some(QuantityType::LoadRate),
            "conc" => Some(QuantityType::Conc),
            _ => None,
        }
    }
}

/// Which step of the calculation chain produced a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// The load rate or concentration itself, no suffix.
    Base,
    Excess,
    PointSource,
    ExcessNonPointSource,
    /// Remaining pollution after the restoration run group with this key.
    Remaining(u8),
    Avoided,
}

impl Metric {
    pub fn suffix(self) -> Option<String> {
        match self {
            Metric::Base => None,
            Metric::Excess => Some("xs".to_string()),
            Metric::PointSource => Some("ps".to_string()),
            Metric::ExcessNonPointSource => Some("xsnps".to_string()),
            Metric::Remaining(key) => Some(format!("rem{}", key)),
            Metric::Avoided => Some("avoid".to_string()),
        }
    }

    fn parse(suffix: &str) -> Option<Self> {
        match suffix {
            "xs" => Some(Metric::Excess),
            "ps" => Some(Metric::PointSource),
            "xsnps" => Some(Metric::ExcessNonPointSource),
            "avoid" => Some(Metric::Avoided),
            other => other
                .strip_prefix("rem")
                .and_then(|key| key.parse::<u8>().ok())
                .map(Metric::Remaining),
        }
    }
}

// Derived column key, named `{abbrev}_{quantity}[_{suffix}]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Column {
    pub pollutant: Pollutant,
    pub quantity: QuantityType,
    pub metric: Metric,
}

impl Column {
    pub fn new(pollutant: Pollutant, quantity: QuantityType, metric: Metric) -> Self {
        Column {
            pollutant,
            quantity,
            metric,
        }
    }

    pub fn name(&self) -> String {
        let stem = format!("{}_{}", self.pollutant.abbrev(), self.quantity.as_str());
        match self.metric.suffix() {
            Some(suffix) => format!("{}_{}", stem, suffix),
            None => stem,
        }
    }

    /// Inverse of [`Column::name`].
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(3, '_');
        let pollutant = Pollutant::from_abbrev(parts.next()?)?;
        let quantity = QuantityType::parse(parts.next()?)?;
        let metric = match parts.next() {
            Some(suffix) => Metric::parse(suffix)?,
            None => Metric::Base,
        };
        Some(Column::new(pollutant, quantity, metric))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
