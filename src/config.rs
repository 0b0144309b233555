use crate::error::{AssessmentError, AssessmentResult};
use crate::pollutant::{ComidType, Pollutant, QuantityType};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Configuration structure for column name mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub comid: String,
    pub run_group: String,
    pub source: String,
    pub run_type: String,
    pub catchment_hectares: String,
    pub geometry: String,
    /// Join bookkeeping columns dropped from the geometry after the join.
    pub dropped: Vec<String>,
}

impl ColumnConfig {
    pub fn new() -> Self {
        ColumnConfig {
            comid: "comid".to_string(),
            run_group: "run_group".to_string(),
            source: "Source".to_string(),
            run_type: "run_type".to_string(),
            catchment_hectares: "catchment_hectares".to_string(),
            geometry: "geometry".to_string(),
            dropped: vec![
                "huc".to_string(),
                "gwlfe_endpoint".to_string(),
                "huc_level".to_string(),
            ],
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        ColumnConfig::new()
    }
}

/// Water quality target for one pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Catchment load rate target, kg/ha/yr.
    pub loadrate: f64,
    /// Reach concentration target, mg/L.
    pub conc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Targets {
    pub tn: Target,
    pub tp: Target,
    pub tss: Target,
}

impl Targets {
    pub fn new() -> Self {
        Targets {
            // Includes organic N
            tn: Target {
                loadrate: 17.07,
                conc: 4.73,
            },
            tp: Target {
                loadrate: 0.31,
                conc: 0.09,
            },
            tss: Target {
                loadrate: 923.80,
                conc: 237.30,
            },
        }
    }

    pub fn get(&self, pollutant: Pollutant, quantity: QuantityType) -> f64 {
        let target = match pollutant {
            Pollutant::TotalN => &self.tn,
            Pollutant::TotalP => &self.tp,
            Pollutant::Sediment => &self.tss,
        };
        match quantity {
            QuantityType::LoadRate => target.loadrate,
            QuantityType::Conc => target.conc,
        }
    }
}

impl Default for Targets {
    fn default() -> Self {
        Targets::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Baseline,
    Restoration,
    Protection,
}

/// A named bundle of conservation practices modeled together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunGroup {
    pub key: u8,
    pub label: String,
    pub kind: ScenarioKind,
    /// Funding programs whose practices were applied in this run.
    #[serde(default)]
    pub funding_sources: Vec<String>,
}

impl RunGroup {
    fn new(key: u8, label: &str, kind: ScenarioKind, funding_sources: &[&str]) -> Self {
        RunGroup {
            key,
            label: label.to_string(),
            kind,
            funding_sources: funding_sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

const RESTORATION_FUND: &str = "Delaware River Restoration Fund";
const OPERATIONAL_FUND: &str = "Delaware River Operational Fund";
const CONSERVATION_FUND: &str = "Delaware Watershed Conservation Fund";

fn default_run_groups() -> Vec<RunGroup> {
    vec![
        RunGroup::new(0, "No restoration or protection", ScenarioKind::Baseline, &[]),
        RunGroup::new(
            1,
            "Direct WPF Restoration",
            ScenarioKind::Restoration,
            &[RESTORATION_FUND],
        ),
        RunGroup::new(
            2,
            "Direct and Indirect WPF Restoration",
            ScenarioKind::Restoration,
            &[RESTORATION_FUND, OPERATIONAL_FUND, CONSERVATION_FUND],
        ),
        RunGroup::new(
            3,
            "All Restoration",
            ScenarioKind::Restoration,
            &[
                RESTORATION_FUND,
                OPERATIONAL_FUND,
                CONSERVATION_FUND,
                "PADEP",
                "NJDEP",
            ],
        ),
        RunGroup::new(
            4,
            "Direct WPF Protection",
            ScenarioKind::Protection,
            &["Delaware River Watershed Protection Fund - Forestland Capital Grants"],
        ),
    ]
}

// Source labels that carry special meaning in the model output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLabels {
    pub reach_point_source: String,
    pub catch_point_source: String,
    /// Labels of rows holding the sum over all sources.
    pub totals: Vec<String>,
}

impl SourceLabels {
    pub fn new() -> Self {
        SourceLabels {
            reach_point_source: "Point Source Derived Concentration".to_string(),
            catch_point_source: "Point Sources".to_string(),
            totals: vec!["Total".to_string(), "Entire area".to_string()],
        }
    }

    pub fn point_source(&self, comid_type: ComidType) -> &str {
        match comid_type {
            ComidType::Reach => &self.reach_point_source,
            ComidType::Catch => &self.catch_point_source,
        }
    }

    pub fn is_total(&self, source: &str) -> bool {
        self.totals.iter().any(|t| t == source)
    }
}

impl Default for SourceLabels {
    fn default() -> Self {
        SourceLabels::new()
    }
}

/// Land use sources reported together under one name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUseGroup {
    pub name: String,
    pub members: Vec<String>,
}

fn default_land_use_groups() -> Vec<LandUseGroup> {
    let group = |name: &str, members: &[&str]| LandUseGroup {
        name: name.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
    };
    vec![
        group(
            "Developed Land Uses",
            &[
                "Barren Areas",
                "High-Density Mixed",
                "Medium-Density Mixed",
                "Low-Density Mixed",
                "Low-Density Open Space",
                "Septic Systems",
            ],
        ),
        group("Ag Uses", &["Cropland", "Hay/Pasture", "Farm Animals"]),
    ]
}

/// Read-only lookup tables shared by every calculation.
///
/// Built once at startup and handed to each component by reference. A TOML file
/// may override any part of it; whatever the file leaves out keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub targets: Targets,
    pub run_groups: Vec<RunGroup>,
    pub sources: SourceLabels,
    pub land_use_groups: Vec<LandUseGroup>,
    pub columns: ColumnConfig,
}

impl AssessmentConfig {
    pub fn new() -> Self {
        AssessmentConfig {
            targets: Targets::new(),
            run_groups: default_run_groups(),
            sources: SourceLabels::new(),
            land_use_groups: default_land_use_groups(),
            columns: ColumnConfig::new(),
        }
    }

    pub fn from_toml_str(text: &str) -> AssessmentResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: &Path) -> AssessmentResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn target(&self, pollutant: Pollutant, quantity: QuantityType) -> f64 {
        self.targets.get(pollutant, quantity)
    }

    pub fn run_group(&self, key: u8) -> AssessmentResult<&RunGroup> {
        self.run_groups
            .iter()
            .find(|g| g.key == key)
            .ok_or(AssessmentError::UnknownRunGroup(key))
    }

    pub fn baseline(&self) -> AssessmentResult<&RunGroup> {
        self.run_groups
            .iter()
            .find(|g| g.kind == ScenarioKind::Baseline)
            .ok_or(AssessmentError::NoBaseline)
    }

    pub fn run_groups_of(&self, kind: ScenarioKind) -> impl Iterator<Item = &RunGroup> {
        self.run_groups.iter().filter(move |g| g.kind == kind)
    }

    /// Run groups whose practices include those paid for by `funding_source`.
    pub fn run_groups_funded_by<'a>(
        &'a self,
        funding_source: &'a str,
    ) -> impl Iterator<Item = &'a RunGroup> {
        self.run_groups
            .iter()
            .filter(move |g| g.funding_sources.iter().any(|f| f == funding_source))
    }

    pub fn point_source_label(&self, comid_type: ComidType) -> &str {
        self.sources.point_source(comid_type)
    }
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        AssessmentConfig::new()
    }
}
