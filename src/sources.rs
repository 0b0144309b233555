use crate::config::AssessmentConfig;
use crate::model::{Comid, PollutantValues, RawResults, RunType};
use crate::pollutant::{ComidType, Pollutant};
use std::collections::BTreeMap;

// How a model output row relates to the breakdown of a comid's load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    PointSource,
    Total,
    LandUse,
}

pub fn classify(config: &AssessmentConfig, comid_type: ComidType, source: &str) -> SourceKind {
    if source == config.point_source_label(comid_type) {
        SourceKind::PointSource
    } else if config.sources.is_total(source) {
        SourceKind::Total
    } else {
        SourceKind::LandUse
    }
}

/// Per comid, land use source name -> values, with configured groups summed in.
#[derive(Debug, Clone, Default)]
pub struct SourceBreakdown {
    rows: BTreeMap<Comid, BTreeMap<String, PollutantValues>>,
}

impl SourceBreakdown {
    pub fn get(&self, comid: Comid, source: &str) -> Option<&PollutantValues> {
        self.rows.get(&comid).and_then(|sources| sources.get(source))
    }

    pub fn sources(&self, comid: Comid) -> Option<&BTreeMap<String, PollutantValues>> {
        self.rows.get(&comid)
    }

    pub fn comids(&self) -> impl Iterator<Item = Comid> + '_ {
        self.rows.keys().copied()
    }

    /// Every source name present for any comid, sorted.
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rows
            .values()
            .flat_map(|sources| sources.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Land use loads of one run group, one row per (comid, source).
///
/// Run type handling matches `select_run`: `single` keeps single rows when the
/// column exists, `combined` prefers combined rows. Each configured land use
/// group is added as its own source; a member missing for a comid makes that
/// group NaN.
pub fn source_breakdown(
    config: &AssessmentConfig,
    comid_type: ComidType,
    raw: &RawResults,
    run_group: &str,
    run_type: RunType,
) -> SourceBreakdown {
    let filter_single = run_type == RunType::Single && raw.has_run_type();
    let mut rows: BTreeMap<Comid, BTreeMap<String, (Option<RunType>, PollutantValues)>> =
        BTreeMap::new();

    for row in raw.rows() {
        if row.run_group != run_group
            || classify(config, comid_type, &row.source) != SourceKind::LandUse
            || (filter_single && row.run_type != Some(RunType::Single))
        {
            continue;
        }
        let sources = rows.entry(row.comid).or_default();
        let keep_existing = run_type == RunType::Combined
            && row.run_type != Some(RunType::Combined)
            && sources
                .get(&row.source)
                .is_some_and(|(kept, _)| *kept == Some(RunType::Combined));
        if !keep_existing {
            sources.insert(row.source.clone(), (row.run_type, row.values));
        }
    }

    let mut breakdown = SourceBreakdown::default();
    for (comid, sources) in rows {
        let mut sources: BTreeMap<String, PollutantValues> =
            sources.into_iter().map(|(name, (_, v))| (name, v)).collect();
        for group in &config.land_use_groups {
            let mut sum = PollutantValues::default();
            for pollutant in Pollutant::ALL {
                let total: f64 = group
                    .members
                    .iter()
                    .map(|m| sources.get(m).map_or(f64::NAN, |v| v.get(pollutant)))
                    .sum();
                sum.set(pollutant, total);
            }
            sources.insert(group.name.clone(), sum);
        }
        breakdown.rows.insert(comid, sources);
    }

    tracing::debug!(
        run_group,
        comids = breakdown.len(),
        "built land use source breakdown"
    );
    breakdown
}
