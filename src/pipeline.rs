use crate::calc;
use crate::config::{AssessmentConfig, ScenarioKind};
use crate::error::AssessmentResult;
use crate::model::{GeometryTable, RawResults, RunType};
use crate::pollutant::ComidType;
use crate::table::{DerivedColumn, EnrichedTable, Stage};
use indicatif::ProgressBar;
use rayon::prelude::*;

/// Run groups evaluated after the excess chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scenarios {
    /// Restoration keys, one `_rem{key}` column set each.
    pub remaining: Vec<u8>,
    /// Protection keys for `_avoid`.
    pub avoided: Vec<u8>,
}

impl Scenarios {
    /// Every restoration group for remaining, every protection group for avoided.
    pub fn from_config(config: &AssessmentConfig) -> Self {
        Scenarios {
            remaining: config
                .run_groups_of(ScenarioKind::Restoration)
                .map(|g| g.key)
                .collect(),
            avoided: config
                .run_groups_of(ScenarioKind::Protection)
                .map(|g| g.key)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.remaining.len() + self.avoided.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty() && self.avoided.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum ScenarioJob {
    Remaining(u8),
    Avoided(u8),
}

/// Number of progress ticks [`run_pipeline`] makes for `scenarios`.
pub fn progress_len(scenarios: &Scenarios) -> u64 {
    5 + scenarios.len() as u64
}

fn step(progress: &ProgressBar, stage: Stage) {
    tracing::info!(stage = %stage, "stage complete");
    progress.set_message(stage.as_str());
    progress.inc(1);
}

/// Build the enriched table for the baseline run and every requested scenario.
///
/// The excess chain runs in order. Remaining and avoided scenarios only read
/// the finished chain, so they are computed in parallel against the shared
/// table and appended afterwards.
pub fn run_pipeline(
    config: &AssessmentConfig,
    comid_type: ComidType,
    geometry: &GeometryTable,
    raw: &RawResults,
    run_type: RunType,
    scenarios: &Scenarios,
    progress: &ProgressBar,
) -> AssessmentResult<EnrichedTable> {
    let baseline = config.baseline()?.label.clone();

    let mut table = calc::join_results(config, comid_type, geometry, raw, &baseline, run_type, false)?;
    step(progress, Stage::Joined);

    calc::add_quantity(&mut table)?;
    step(progress, Stage::Quantity);

    calc::add_excess(config, comid_type, &mut table)?;
    step(progress, Stage::Excess);

    calc::add_ps(config, comid_type, &mut table, raw, run_type)?;
    step(progress, Stage::PointSource);

    calc::add_xsnps(config, comid_type, &mut table, raw, run_type)?;
    step(progress, Stage::ExcessNonPointSource);

    let jobs: Vec<ScenarioJob> = scenarios
        .remaining
        .iter()
        .map(|&key| ScenarioJob::Remaining(key))
        .chain(scenarios.avoided.iter().map(|&key| ScenarioJob::Avoided(key)))
        .collect();

    let results: Vec<AssessmentResult<Vec<DerivedColumn>>> = jobs
        .par_iter()
        .map(|job| {
            let columns = match *job {
                ScenarioJob::Remaining(key) => {
                    calc::compute_remaining(config, &table, raw, key, run_type)
                }
                ScenarioJob::Avoided(key) => {
                    calc::compute_avoided(config, &table, raw, key, run_type)
                }
            };
            progress.inc(1);
            columns
        })
        .collect();

    // Merge by column union, in job order
    for columns in results {
        table.insert_columns(columns?)?;
    }
    if !jobs.is_empty() {
        tracing::info!(scenarios = jobs.len(), "scenario columns added");
    }

    progress.finish_with_message("done");
    Ok(table)
}
