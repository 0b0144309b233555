use crate::config::AssessmentConfig;
use crate::model::{Comid, PollutantValues, RawResultRow, RawResults, RunType};
use crate::pollutant::ComidType;
use std::collections::{BTreeMap, HashMap};

/// Which slice of the raw results a [`ResultTable`] holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub comid_type: ComidType,
    pub run_group: String,
    pub run_type: RunType,
    /// Point source values only (true) or totals (false).
    pub ps: bool,
}

/// One set of model results, at most one row per comid.
#[derive(Debug, Clone)]
pub struct ResultTable {
    selection: Selection,
    rows: BTreeMap<Comid, PollutantValues>,
    without_totals: Vec<Comid>,
}

impl ResultTable {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn get(&self, comid: Comid) -> Option<&PollutantValues> {
        self.rows.get(&comid)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Comid, &PollutantValues)> {
        self.rows.iter().map(|(comid, values)| (*comid, values))
    }

    pub fn comids(&self) -> impl Iterator<Item = Comid> + '_ {
        self.rows.keys().copied()
    }

    /// Comids whose value came from a land use row because no totals row was
    /// present. Always empty for point source selections.
    pub fn without_totals(&self) -> &[Comid] {
        &self.without_totals
    }
}

/// Select a single set of results for every comid.
///
/// Rows are picked by run group and by whether they are point source rows. With
/// `RunType::Single` and a run_type column present, only `single` rows count.
/// With `RunType::Combined` (or no run_type column at all) run type is ignored,
/// except that a row tagged `combined` wins over any other row with the same
/// (comid, source); untagged duplicates fall back to the last one read.
///
/// Where several non point source rows remain for a comid, a totals row wins,
/// then the last one read. No matching rows gives an empty table.
pub fn select_run(
    config: &AssessmentConfig,
    comid_type: ComidType,
    raw: &RawResults,
    run_group: &str,
    run_type: RunType,
    ps: bool,
) -> ResultTable {
    let ps_name = config.point_source_label(comid_type);
    let filter_single = run_type == RunType::Single && raw.has_run_type();

    let candidates = raw.rows().iter().enumerate().filter(|(_, row)| {
        row.run_group == run_group
            && (row.source == ps_name) == ps
            && (!filter_single || row.run_type == Some(RunType::Single))
    });

    // (comid, source) -> (input position, row)
    let mut by_source: HashMap<(Comid, &str), (usize, &RawResultRow)> = HashMap::new();
    for (pos, row) in candidates {
        let key = (row.comid, row.source.as_str());
        let keep_existing = run_type == RunType::Combined
            && row.run_type != Some(RunType::Combined)
            && by_source
                .get(&key)
                .is_some_and(|(_, kept)| kept.run_type == Some(RunType::Combined));
        if !keep_existing {
            by_source.insert(key, (pos, row));
        }
    }

    let mut chosen: BTreeMap<Comid, (bool, usize, &RawResultRow)> = BTreeMap::new();
    for (pos, row) in by_source.into_values() {
        let rank = (config.sources.is_total(&row.source), pos);
        let replace = match chosen.get(&row.comid) {
            Some((is_total, kept_pos, _)) => rank > (*is_total, *kept_pos),
            None => true,
        };
        if replace {
            chosen.insert(row.comid, (rank.0, rank.1, row));
        }
    }

    let mut without_totals = Vec::new();
    if !ps {
        for (comid, (is_total, _, row)) in &chosen {
            if !is_total {
                tracing::warn!(
                    comid,
                    source = %row.source,
                    run_group,
                    "no totals row, using the last source row as the comid total"
                );
                without_totals.push(*comid);
            }
        }
    }

    let rows: BTreeMap<Comid, PollutantValues> = chosen
        .into_iter()
        .map(|(comid, (_, _, row))| (comid, row.values))
        .collect();

    tracing::debug!(
        comid_type = %comid_type,
        run_group,
        run_type = %run_type,
        ps,
        rows = rows.len(),
        "selected run"
    );

    ResultTable {
        selection: Selection {
            comid_type,
            run_group: run_group.to_string(),
            run_type,
            ps,
        },
        rows,
        without_totals,
    }
}
