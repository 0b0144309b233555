use crate::config::AssessmentConfig;
use crate::error::{AssessmentError, AssessmentResult};
use crate::model::{Comid, GeometryTable, PollutantValues, RawResults, RunType};
use crate::pollutant::{Column, ComidType, Metric, Pollutant, QuantityType};
use crate::select::{ResultTable, select_run};
use crate::table::{DerivedColumn, EnrichedTable, Stage};
use std::collections::BTreeMap;

// add_* appends to the table; compute_* returns the new columns against a
// shared table so scenarios can run side by side. inf/NaN are never masked.

/// Values aligned to the comids of a geometry table.
pub type ComidSeries = BTreeMap<Comid, f64>;

/// Join one selection of results onto the geometry.
///
/// Every geometry row is kept; rows without results get NaN pollutant values.
/// Results for comids outside the geometry are dropped, as are the configured
/// administrative columns.
pub fn join_results(
    config: &AssessmentConfig,
    comid_type: ComidType,
    geometry: &GeometryTable,
    raw: &RawResults,
    run_group: &str,
    run_type: RunType,
    ps: bool,
) -> AssessmentResult<EnrichedTable> {
    let results = select_run(config, comid_type, raw, run_group, run_type, ps);

    let mut records = Vec::with_capacity(geometry.len());
    let mut values = Vec::with_capacity(geometry.len());
    let mut matched = 0;
    for record in geometry.records() {
        let mut record = record.clone();
        for dropped in &config.columns.dropped {
            record.attributes.remove(dropped);
        }
        match results.get(record.comid) {
            Some(found) => {
                matched += 1;
                values.push(*found);
            }
            None => values.push(PollutantValues::missing()),
        }
        records.push(record);
    }

    tracing::info!(
        comid_type = %comid_type,
        run_group,
        rows = records.len(),
        matched,
        outside = results.len().saturating_sub(matched),
        "joined results to geometry"
    );

    EnrichedTable::new(
        results.selection().clone(),
        records,
        values,
        geometry.has_catchment_hectares(),
    )
}

/// Per-row divisor turning model values into the table's quantity.
fn normalize_by(table: &EnrichedTable) -> AssessmentResult<Vec<f64>> {
    match table.comid_type() {
        ComidType::Reach => Ok(vec![1.0; table.len()]),
        ComidType::Catch => table.catchment_hectares(),
    }
}

/// Look up `results` for every row of the table, NaN where absent.
fn aligned(table: &EnrichedTable, results: &ResultTable, pollutant: Pollutant) -> Vec<f64> {
    table
        .comids()
        .map(|comid| results.get(comid).map_or(f64::NAN, |v| v.get(pollutant)))
        .collect()
}

fn baseline_label(config: &AssessmentConfig) -> AssessmentResult<&str> {
    Ok(config.baseline()?.label.as_str())
}

pub fn compute_loadrate(table: &EnrichedTable) -> AssessmentResult<Vec<DerivedColumn>> {
    let area = table.catchment_hectares()?;
    Ok(Pollutant::ALL
        .iter()
        .map(|&pollutant| {
            let rate = table
                .pollutant(pollutant)
                .iter()
                .zip(&area)
                .map(|(load, ha)| load / ha)
                .collect();
            (
                Column::new(pollutant, QuantityType::LoadRate, Metric::Base),
                rate,
            )
        })
        .collect())
}

/// Add `{abbrev}_loadrate = {Pollutant} / catchment_hectares` for every pollutant.
pub fn add_loadrate(table: &mut EnrichedTable) -> AssessmentResult<()> {
    let columns = compute_loadrate(table)?;
    table.insert_columns(columns)
}

/// Add `{abbrev}_conc`. Reach results are already concentrations.
pub fn add_conc(table: &mut EnrichedTable) -> AssessmentResult<()> {
    let columns = Pollutant::ALL
        .iter()
        .map(|&p| (Column::new(p, QuantityType::Conc, Metric::Base), table.pollutant(p)))
        .collect();
    table.insert_columns(columns)
}

/// Load rate for catchments, concentration for reaches.
pub fn add_quantity(table: &mut EnrichedTable) -> AssessmentResult<()> {
    match table.comid_type() {
        ComidType::Catch => add_loadrate(table),
        ComidType::Reach => add_conc(table),
    }
}

/// Load rate of one pollutant for any run group, without touching a table.
///
/// The series covers every geometry comid; comids without results are NaN.
pub fn calc_loadrate(
    config: &AssessmentConfig,
    geometry: &GeometryTable,
    raw: &RawResults,
    pollutant: Pollutant,
    run_group: &str,
    run_type: RunType,
    ps: bool,
) -> AssessmentResult<ComidSeries> {
    if !geometry.has_catchment_hectares() {
        return Err(AssessmentError::MissingColumn(
            "catchment_hectares".to_string(),
        ));
    }
    let results = select_run(config, ComidType::Catch, raw, run_group, run_type, ps);
    Ok(geometry
        .records()
        .iter()
        .map(|record| {
            let load = results.get(record.comid).map_or(f64::NAN, |v| v.get(pollutant));
            let area = record.catchment_hectares.unwrap_or(f64::NAN);
            (record.comid, load / area)
        })
        .collect())
}

pub fn compute_excess(
    config: &AssessmentConfig,
    table: &EnrichedTable,
) -> AssessmentResult<Vec<DerivedColumn>> {
    let quantity = table.comid_type().quantity();
    Pollutant::ALL
        .iter()
        .map(|&pollutant| {
            let base = table.require(&Column::new(pollutant, quantity, Metric::Base), Stage::Excess)?;
            let target = config.target(pollutant, quantity);
            Ok((
                Column::new(pollutant, quantity, Metric::Excess),
                base.iter().map(|v| v - target).collect(),
            ))
        })
        .collect()
}

/// Add `{abbrev}_{qt}_xs = {abbrev}_{qt} - target`. Negative excess is kept.
pub fn add_excess(
    config: &AssessmentConfig,
    comid_type: ComidType,
    table: &mut EnrichedTable,
) -> AssessmentResult<()> {
    table.check_comid_type(comid_type)?;
    let columns = compute_excess(config, table)?;
    table.insert_columns(columns)
}

/// Baseline point source contribution per row, normalized to the table's quantity.
///
/// A comid with no point source row has no point source discharge and gets 0.
fn point_source_values(
    config: &AssessmentConfig,
    table: &EnrichedTable,
    raw: &RawResults,
    run_type: RunType,
) -> AssessmentResult<Vec<(Pollutant, Vec<f64>)>> {
    let divisor = normalize_by(table)?;
    let ps = select_run(
        config,
        table.comid_type(),
        raw,
        baseline_label(config)?,
        run_type,
        true,
    );
    Ok(Pollutant::ALL
        .iter()
        .map(|&pollutant| {
            let values = table
                .comids()
                .zip(&divisor)
                .map(|(comid, d)| ps.get(comid).map_or(f64::NAN, |v| v.get(pollutant)) / d)
                .collect();
            (pollutant, values)
        })
        .collect())
}

/// Sediment has no point source breakdown, so its excess non point source
/// value for catchments is the excess itself.
fn tss_xsnps_default(table: &EnrichedTable, stage: Stage) -> AssessmentResult<DerivedColumn> {
    let xs = Column::new(Pollutant::Sediment, QuantityType::LoadRate, Metric::Excess);
    let values = table.require(&xs, stage)?.to_vec();
    Ok((
        Column::new(
            Pollutant::Sediment,
            QuantityType::LoadRate,
            Metric::ExcessNonPointSource,
        ),
        values,
    ))
}

pub fn compute_ps(
    config: &AssessmentConfig,
    table: &EnrichedTable,
    raw: &RawResults,
    run_type: RunType,
) -> AssessmentResult<Vec<DerivedColumn>> {
    let quantity = table.comid_type().quantity();
    let mut columns: Vec<DerivedColumn> = point_source_values(config, table, raw, run_type)?
        .into_iter()
        .map(|(p, values)| (Column::new(p, quantity, Metric::PointSource), values))
        .collect();
    if table.comid_type() == ComidType::Catch {
        columns.push(tss_xsnps_default(table, Stage::PointSource)?);
    }
    Ok(columns)
}

/// Add `{abbrev}_{qt}_ps`, the baseline point source contribution.
pub fn add_ps(
    config: &AssessmentConfig,
    comid_type: ComidType,
    table: &mut EnrichedTable,
    raw: &RawResults,
    run_type: RunType,
) -> AssessmentResult<()> {
    table.check_comid_type(comid_type)?;
    let columns = compute_ps(config, table, raw, run_type)?;
    table.insert_columns(columns)
}

pub fn compute_xsnps(
    config: &AssessmentConfig,
    table: &EnrichedTable,
    raw: &RawResults,
    run_type: RunType,
) -> AssessmentResult<Vec<DerivedColumn>> {
    let quantity = table.comid_type().quantity();
    let catch = table.comid_type() == ComidType::Catch;

    // Check ordering before selecting anything
    for pollutant in Pollutant::ALL {
        table.require(
            &Column::new(pollutant, quantity, Metric::Excess),
            Stage::ExcessNonPointSource,
        )?;
    }

    let mut columns = Vec::with_capacity(Pollutant::ALL.len());
    for (pollutant, ps) in point_source_values(config, table, raw, run_type)? {
        if catch && pollutant == Pollutant::Sediment {
            columns.push(tss_xsnps_default(table, Stage::ExcessNonPointSource)?);
            continue;
        }
        let xs = table.require(
            &Column::new(pollutant, quantity, Metric::Excess),
            Stage::ExcessNonPointSource,
        )?;
        columns.push((
            Column::new(pollutant, quantity, Metric::ExcessNonPointSource),
            xs.iter().zip(&ps).map(|(x, p)| x - p).collect(),
        ));
    }
    Ok(columns)
}

/// Add `{abbrev}_{qt}_xsnps = excess - point source`.
pub fn add_xsnps(
    config: &AssessmentConfig,
    comid_type: ComidType,
    table: &mut EnrichedTable,
    raw: &RawResults,
    run_type: RunType,
) -> AssessmentResult<()> {
    table.check_comid_type(comid_type)?;
    let columns = compute_xsnps(config, table, raw, run_type)?;
    table.insert_columns(columns)
}

/// `(scenario - baseline) / normalize_by` for every pollutant and row.
fn scenario_change(
    config: &AssessmentConfig,
    table: &EnrichedTable,
    raw: &RawResults,
    group_key: u8,
    run_type: RunType,
) -> AssessmentResult<Vec<(Pollutant, Vec<f64>)>> {
    let scenario_label = config.run_group(group_key)?.label.as_str();
    let divisor = normalize_by(table)?;
    let comid_type = table.comid_type();
    let base = select_run(config, comid_type, raw, baseline_label(config)?, run_type, false);
    let scenario = select_run(config, comid_type, raw, scenario_label, run_type, false);

    Ok(Pollutant::ALL
        .iter()
        .map(|&pollutant| {
            let before = aligned(table, &base, pollutant);
            let after = aligned(table, &scenario, pollutant);
            let change = before
                .iter()
                .zip(&after)
                .zip(&divisor)
                .map(|((b, a), d)| (a - b) / d)
                .collect();
            (pollutant, change)
        })
        .collect())
}

pub fn compute_remaining(
    config: &AssessmentConfig,
    table: &EnrichedTable,
    raw: &RawResults,
    group_key: u8,
    run_type: RunType,
) -> AssessmentResult<Vec<DerivedColumn>> {
    let quantity = table.comid_type().quantity();
    for pollutant in Pollutant::ALL {
        table.require(
            &Column::new(pollutant, quantity, Metric::ExcessNonPointSource),
            Stage::Remaining,
        )?;
    }

    scenario_change(config, table, raw, group_key, run_type)?
        .into_iter()
        .map(|(pollutant, change)| {
            let xsnps = table.require(
                &Column::new(pollutant, quantity, Metric::ExcessNonPointSource),
                Stage::Remaining,
            )?;
            // reduced = baseline - scenario = -change
            let remaining = xsnps.iter().zip(&change).map(|(x, c)| x + c).collect();
            Ok((
                Column::new(pollutant, quantity, Metric::Remaining(group_key)),
                remaining,
            ))
        })
        .collect()
}

/// Add `{abbrev}_{qt}_rem{group_key}`: excess non point source pollution left
/// after the restoration scenario's reduction relative to baseline.
pub fn add_remaining(
    config: &AssessmentConfig,
    comid_type: ComidType,
    table: &mut EnrichedTable,
    raw: &RawResults,
    group_key: u8,
    run_type: RunType,
) -> AssessmentResult<()> {
    table.check_comid_type(comid_type)?;
    let columns = compute_remaining(config, table, raw, group_key, run_type)?;
    table.insert_columns(columns)
}

pub fn compute_avoided(
    config: &AssessmentConfig,
    table: &EnrichedTable,
    raw: &RawResults,
    group_key: u8,
    run_type: RunType,
) -> AssessmentResult<Vec<DerivedColumn>> {
    let quantity = table.comid_type().quantity();
    Ok(scenario_change(config, table, raw, group_key, run_type)?
        .into_iter()
        .map(|(pollutant, change)| (Column::new(pollutant, quantity, Metric::Avoided), change))
        .collect())
}

/// Add `{abbrev}_{qt}_avoid = (scenario - baseline) / normalize_by` for a
/// protection scenario. Independent of the excess chain.
pub fn add_avoided(
    config: &AssessmentConfig,
    comid_type: ComidType,
    table: &mut EnrichedTable,
    raw: &RawResults,
    group_key: u8,
    run_type: RunType,
) -> AssessmentResult<()> {
    table.check_comid_type(comid_type)?;
    let columns = compute_avoided(config, table, raw, group_key, run_type)?;
    table.insert_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeometryRecord, RawResultRow};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    const BASE: &str = "No restoration or protection";
    const REST: &str = "Direct WPF Restoration";
    const PROT: &str = "Direct WPF Protection";

    fn values(tp: f64) -> PollutantValues {
        PollutantValues::new(2000.0, tp, 50000.0)
    }

    fn raw() -> RawResults {
        RawResults::new(vec![
            RawResultRow::new(1001, BASE, "Total", None, values(50.0)),
            RawResultRow::new(1001, BASE, "Point Sources", None, PollutantValues::new(100.0, 10.0, f64::NAN)),
            RawResultRow::new(1001, REST, "Total", None, values(30.0)),
            RawResultRow::new(1001, PROT, "Total", None, values(55.0)),
            RawResultRow::new(1002, BASE, "Total", None, values(20.0)),
            // Outside the mapped region
            RawResultRow::new(9999, BASE, "Total", None, values(1.0)),
        ])
    }

    fn geometry() -> GeometryTable {
        GeometryTable::new(vec![
            GeometryRecord::new(1001)
                .with_hectares(100.0)
                .with_attribute("huc", "020402")
                .with_attribute("streamorder", "3"),
            GeometryRecord::new(1002).with_hectares(40.0),
            GeometryRecord::new(1003).with_hectares(10.0),
        ])
    }

    fn col(pollutant: Pollutant, metric: Metric) -> Column {
        Column::new(pollutant, QuantityType::LoadRate, metric)
    }

    fn joined(config: &AssessmentConfig) -> EnrichedTable {
        join_results(
            config,
            ComidType::Catch,
            &geometry(),
            &raw(),
            BASE,
            RunType::Single,
            false,
        )
        .unwrap()
    }

    fn through_xsnps(config: &AssessmentConfig) -> EnrichedTable {
        let raw = raw();
        let mut table = joined(config);
        add_loadrate(&mut table).unwrap();
        add_excess(config, ComidType::Catch, &mut table).unwrap();
        add_ps(config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();
        add_xsnps(config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();
        table
    }

    #[test]
    fn join_keeps_geometry_and_drops_admin_columns() {
        let config = AssessmentConfig::new();
        let table = joined(&config);
        assert_eq!(table.comids().collect::<Vec<_>>(), vec![1001, 1002, 1003]);

        let record = table.record(1001).unwrap();
        assert!(!record.attributes.contains_key("huc"));
        assert_eq!(record.attributes["streamorder"], "3");

        assert_eq!(table.pollutant_values(1001).unwrap().total_p, 50.0);
        assert!(table.pollutant_values(1003).unwrap().total_p.is_nan());
        assert!(table.record(9999).is_none());
    }

    #[test]
    fn join_empty_selection_gives_nan_values() {
        let config = AssessmentConfig::new();
        let table = join_results(
            &config,
            ComidType::Catch,
            &geometry(),
            &raw(),
            "All Restoration",
            RunType::Single,
            false,
        )
        .unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.pollutant(Pollutant::TotalN).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn concrete_catchment_chain() {
        let config = AssessmentConfig::new();
        let table = through_xsnps(&config);

        let tp = |metric| table.value(1001, &col(Pollutant::TotalP, metric)).unwrap();
        assert_abs_diff_eq!(tp(Metric::Base), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(tp(Metric::Excess), 0.19, epsilon = 1e-12);
        assert_abs_diff_eq!(tp(Metric::PointSource), 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(tp(Metric::ExcessNonPointSource), 0.09, epsilon = 1e-12);

        // No point source row for 1002: ps and xsnps are missing, not zero
        assert_abs_diff_eq!(
            table.value(1002, &col(Pollutant::TotalP, Metric::Excess)).unwrap(),
            0.19,
            epsilon = 1e-12
        );
        assert!(table.value(1002, &col(Pollutant::TotalP, Metric::PointSource)).unwrap().is_nan());
        assert!(
            table
                .value(1002, &col(Pollutant::TotalP, Metric::ExcessNonPointSource))
                .unwrap()
                .is_nan()
        );
        // Sediment keeps its excess
        let tss_xs = table.value(1002, &col(Pollutant::Sediment, Metric::Excess)).unwrap();
        let tss_xsnps = table
            .value(1002, &col(Pollutant::Sediment, Metric::ExcessNonPointSource))
            .unwrap();
        assert_eq!(tss_xs.to_bits(), tss_xsnps.to_bits());
    }

    #[test]
    fn remaining_and_avoided_scenarios() {
        let config = AssessmentConfig::new();
        let raw = raw();
        let mut table = through_xsnps(&config);
        add_remaining(&config, ComidType::Catch, &mut table, &raw, 1, RunType::Single).unwrap();
        add_avoided(&config, ComidType::Catch, &mut table, &raw, 4, RunType::Single).unwrap();

        let rem = table.value(1001, &col(Pollutant::TotalP, Metric::Remaining(1))).unwrap();
        assert_abs_diff_eq!(rem, -0.11, epsilon = 1e-12);
        let avoid = table.value(1001, &col(Pollutant::TotalP, Metric::Avoided)).unwrap();
        assert_abs_diff_eq!(avoid, 0.05, epsilon = 1e-12);

        // No scenario rows for 1002
        assert!(table.value(1002, &col(Pollutant::TotalP, Metric::Remaining(1))).unwrap().is_nan());
    }

    #[test]
    fn remaining_scenarios_coexist() {
        let config = AssessmentConfig::new();
        let raw = raw();
        let mut table = through_xsnps(&config);
        add_remaining(&config, ComidType::Catch, &mut table, &raw, 1, RunType::Single).unwrap();
        add_remaining(&config, ComidType::Catch, &mut table, &raw, 3, RunType::Single).unwrap();
        assert!(table.column_by_name("tn_loadrate_rem1").is_some());
        assert!(table.column_by_name("tn_loadrate_rem3").is_some());
    }

    #[test]
    fn tss_xsnps_equals_xs_for_catchments() {
        let config = AssessmentConfig::new();
        let table = through_xsnps(&config);
        let xs = table.column(&col(Pollutant::Sediment, Metric::Excess)).unwrap();
        let xsnps = table
            .column(&col(Pollutant::Sediment, Metric::ExcessNonPointSource))
            .unwrap();
        // 1003 has no results, so both hold NaN
        assert!(xs[2].is_nan());
        assert!(xs.iter().zip(xsnps).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn ps_stage_seeds_tss_xsnps_for_catchments() {
        let config = AssessmentConfig::new();
        let raw = raw();
        let mut table = joined(&config);
        add_loadrate(&mut table).unwrap();
        add_excess(&config, ComidType::Catch, &mut table).unwrap();
        add_ps(&config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();

        let xs = table.column(&col(Pollutant::Sediment, Metric::Excess)).unwrap();
        let seeded = table
            .column(&col(Pollutant::Sediment, Metric::ExcessNonPointSource))
            .unwrap();
        assert!(xs.iter().zip(seeded).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(table.column(&col(Pollutant::TotalP, Metric::ExcessNonPointSource)).is_none());
    }

    #[test]
    fn ps_stage_does_not_seed_reaches() {
        let config = AssessmentConfig::new();
        let raw = RawResults::new(vec![RawResultRow::new(
            7,
            BASE,
            "Total",
            None,
            PollutantValues::new(5.0, 0.2, 300.0),
        )]);
        let geometry = GeometryTable::new(vec![GeometryRecord::new(7)]);
        let mut table =
            join_results(&config, ComidType::Reach, &geometry, &raw, BASE, RunType::Single, false)
                .unwrap();
        add_quantity(&mut table).unwrap();
        add_excess(&config, ComidType::Reach, &mut table).unwrap();
        add_ps(&config, ComidType::Reach, &mut table, &raw, RunType::Single).unwrap();

        let tss_xsnps = Column::new(Pollutant::Sediment, QuantityType::Conc, Metric::ExcessNonPointSource);
        assert!(!table.has_column(&tss_xsnps));
        assert_eq!(table.stage(), Stage::PointSource);
    }

    #[test]
    fn xsnps_works_without_ps_stage() {
        let config = AssessmentConfig::new();
        let raw = raw();
        let mut table = joined(&config);
        add_loadrate(&mut table).unwrap();
        add_excess(&config, ComidType::Catch, &mut table).unwrap();
        add_xsnps(&config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();
        let xsnps = table
            .value(1001, &col(Pollutant::TotalP, Metric::ExcessNonPointSource))
            .unwrap();
        assert_abs_diff_eq!(xsnps, 0.09, epsilon = 1e-12);
    }

    #[test]
    fn out_of_order_stages_fail_fast() {
        let config = AssessmentConfig::new();
        let raw = raw();
        let mut table = joined(&config);

        let err = add_excess(&config, ComidType::Catch, &mut table).unwrap_err();
        assert!(matches!(err, AssessmentError::StageOrder { requires: Stage::Quantity, .. }));

        add_loadrate(&mut table).unwrap();
        let err = add_xsnps(&config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap_err();
        assert!(matches!(err, AssessmentError::StageOrder { requires: Stage::Excess, .. }));

        let err = add_remaining(&config, ComidType::Catch, &mut table, &raw, 1, RunType::Single)
            .unwrap_err();
        assert!(matches!(
            err,
            AssessmentError::StageOrder { requires: Stage::ExcessNonPointSource, .. }
        ));

        // Nothing half-written
        assert_eq!(table.stage(), Stage::Quantity);
    }

    #[test]
    fn avoided_has_no_ordering_dependency() {
        let config = AssessmentConfig::new();
        let mut table = joined(&config);
        add_avoided(&config, ComidType::Catch, &mut table, &raw(), 4, RunType::Single).unwrap();
        assert!(table.column_by_name("tp_loadrate_avoid").is_some());
    }

    #[test]
    fn unknown_group_key() {
        let config = AssessmentConfig::new();
        let mut table = through_xsnps(&config);
        let err = add_remaining(&config, ComidType::Catch, &mut table, &raw(), 7, RunType::Single)
            .unwrap_err();
        assert!(matches!(err, AssessmentError::UnknownRunGroup(7)));
    }

    #[test]
    fn comid_type_must_match_table() {
        let config = AssessmentConfig::new();
        let mut table = joined(&config);
        add_loadrate(&mut table).unwrap();
        let err = add_excess(&config, ComidType::Reach, &mut table).unwrap_err();
        assert!(matches!(err, AssessmentError::ComidTypeMismatch { .. }));
    }

    #[test]
    fn loadrate_needs_area_column() {
        let config = AssessmentConfig::new();
        let geometry = GeometryTable::new(vec![GeometryRecord::new(1001)]);
        let mut table = join_results(
            &config,
            ComidType::Catch,
            &geometry,
            &raw(),
            BASE,
            RunType::Single,
            false,
        )
        .unwrap();
        let err = add_loadrate(&mut table).unwrap_err();
        assert!(matches!(err, AssessmentError::MissingColumn(c) if c == "catchment_hectares"));
    }

    #[test]
    fn zero_area_is_not_masked() {
        let config = AssessmentConfig::new();
        let geometry = GeometryTable::new(vec![GeometryRecord::new(1001).with_hectares(0.0)]);
        let mut table = join_results(
            &config,
            ComidType::Catch,
            &geometry,
            &raw(),
            BASE,
            RunType::Single,
            false,
        )
        .unwrap();
        add_loadrate(&mut table).unwrap();
        let rate = table.value(1001, &col(Pollutant::TotalP, Metric::Base)).unwrap();
        assert!(rate.is_infinite());
    }

    #[test]
    fn reach_chain_uses_concentrations() {
        let config = AssessmentConfig::new();
        let raw = RawResults::new(vec![
            RawResultRow::new(7, BASE, "Total", None, PollutantValues::new(5.0, 0.2, 300.0)),
            RawResultRow::new(
                7,
                BASE,
                "Point Source Derived Concentration",
                None,
                PollutantValues::new(0.5, 0.05, 10.0),
            ),
            RawResultRow::new(7, REST, "Total", None, PollutantValues::new(4.5, 0.15, 280.0)),
        ]);
        let geometry = GeometryTable::new(vec![GeometryRecord::new(7)]);
        let mut table =
            join_results(&config, ComidType::Reach, &geometry, &raw, BASE, RunType::Single, false)
                .unwrap();
        add_quantity(&mut table).unwrap();
        add_excess(&config, ComidType::Reach, &mut table).unwrap();
        add_ps(&config, ComidType::Reach, &mut table, &raw, RunType::Single).unwrap();
        add_xsnps(&config, ComidType::Reach, &mut table, &raw, RunType::Single).unwrap();
        add_remaining(&config, ComidType::Reach, &mut table, &raw, 1, RunType::Single).unwrap();

        let conc = |p, m| table.value(7, &Column::new(p, QuantityType::Conc, m)).unwrap();
        assert_abs_diff_eq!(conc(Pollutant::TotalP, Metric::Excess), 0.11, epsilon = 1e-12);
        assert_abs_diff_eq!(conc(Pollutant::TotalP, Metric::ExcessNonPointSource), 0.06, epsilon = 1e-12);
        // Reach sediment is decomposed like the others
        assert_abs_diff_eq!(conc(Pollutant::Sediment, Metric::ExcessNonPointSource), 52.7, epsilon = 1e-9);
        assert_abs_diff_eq!(conc(Pollutant::TotalP, Metric::Remaining(1)), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn calc_loadrate_series() {
        let config = AssessmentConfig::new();
        let series = calc_loadrate(
            &config,
            &geometry(),
            &raw(),
            Pollutant::TotalP,
            REST,
            RunType::Single,
            false,
        )
        .unwrap();
        assert_eq!(series.len(), 3);
        assert_abs_diff_eq!(series[&1001], 0.3, epsilon = 1e-12);
        assert!(series[&1002].is_nan());
    }

    #[test]
    fn stages_only_append() {
        let config = AssessmentConfig::new();
        let raw = raw();
        let mut table = joined(&config);
        add_loadrate(&mut table).unwrap();

        let before: Vec<(Column, Vec<f64>)> =
            table.columns().map(|(c, v)| (*c, v.to_vec())).collect();
        add_excess(&config, ComidType::Catch, &mut table).unwrap();
        add_ps(&config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();
        add_xsnps(&config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();
        add_avoided(&config, ComidType::Catch, &mut table, &raw, 4, RunType::Single).unwrap();

        for (column, values) in before {
            let after = table.column(&column).unwrap();
            assert!(values.iter().zip(after).all(|(a, b)| a.to_bits() == b.to_bits()));
        }
    }

    #[test]
    fn loadrate_is_idempotent_on_copies() {
        let config = AssessmentConfig::new();
        let base = joined(&config);
        let mut first = base.clone();
        let mut second = base.clone();
        add_loadrate(&mut first).unwrap();
        add_loadrate(&mut second).unwrap();
        for pollutant in Pollutant::ALL {
            let c = col(pollutant, Metric::Base);
            let a = first.column(&c).unwrap();
            let b = second.column(&c).unwrap();
            assert!(a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()));
        }
    }

    fn arb_geometry_and_raw() -> impl Strategy<Value = (GeometryTable, RawResults)> {
        prop::collection::vec(
            (0.1f64..5000.0, 0.0f64..1e5, 0.0f64..1e3, 0.0f64..1e7, prop::option::of(0.0f64..50.0)),
            1..25,
        )
        .prop_map(|rows| {
            let mut records = Vec::new();
            let mut raw = Vec::new();
            for (i, (ha, tn, tp, tss, ps)) in rows.into_iter().enumerate() {
                let comid = i as Comid + 1;
                records.push(GeometryRecord::new(comid).with_hectares(ha));
                raw.push(RawResultRow::new(comid, BASE, "Total", None, PollutantValues::new(tn, tp, tss)));
                if let Some(ps) = ps {
                    raw.push(RawResultRow::new(
                        comid,
                        BASE,
                        "Point Sources",
                        None,
                        PollutantValues::new(ps, ps / 10.0, f64::NAN),
                    ));
                }
            }
            (GeometryTable::new(records), RawResults::new(raw))
        })
    }

    proptest! {
        #[test]
        fn excess_is_quantity_minus_target((geometry, raw) in arb_geometry_and_raw()) {
            let config = AssessmentConfig::new();
            let mut table = join_results(&config, ComidType::Catch, &geometry, &raw, BASE, RunType::Single, false).unwrap();
            add_loadrate(&mut table).unwrap();
            add_excess(&config, ComidType::Catch, &mut table).unwrap();
            for pollutant in Pollutant::ALL {
                let target = config.target(pollutant, QuantityType::LoadRate);
                let base = table.column(&col(pollutant, Metric::Base)).unwrap();
                let xs = table.column(&col(pollutant, Metric::Excess)).unwrap();
                for (b, x) in base.iter().zip(xs) {
                    prop_assert!((x - (b - target)).abs() <= 1e-9 * b.abs().max(1.0));
                }
            }
        }

        #[test]
        fn tss_xsnps_always_matches_xs((geometry, raw) in arb_geometry_and_raw()) {
            let config = AssessmentConfig::new();
            let mut table = join_results(&config, ComidType::Catch, &geometry, &raw, BASE, RunType::Single, false).unwrap();
            add_loadrate(&mut table).unwrap();
            add_excess(&config, ComidType::Catch, &mut table).unwrap();
            add_xsnps(&config, ComidType::Catch, &mut table, &raw, RunType::Single).unwrap();
            let xs = table.column(&col(Pollutant::Sediment, Metric::Excess)).unwrap();
            let xsnps = table.column(&col(Pollutant::Sediment, Metric::ExcessNonPointSource)).unwrap();
            for (a, b) in xs.iter().zip(xsnps) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }
}
