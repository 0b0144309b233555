use crate::model::Comid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const SQ_METERS_PER_ACRE: f64 = 4046.86;

pub const TOTAL_LABEL: &str = "TOTAL";

// One restoration or protection practice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeRecord {
    pub practice_type: String,
    pub practice_id: String,
    /// Footprint in square meters, absent for practices without geometry.
    #[serde(default)]
    pub area_m2: Option<f64>,
    /// Load reductions, restoration practices only.
    #[serde(default)]
    pub tn: Option<f64>,
    #[serde(default)]
    pub tp: Option<f64>,
    #[serde(default)]
    pub tss: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadReduced {
    pub tn: f64,
    pub tp: f64,
    pub tss: f64,
}

impl LoadReduced {
    fn add(&mut self, tn: Option<f64>, tp: Option<f64>, tss: Option<f64>) {
        self.tn += tn.unwrap_or(0.0);
        self.tp += tp.unwrap_or(0.0);
        self.tss += tss.unwrap_or(0.0);
    }

    fn rounded(self) -> Self {
        LoadReduced {
            tn: round2(self.tn),
            tp: round2(self.tp),
            tss: round2(self.tss),
        }
    }

    fn sum<'a>(loads: impl Iterator<Item = &'a LoadReduced>) -> Self {
        loads.fold(LoadReduced::default(), |acc, l| LoadReduced {
            tn: acc.tn + l.tn,
            tp: acc.tp + l.tp,
            tss: acc.tss + l.tss,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeSummaryRow {
    pub practice_type: String,
    pub practice_count: usize,
    pub area_ac: f64,
    pub load_reduced: Option<LoadReduced>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeSummary {
    pub restoration: bool,
    pub rows: Vec<PracticeSummaryRow>,
    /// Absent when there are no practices at all.
    pub total: Option<PracticeSummaryRow>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Count, area and (for restoration) load reductions by practice type.
///
/// Areas are converted to acres and rounded to two decimals per practice type;
/// the TOTAL row sums the rounded values.
pub fn summarize_practices(records: &[PracticeRecord], restoration: bool) -> PracticeSummary {
    let mut groups: BTreeMap<&str, (usize, f64, LoadReduced)> = BTreeMap::new();
    for record in records {
        let entry = groups
            .entry(record.practice_type.as_str())
            .or_insert((0, 0.0, LoadReduced::default()));
        entry.0 += 1;
        entry.1 += record.area_m2.unwrap_or(0.0) / SQ_METERS_PER_ACRE;
        entry.2.add(record.tn, record.tp, record.tss);
    }

    let rows: Vec<PracticeSummaryRow> = groups
        .into_iter()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(practice_type, (count, area, load))| PracticeSummaryRow {
            practice_type: practice_type.to_string(),
            practice_count: count,
            area_ac: round2(area),
            load_reduced: restoration.then_some(load),
        })
        .collect();

    let total = PracticeSummaryRow {
        practice_type: TOTAL_LABEL.to_string(),
        practice_count: rows.iter().map(|r| r.practice_count).sum(),
        area_ac: rows.iter().map(|r| r.area_ac).sum(),
        load_reduced: restoration
            .then(|| LoadReduced::sum(rows.iter().filter_map(|r| r.load_reduced.as_ref()))),
    };

    PracticeSummary {
        restoration,
        rows,
        total: (total.practice_count > 0).then_some(total),
    }
}

// One PA DEP best management practice with its reported reductions (lbs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmpRecord {
    #[serde(rename = "bmp/practice")]
    pub practice: String,
    pub id: String,
    /// "ac" for area practices, "ft" for linear ones.
    #[serde(rename = "units2")]
    pub units: String,
    #[serde(rename = "extent2", default)]
    pub extent: Option<f64>,
    #[serde(default)]
    pub tn_lbs_reduced: Option<f64>,
    #[serde(default)]
    pub tp_lbs_reduced: Option<f64>,
    #[serde(default)]
    pub tss_lbs_reduced: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmpSummaryRow {
    pub practice: String,
    pub id_count: usize,
    pub area_ac: f64,
    pub length_ft: f64,
    pub load_reduced: LoadReduced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmpSummary {
    pub rows: Vec<BmpSummaryRow>,
    pub total: Option<BmpSummaryRow>,
}

/// Id count, acres, feet and rounded load reductions per BMP.
///
/// Extents are split by unit: "ac" rows add to the area, "ft" rows to the
/// length, anything else to neither. Each id is counted once.
pub fn summarize_bmps(records: &[BmpRecord]) -> BmpSummary {
    let mut groups: BTreeMap<&str, BmpSummaryRow> = BTreeMap::new();
    for record in records {
        let row = groups
            .entry(record.practice.as_str())
            .or_insert_with(|| BmpSummaryRow {
                practice: record.practice.clone(),
                id_count: 0,
                area_ac: 0.0,
                length_ft: 0.0,
                load_reduced: LoadReduced::default(),
            });
        row.id_count += 1;
        let extent = record.extent.unwrap_or(0.0);
        match record.units.as_str() {
            "ac" => row.area_ac += extent,
            "ft" => row.length_ft += extent,
            _ => {}
        }
        row.load_reduced
            .add(record.tn_lbs_reduced, record.tp_lbs_reduced, record.tss_lbs_reduced);
    }

    let rows: Vec<BmpSummaryRow> = groups
        .into_values()
        .map(|row| BmpSummaryRow {
            area_ac: round2(row.area_ac),
            length_ft: round2(row.length_ft),
            load_reduced: row.load_reduced.rounded(),
            ..row
        })
        .collect();

    let total = (!rows.is_empty()).then(|| BmpSummaryRow {
        practice: TOTAL_LABEL.to_string(),
        id_count: rows.iter().map(|r| r.id_count).sum(),
        area_ac: rows.iter().map(|r| r.area_ac).sum(),
        length_ft: rows.iter().map(|r| r.length_ft).sum(),
        load_reduced: LoadReduced::sum(rows.iter().map(|r| &r.load_reduced)),
    });

    BmpSummary { rows, total }
}

// Agricultural and developed land reductions (lbs) credited to one comid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyReductionRecord {
    pub comid: Comid,
    #[serde(rename = "county_FIPS")]
    pub county_fips: String,
    #[serde(default)]
    pub tn_ag_reduction_lbs: Option<f64>,
    #[serde(default)]
    pub tp_ag_reduction_lbs: Option<f64>,
    #[serde(default)]
    pub tss_ag_reduction_lbs: Option<f64>,
    #[serde(default)]
    pub tn_dev_reduction_lbs: Option<f64>,
    #[serde(default)]
    pub tp_dev_reduction_lbs: Option<f64>,
    #[serde(default)]
    pub tss_dev_reduction_lbs: Option<f64>,
}

// FIPS code to county name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyName {
    #[serde(rename = "FIPS")]
    pub fips: String,
    #[serde(rename = "County")]
    pub county: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountySummaryRow {
    pub county: String,
    pub comid_count: usize,
    pub ag: LoadReduced,
    pub dev: LoadReduced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountySummary {
    pub rows: Vec<CountySummaryRow>,
    pub total: Option<CountySummaryRow>,
}

/// FIPS codes come as "42101" or "42101.0" depending on the export.
fn fips_key(code: &str) -> String {
    let code = code.trim();
    match code.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= 0.0 => format!("{}", v as u64),
        _ => code.to_string(),
    }
}

/// Comid count and rounded ag / developed reductions per county, ordered by
/// FIPS code. Counties missing from `names` keep their FIPS code as the label.
pub fn summarize_county_reductions(
    records: &[CountyReductionRecord],
    names: &[CountyName],
) -> CountySummary {
    let names: HashMap<String, &str> = names
        .iter()
        .map(|n| (fips_key(&n.fips), n.county.as_str()))
        .collect();

    let mut groups: BTreeMap<String, (usize, LoadReduced, LoadReduced)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(fips_key(&record.county_fips)).or_default();
        entry.0 += 1;
        entry.1.add(
            record.tn_ag_reduction_lbs,
            record.tp_ag_reduction_lbs,
            record.tss_ag_reduction_lbs,
        );
        entry.2.add(
            record.tn_dev_reduction_lbs,
            record.tp_dev_reduction_lbs,
            record.tss_dev_reduction_lbs,
        );
    }

    let rows: Vec<CountySummaryRow> = groups
        .into_iter()
        .map(|(fips, (count, ag, dev))| {
            let county = names.get(&fips).map_or(fips.clone(), |name| name.to_string());
            if !names.contains_key(&fips) {
                tracing::warn!(fips = %fips, "no county name for FIPS code");
            }
            CountySummaryRow {
                county,
                comid_count: count,
                ag: ag.rounded(),
                dev: dev.rounded(),
            }
        })
        .collect();

    let total = (!rows.is_empty()).then(|| CountySummaryRow {
        county: TOTAL_LABEL.to_string(),
        comid_count: rows.iter().map(|r| r.comid_count).sum(),
        ag: LoadReduced::sum(rows.iter().map(|r| &r.ag)),
        dev: LoadReduced::sum(rows.iter().map(|r| &r.dev)),
    });

    CountySummary { rows, total }
}
