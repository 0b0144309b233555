use crate::error::{AssessmentError, AssessmentResult};
use crate::model::{Comid, GeometryRecord, PollutantValues};
use crate::pollutant::{Column, ComidType, Metric, Pollutant};
use crate::select::Selection;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Calculation stages, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Joined,
    Quantity,
    Excess,
    PointSource,
    ExcessNonPointSource,
    Remaining,
    Avoided,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Joined => "join",
            Stage::Quantity => "load rate/concentration",
            Stage::Excess => "excess",
            Stage::PointSource => "point source",
            Stage::ExcessNonPointSource => "excess non-point source",
            Stage::Remaining => "remaining",
            Stage::Avoided => "avoided",
        }
    }

    /// Stage that adds columns carrying `metric`.
    pub fn producing(metric: Metric) -> Stage {
        match metric {
            Metric::Base => Stage::Quantity,
            Metric::Excess => Stage::Excess,
            Metric::PointSource => Stage::PointSource,
            Metric::ExcessNonPointSource => Stage::ExcessNonPointSource,
            Metric::Remaining(_) => Stage::Remaining,
            Metric::Avoided => Stage::Avoided,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type DerivedColumn = (Column, Vec<f64>);

/// Keyed uniquely by comid, rows in geometry order.
///
/// Derived columns only ever get appended. Inserting a column that already
/// exists is accepted when the values are bit-identical and rejected otherwise.
#[derive(Debug, Clone)]
pub struct EnrichedTable {
    comid_type: ComidType,
    selection: Selection,
    records: Vec<GeometryRecord>,
    index: HashMap<Comid, usize>,
    values: Vec<PollutantValues>,
    has_catchment_hectares: bool,
    columns: BTreeMap<Column, Vec<f64>>,
}

impl EnrichedTable {
    pub(crate) fn new(
        selection: Selection,
        records: Vec<GeometryRecord>,
        values: Vec<PollutantValues>,
        has_catchment_hectares: bool,
    ) -> AssessmentResult<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if index.insert(record.comid, row).is_some() {
                return Err(AssessmentError::DuplicateComid(record.comid));
            }
        }
        Ok(EnrichedTable {
            comid_type: selection.comid_type,
            selection,
            records,
            index,
            values,
            has_catchment_hectares,
            columns: BTreeMap::new(),
        })
    }

    pub fn comid_type(&self) -> ComidType {
        self.comid_type
    }

    /// The selection joined as the table's pollutant values.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn comids(&self) -> impl Iterator<Item = Comid> + '_ {
        self.records.iter().map(|r| r.comid)
    }

    pub fn records(&self) -> &[GeometryRecord] {
        &self.records
    }

    pub fn row_of(&self, comid: Comid) -> Option<usize> {
        self.index.get(&comid).copied()
    }

    pub fn record(&self, comid: Comid) -> Option<&GeometryRecord> {
        self.row_of(comid).map(|row| &self.records[row])
    }

    /// Joined TotalN/TotalP/Sediment for every row. NaN where nothing matched.
    pub fn pollutant(&self, pollutant: Pollutant) -> Vec<f64> {
        self.values.iter().map(|v| v.get(pollutant)).collect()
    }

    pub fn pollutant_values(&self, comid: Comid) -> Option<&PollutantValues> {
        self.row_of(comid).map(|row| &self.values[row])
    }

    pub fn has_catchment_hectares(&self) -> bool {
        self.has_catchment_hectares
    }

    /// Area per row; NaN for records without one.
    pub fn catchment_hectares(&self) -> AssessmentResult<Vec<f64>> {
        if !self.has_catchment_hectares {
            return Err(AssessmentError::MissingColumn(
                "catchment_hectares".to_string(),
            ));
        }
        Ok(self
            .records
            .iter()
            .map(|r| r.catchment_hectares.unwrap_or(f64::NAN))
            .collect())
    }

    pub fn column(&self, column: &Column) -> Option<&[f64]> {
        self.columns.get(column).map(|v| v.as_slice())
    }

    pub fn column_by_name(&self, name: &str) -> Option<&[f64]> {
        Column::parse(name).and_then(|c| self.column(&c))
    }

    pub fn has_column(&self, column: &Column) -> bool {
        self.columns.contains_key(column)
    }

    pub fn value(&self, comid: Comid, column: &Column) -> Option<f64> {
        let row = self.row_of(comid)?;
        self.column(column).map(|values| values[row])
    }

    pub fn columns(&self) -> impl Iterator<Item = (&Column, &[f64])> {
        self.columns.iter().map(|(c, v)| (c, v.as_slice()))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().map(|c| c.name()).collect()
    }

    /// Furthest stage whose columns are present.
    pub fn stage(&self) -> Stage {
        self.columns
            .keys()
            .map(|c| Stage::producing(c.metric))
            .max()
            .unwrap_or(Stage::Joined)
    }

    /// Column values needed by `stage`, or `StageOrder` naming the stage that adds them.
    pub(crate) fn require(&self, column: &Column, stage: Stage) -> AssessmentResult<&[f64]> {
        self.column(column).ok_or_else(|| AssessmentError::StageOrder {
            stage,
            column: column.name(),
            requires: Stage::producing(column.metric),
        })
    }

    pub(crate) fn check_comid_type(&self, expected: ComidType) -> AssessmentResult<()> {
        if self.comid_type != expected {
            return Err(AssessmentError::ComidTypeMismatch {
                expected,
                found: self.comid_type,
            });
        }
        Ok(())
    }

    /// Append columns. Either all are added or, on error, none are.
    pub fn insert_columns(&mut self, columns: Vec<DerivedColumn>) -> AssessmentResult<()> {
        for (column, values) in &columns {
            if values.len() != self.records.len() {
                return Err(AssessmentError::ColumnConflict(column.name()));
            }
            if let Some(existing) = self.columns.get(column) {
                if !bit_identical(existing, values) {
                    return Err(AssessmentError::ColumnConflict(column.name()));
                }
            }
        }
        for (column, values) in columns {
            self.columns.entry(column).or_insert(values);
        }
        Ok(())
    }
}

fn bit_identical(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
