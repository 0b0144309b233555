use crate::config::ColumnConfig;
use crate::error::{AssessmentError, AssessmentResult};
use crate::model::{Comid, GeometryRecord, GeometryTable, PollutantValues, RawResultRow, RawResults};
use crate::pollutant::Pollutant;
use crate::summary::{
    BmpRecord, BmpSummary, CountyName, CountyReductionRecord, CountySummary, LoadReduced,
    PracticeRecord, PracticeSummary,
};
use crate::table::EnrichedTable;
use crate::sources::SourceBreakdown;
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

fn position(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn required(headers: &StringRecord, name: &str) -> AssessmentResult<usize> {
    position(headers, name).ok_or_else(|| AssessmentError::MissingColumn(name.to_string()))
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn field<'r>(record: &'r StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or("")
}

// Float ids must stay below 2^53 to be exact
const MAX_FLOAT_COMID: f64 = 9_007_199_254_740_992.0;

fn parse_comid(record: &StringRecord, index: usize, column: &str) -> AssessmentResult<Comid> {
    let text = field(record, index);
    // Some exports write integer ids as floats
    text.parse::<Comid>()
        .ok()
        .or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v < MAX_FLOAT_COMID)
                .map(|v| v as Comid)
        })
        .ok_or_else(|| AssessmentError::Parse {
            column: column.to_string(),
            value: text.to_string(),
            line: line_of(record),
        })
}

/// Empty cells and NaN markers read as NaN.
fn parse_value(record: &StringRecord, index: usize, column: &str) -> AssessmentResult<f64> {
    let text = field(record, index);
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    text.parse::<f64>().map_err(|_| AssessmentError::Parse {
        column: column.to_string(),
        value: text.to_string(),
        line: line_of(record),
    })
}

// Column positions in a raw results file
struct RawColumns {
    comid: usize,
    run_group: usize,
    source: usize,
    run_type: Option<usize>,
    pollutants: [usize; 3],
}

impl RawColumns {
    fn from_headers(headers: &StringRecord, config: &ColumnConfig) -> AssessmentResult<Self> {
        let mut pollutants = [0; 3];
        for (slot, pollutant) in pollutants.iter_mut().zip(Pollutant::ALL) {
            *slot = required(headers, pollutant.name())?;
        }
        Ok(RawColumns {
            comid: required(headers, &config.comid)?,
            run_group: required(headers, &config.run_group)?,
            source: required(headers, &config.source)?,
            run_type: position(headers, &config.run_type),
            pollutants,
        })
    }
}

impl RawResultRow {
    fn from_record(
        record: &StringRecord,
        columns: &RawColumns,
        config: &ColumnConfig,
    ) -> AssessmentResult<Self> {
        let run_type = match columns.run_type.map(|i| field(record, i)) {
            None | Some("") => None,
            Some(text) => Some(text.parse().map_err(|_| AssessmentError::Parse {
                column: config.run_type.clone(),
                value: text.to_string(),
                line: line_of(record),
            })?),
        };
        let mut values = PollutantValues::missing();
        for (pollutant, &index) in Pollutant::ALL.iter().zip(&columns.pollutants) {
            values.set(*pollutant, parse_value(record, index, pollutant.name())?);
        }
        Ok(RawResultRow {
            comid: parse_comid(record, columns.comid, &config.comid)?,
            run_group: field(record, columns.run_group).to_string(),
            source: field(record, columns.source).to_string(),
            run_type,
            values,
        })
    }
}

/// Read long-format model results. The run_type column is optional.
pub fn read_raw_results<R: Read>(input: R, config: &ColumnConfig) -> AssessmentResult<RawResults> {
    let mut rdr = reader(input);
    let headers = rdr.headers()?.clone();
    let columns = RawColumns::from_headers(&headers, config)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(RawResultRow::from_record(&record, &columns, config)?);
    }
    Ok(RawResults::with_run_type_column(rows, columns.run_type.is_some()))
}

pub fn load_raw_results(path: &Path, config: &ColumnConfig) -> AssessmentResult<RawResults> {
    let file = File::open(path)?;
    let raw = read_raw_results(BufReader::new(file), config)?;
    tracing::info!(path = %path.display(), rows = raw.len(), run_type = raw.has_run_type(), "loaded raw results");
    Ok(raw)
}

/// Read geometry records. Every column other than comid, catchment_hectares and
/// geometry is kept as a text attribute.
pub fn read_geometry<R: Read>(input: R, config: &ColumnConfig) -> AssessmentResult<GeometryTable> {
    let mut rdr = reader(input);
    let headers = rdr.headers()?.clone();
    let comid = required(&headers, &config.comid)?;
    let area = position(&headers, &config.catchment_hectares);
    let geometry = position(&headers, &config.geometry);

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let mut feature = GeometryRecord::new(parse_comid(&record, comid, &config.comid)?);
        if let Some(index) = area {
            let hectares = parse_value(&record, index, &config.catchment_hectares)?;
            feature.catchment_hectares = (!hectares.is_nan()).then_some(hectares);
        }
        if let Some(index) = geometry {
            let wkt = field(&record, index);
            feature.geometry = (!wkt.is_empty()).then(|| wkt.to_string());
        }
        for (index, name) in headers.iter().enumerate() {
            if index == comid || Some(index) == area || Some(index) == geometry {
                continue;
            }
            feature
                .attributes
                .insert(name.to_string(), field(&record, index).to_string());
        }
        records.push(feature);
    }
    Ok(GeometryTable::with_area_column(records, area.is_some()))
}

pub fn load_geometry(path: &Path, config: &ColumnConfig) -> AssessmentResult<GeometryTable> {
    let file = File::open(path)?;
    let geometry = read_geometry(BufReader::new(file), config)?;
    tracing::info!(path = %path.display(), features = geometry.len(), "loaded geometry");
    Ok(geometry)
}

fn read_rows<R: Read, T: DeserializeOwned>(input: R) -> AssessmentResult<Vec<T>> {
    let mut rdr = reader(input);
    let mut records = Vec::new();
    for result in rdr.deserialize::<T>() {
        records.push(result?);
    }
    Ok(records)
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> AssessmentResult<Vec<T>> {
    let file = File::open(path)?;
    let rows: Vec<T> = read_rows(BufReader::new(file))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "loaded rows");
    Ok(rows)
}

pub fn read_practices<R: Read>(input: R) -> AssessmentResult<Vec<PracticeRecord>> {
    read_rows(input)
}

pub fn load_practices(path: &Path) -> AssessmentResult<Vec<PracticeRecord>> {
    load_rows(path)
}

/// PA DEP BMP export: bmp/practice, id, units2, extent2, {tn,tp,tss}_lbs_reduced.
pub fn read_bmps<R: Read>(input: R) -> AssessmentResult<Vec<BmpRecord>> {
    read_rows(input)
}

pub fn load_bmps(path: &Path) -> AssessmentResult<Vec<BmpRecord>> {
    load_rows(path)
}

pub fn read_county_reductions<R: Read>(input: R) -> AssessmentResult<Vec<CountyReductionRecord>> {
    read_rows(input)
}

pub fn load_county_reductions(path: &Path) -> AssessmentResult<Vec<CountyReductionRecord>> {
    load_rows(path)
}

/// FIPS, County lookup table.
pub fn read_county_names<R: Read>(input: R) -> AssessmentResult<Vec<CountyName>> {
    read_rows(input)
}

pub fn load_county_names(path: &Path) -> AssessmentResult<Vec<CountyName>> {
    load_rows(path)
}

// Create CSV writer with headers
pub fn create_csv_writer<W: Write>(output: W, header: &[String]) -> AssessmentResult<Writer<W>> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(output);
    wtr.write_record(header)?;
    Ok(wtr)
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Write the table: comid, attributes, area, pollutant values, derived columns,
/// geometry. NaN is written as an empty cell.
pub fn write_enriched<W: Write>(output: W, table: &EnrichedTable, config: &ColumnConfig) -> AssessmentResult<()> {
    let attributes: BTreeSet<&str> = table
        .records()
        .iter()
        .flat_map(|r| r.attributes.keys().map(|k| k.as_str()))
        .collect();

    let mut header = vec![config.comid.clone()];
    header.extend(attributes.iter().map(|a| a.to_string()));
    if table.has_catchment_hectares() {
        header.push(config.catchment_hectares.clone());
    }
    header.extend(Pollutant::ALL.iter().map(|p| p.name().to_string()));
    header.extend(table.column_names());
    header.push(config.geometry.clone());

    let mut wtr = create_csv_writer(output, &header)?;
    let derived: Vec<&[f64]> = table.columns().map(|(_, values)| values).collect();
    for (row, record) in table.records().iter().enumerate() {
        let mut line = vec![record.comid.to_string()];
        for name in &attributes {
            line.push(record.attributes.get(*name).cloned().unwrap_or_default());
        }
        if table.has_catchment_hectares() {
            line.push(record.catchment_hectares.map(format_value).unwrap_or_default());
        }
        if let Some(values) = table.pollutant_values(record.comid) {
            line.extend(Pollutant::ALL.iter().map(|p| format_value(values.get(*p))));
        }
        line.extend(derived.iter().map(|values| format_value(values[row])));
        line.push(record.geometry.clone().unwrap_or_default());
        wtr.write_record(&line)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Long format: comid, Source, TotalN, TotalP, Sediment.
pub fn write_source_breakdown<W: Write>(
    output: W,
    breakdown: &SourceBreakdown,
    config: &ColumnConfig,
) -> AssessmentResult<()> {
    let mut header = vec![config.comid.clone(), config.source.clone()];
    header.extend(Pollutant::ALL.iter().map(|p| p.name().to_string()));

    let mut wtr = create_csv_writer(output, &header)?;
    for comid in breakdown.comids() {
        for (source, values) in breakdown.sources(comid).into_iter().flatten() {
            let mut line = vec![comid.to_string(), source.clone()];
            line.extend(Pollutant::ALL.iter().map(|p| format_value(values.get(*p))));
            wtr.write_record(&line)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

fn load_fields(load: &LoadReduced) -> [String; 3] {
    [load.tn.to_string(), load.tp.to_string(), load.tss.to_string()]
}

/// One line per practice type, then TOTAL when there were any practices.
pub fn write_practice_summary<W: Write>(output: W, summary: &PracticeSummary) -> AssessmentResult<()> {
    let mut header = headers(&["practice_type", "practice_count", "area_ac"]);
    if summary.restoration {
        header.extend(headers(&["tn_load_reduced", "tp_load_reduced", "tss_load_reduced"]));
    }

    let mut wtr = create_csv_writer(output, &header)?;
    for row in summary.rows.iter().chain(&summary.total) {
        let mut line = vec![
            row.practice_type.clone(),
            row.practice_count.to_string(),
            row.area_ac.to_string(),
        ];
        if let Some(load) = &row.load_reduced {
            line.extend(load_fields(load));
        }
        wtr.write_record(&line)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_bmp_summary<W: Write>(output: W, summary: &BmpSummary) -> AssessmentResult<()> {
    let header = headers(&[
        "bmp/practice",
        "id_count",
        "area_ac",
        "length_ft",
        "tn_load_reduced",
        "tp_load_reduced",
        "tss_load_reduced",
    ]);
    let mut wtr = create_csv_writer(output, &header)?;
    for row in summary.rows.iter().chain(&summary.total) {
        let mut line = vec![
            row.practice.clone(),
            row.id_count.to_string(),
            row.area_ac.to_string(),
            row.length_ft.to_string(),
        ];
        line.extend(load_fields(&row.load_reduced));
        wtr.write_record(&line)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_county_summary<W: Write>(output: W, summary: &CountySummary) -> AssessmentResult<()> {
    let header = headers(&[
        "County",
        "comid_count",
        "tn_ag_reduction_lbs",
        "tp_ag_reduction_lbs",
        "tss_ag_reduction_lbs",
        "tn_dev_reduction_lbs",
        "tp_dev_reduction_lbs",
        "tss_dev_reduction_lbs",
    ]);
    let mut wtr = create_csv_writer(output, &header)?;
    for row in summary.rows.iter().chain(&summary.total) {
        let mut line = vec![row.county.clone(), row.comid_count.to_string()];
        line.extend(load_fields(&row.ag));
        line.extend(load_fields(&row.dev));
        wtr.write_record(&line)?;
    }
    wtr.flush()?;
    Ok(())
}
