use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Command, get_args};
use pollution_rs::config::AssessmentConfig;
use pollution_rs::io::csv::{
    load_bmps, load_county_names, load_county_reductions, load_geometry, load_practices,
    load_raw_results, write_bmp_summary, write_county_summary, write_enriched,
    write_practice_summary, write_source_breakdown,
};
use pollution_rs::model::RunType;
use pollution_rs::pipeline::{Scenarios, progress_len, run_pipeline};
use pollution_rs::pollutant::ComidType;
use pollution_rs::sources::source_breakdown;
use pollution_rs::summary::{summarize_bmps, summarize_county_reductions, summarize_practices};

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<AssessmentConfig> {
    match path {
        Some(path) => AssessmentConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config: {:?}", path)),
        None => Ok(AssessmentConfig::new()),
    }
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create output: {:?}", path))?;
    Ok(BufWriter::new(file))
}

fn main() -> Result<()> {
    let args = get_args();
    init_logging(args.verbose);
    let config = load_config(args.config.as_deref())?;

    tracing::info!(started = %Local::now().format("%Y-%m-%d %H:%M:%S"), "pollution assessment");

    match args.command {
        Command::Assess {
            comid_type,
            geometry,
            results,
            run_type,
            remaining,
            avoided,
            output,
        } => {
            let comid_type: ComidType = comid_type.parse()?;
            let defaults = Scenarios::from_config(&config);
            let scenarios = Scenarios {
                remaining: remaining.unwrap_or(defaults.remaining),
                avoided: avoided.unwrap_or(defaults.avoided),
            };
            assess(&config, comid_type, &geometry, &results, run_type, &scenarios, &output)?;
        }
        Command::Sources {
            comid_type,
            results,
            run_group,
            run_type,
            output,
        } => {
            let comid_type: ComidType = comid_type.parse()?;
            let group = match run_group {
                Some(key) => config.run_group(key)?,
                None => config.baseline()?,
            };
            let raw = load_raw_results(&results, &config.columns)
                .with_context(|| format!("Failed to read results: {:?}", results))?;
            let breakdown = source_breakdown(&config, comid_type, &raw, &group.label, run_type);
            write_source_breakdown(create_output(&output)?, &breakdown, &config.columns)
                .context("Failed to write source breakdown")?;
            println!(
                "Source breakdown for {} comids saved to {}",
                breakdown.len(),
                output.display()
            );
        }
        Command::Practices {
            practices,
            protection,
            output,
        } => {
            let records = load_practices(&practices)
                .with_context(|| format!("Failed to read practices: {:?}", practices))?;
            let summary = summarize_practices(&records, !protection);
            write_practice_summary(create_output(&output)?, &summary)
                .context("Failed to write practice summary")?;
            let (count, acres) = summary
                .total
                .as_ref()
                .map_or((0, 0.0), |t| (t.practice_count, t.area_ac));
            println!(
                "{} practices in {} types, {} acres. Summary saved to {}",
                count,
                summary.rows.len(),
                acres,
                output.display()
            );
        }
        Command::Bmps { bmps, output } => {
            let records = load_bmps(&bmps)
                .with_context(|| format!("Failed to read BMPs: {:?}", bmps))?;
            let summary = summarize_bmps(&records);
            write_bmp_summary(create_output(&output)?, &summary)
                .context("Failed to write BMP summary")?;
            println!(
                "{} BMPs in {} practices. Summary saved to {}",
                records.len(),
                summary.rows.len(),
                output.display()
            );
        }
        Command::Counties {
            reductions,
            fips,
            output,
        } => {
            let records = load_county_reductions(&reductions)
                .with_context(|| format!("Failed to read reductions: {:?}", reductions))?;
            let names = load_county_names(&fips)
                .with_context(|| format!("Failed to read FIPS table: {:?}", fips))?;
            let summary = summarize_county_reductions(&records, &names);
            write_county_summary(create_output(&output)?, &summary)
                .context("Failed to write county summary")?;
            println!(
                "{} counties. Summary saved to {}",
                summary.rows.len(),
                output.display()
            );
        }
    }
    Ok(())
}

fn assess(
    config: &AssessmentConfig,
    comid_type: ComidType,
    geometry_path: &Path,
    results_path: &Path,
    run_type: RunType,
    scenarios: &Scenarios,
    output: &Path,
) -> Result<()> {
    let geometry = load_geometry(geometry_path, &config.columns)
        .with_context(|| format!("Failed to read geometry: {:?}", geometry_path))?;
    let raw = load_raw_results(results_path, &config.columns)
        .with_context(|| format!("Failed to read results: {:?}", results_path))?;

    println!("\nAssessment Configuration:");
    println!("  Comid type: {}", comid_type);
    println!("  Run type: {}", run_type);
    println!("  Features: {}", geometry.len());
    println!("  Result rows: {}", raw.len());
    println!("  Remaining scenarios: {:?}", scenarios.remaining);
    println!("  Avoided scenarios: {:?}", scenarios.avoided);

    let pb = ProgressBar::new(progress_len(scenarios));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} stages {msg}")?
            .progress_chars("#>-"),
    );

    let table = run_pipeline(config, comid_type, &geometry, &raw, run_type, scenarios, &pb)?;

    write_enriched(create_output(output)?, &table, &config.columns)
        .context("Failed to write results")?;
    println!(
        "\nAssessment complete: {} rows, {} metric columns. Output saved to {}",
        table.len(),
        table.column_names().len(),
        output.display()
    );
    Ok(())
}
