use clap::{Parser, Subcommand};
use pollution_rs::model::RunType;
use std::path::PathBuf;

/// Pollution reduction metrics for stream reaches and catchments
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// TOML file overriding the default targets, run groups and column names
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join results to geometry and compute every metric column
    Assess {
        /// reach or catch
        comid_type: String,

        /// Geometry CSV (comid, catchment_hectares, geometry, attributes)
        geometry: PathBuf,

        /// Model results CSV
        results: PathBuf,

        #[arg(short, long, default_value_t = RunType::Single)]
        run_type: RunType,

        /// Restoration run group keys, all restoration groups when omitted
        #[arg(long, value_delimiter = ',')]
        remaining: Option<Vec<u8>>,

        /// Protection run group keys, all protection groups when omitted
        #[arg(long, value_delimiter = ',')]
        avoided: Option<Vec<u8>>,

        #[arg(short, long, default_value = "assessment_results.csv")]
        output: PathBuf,
    },
    /// Break loads down by land use source
    Sources {
        /// reach or catch
        comid_type: String,

        /// Model results CSV
        results: PathBuf,

        /// Run group key, the baseline when omitted
        #[arg(short = 'g', long)]
        run_group: Option<u8>,

        #[arg(short, long, default_value_t = RunType::Single)]
        run_type: RunType,

        #[arg(short, long, default_value = "source_breakdown.csv")]
        output: PathBuf,
    },
    /// Summarize restoration or protection practices by type
    Practices {
        /// Practices CSV (practice_type, practice_id, area_m2, tn, tp, tss)
        practices: PathBuf,

        /// Protection practices, no load reductions
        #[arg(long)]
        protection: bool,

        #[arg(short, long, default_value = "practice_summary.csv")]
        output: PathBuf,
    },
    /// Summarize PA DEP BMPs by practice
    Bmps {
        /// BMP CSV (bmp/practice, id, units2, extent2, *_lbs_reduced)
        bmps: PathBuf,

        #[arg(short, long, default_value = "bmp_summary.csv")]
        output: PathBuf,
    },
    /// Summarize ag and developed load reductions by county
    Counties {
        /// Reductions CSV (comid, county_FIPS, *_ag_reduction_lbs, *_dev_reduction_lbs)
        reductions: PathBuf,

        /// FIPS to county name CSV (FIPS, County)
        fips: PathBuf,

        #[arg(short, long, default_value = "county_summary.csv")]
        output: PathBuf,
    },
}

pub fn get_args() -> Args {
    Args::parse()
}
