//! Command-line parsing for the chunked heat-unit calculator.
//!
//! Argument parsing stays here; `app` turns the parsed arguments into
//! pipeline configuration and dispatches.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{NegativeDays, OutputFormat};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "gdu", version, about = "Chunked growing-degree-unit calculator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute intervals and heat units for every row of a source table.
    Process(ProcessArgs),
    /// Print the estimated row count of a source table.
    Estimate(EstimateArgs),
    /// Print (or export) the daily heat units between two dates.
    Series(SeriesArgs),
}

/// Reference series options shared by `process` and `series`.
#[derive(Debug, Args, Clone)]
pub struct ReferenceArgs {
    /// Daily reference temperatures (`date`, `temp_min`, `temp_max`).
    ///
    /// Falls back to `GDU_REFERENCE` when omitted.
    #[arg(short = 'r', long, value_name = "CSV")]
    pub reference: Option<PathBuf>,

    /// Floor `temp_min` at 10 and cap `temp_max` at 40 before accumulating.
    #[arg(long)]
    pub clamp_temperatures: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ProcessArgs {
    /// Source table with planting and observation dates.
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    #[command(flatten)]
    pub reference: ReferenceArgs,

    /// Output path (defaults to `<source stem>_gdu.csv` or `.txt`).
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Rows per chunk. Picked from the source file size when omitted.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: Option<u64>,

    #[arg(long, default_value = "planting_date")]
    pub planting_column: String,

    #[arg(long, default_value = "observation_date")]
    pub primary_column: String,

    /// Optional second observation column; ignored when the source lacks it.
    #[arg(long, default_value = "secondary_observation_date")]
    pub secondary_column: String,

    /// Disable secondary computation even if the column exists.
    #[arg(long)]
    pub no_secondary: bool,

    /// How to treat observation dates earlier than planting.
    #[arg(long, value_enum, default_value_t = NegativeDays::Flag)]
    pub negative_days: NegativeDays,

    /// Field delimiter of the source (and CSV output).
    #[arg(short = 'd', long, default_value_t = ',')]
    pub delimiter: char,

    /// Do not write the `.manifest.json` sidecar.
    #[arg(long)]
    pub no_manifest: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EstimateArgs {
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    #[arg(short = 'd', long, default_value_t = ',')]
    pub delimiter: char,
}

#[derive(Debug, Args, Clone)]
pub struct SeriesArgs {
    #[command(flatten)]
    pub reference: ReferenceArgs,

    /// Planting date (day-first, e.g. 01/03/2024). Not itself accumulated.
    #[arg(long)]
    pub plant: String,

    /// Observation date (day-first). Included in the accumulation.
    #[arg(long)]
    pub obs: String,

    /// Also write the daily breakdown to this CSV.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}
