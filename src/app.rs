//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs logging and loads `.env`
//! - parses CLI arguments
//! - loads the reference series
//! - runs the chunked pipeline and writes the output table
//! - prints reports

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, EstimateArgs, ProcessArgs, ReferenceArgs, SeriesArgs};
use crate::data::{load_reference, LoadedReference, ReferenceOptions};
use crate::domain::{ColumnSpec, OutputFormat, PipelineConfig};
use crate::error::AppError;
use crate::heat::dates::parse_day_first;
use crate::io::estimate::estimate_rows;
use crate::io::export::{write_daily_series, write_table, WriteOptions};

pub mod pipeline;

/// Environment variable consulted when `--reference` is omitted.
pub const REFERENCE_ENV: &str = "GDU_REFERENCE";

/// Entry point for the `gdu` binary.
pub fn run() -> Result<(), AppError> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Process(args) => handle_process(args),
        Command::Estimate(args) => handle_estimate(args),
        Command::Series(args) => handle_series(args),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_process(args: ProcessArgs) -> Result<(), AppError> {
    let delimiter = delimiter_byte(args.delimiter)?;
    let loaded = load_reference_from_args(&args.reference, delimiter)?;

    let config = pipeline_config_from_args(&args, delimiter)?;
    let output = pipeline::process(&args.source, &loaded.series, &config)?;

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.source, args.format));
    let options = WriteOptions {
        format: args.format,
        delimiter,
        manifest: !args.no_manifest,
        ..WriteOptions::default()
    };
    let written = write_table(&path, &output.table, &options)?;

    println!("{}", crate::report::format_run_summary(&args.source, &output, Some(&written)));
    Ok(())
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let delimiter = delimiter_byte(args.delimiter)?;
    let estimate = estimate_rows(&args.source, delimiter);
    let chunk_size = fs::metadata(&args.source)
        .map(|m| chunk_size_for_file_size(m.len()))
        .unwrap_or(PipelineConfig::default().chunk_size);

    print!("{}", crate::report::format_estimate(&args.source, &estimate, chunk_size));
    Ok(())
}

fn handle_series(args: SeriesArgs) -> Result<(), AppError> {
    let plant = parse_cli_date("--plant", &args.plant)?;
    let obs = parse_cli_date("--obs", &args.obs)?;
    if obs < plant {
        return Err(AppError::input(format!(
            "--obs ({}) is earlier than --plant ({}).",
            args.obs, args.plant
        )));
    }

    let loaded = load_reference_from_args(&args.reference, b',')?;
    let days = loaded.series.daily_series(plant, obs);
    if days.is_empty() {
        warn!(%plant, %obs, "No reference samples inside the interval");
    }

    print!("{}", crate::report::format_daily_series(plant, obs, &days));

    if let Some(path) = &args.output {
        let written = write_daily_series(path, &days, b',')?;
        println!("Wrote {} days to {}", written.rows, written.path.display());
    }
    Ok(())
}

/// Build the pipeline configuration for `process`.
pub fn pipeline_config_from_args(args: &ProcessArgs, delimiter: u8) -> Result<PipelineConfig, AppError> {
    let chunk_size = match args.chunk_size {
        Some(n) => usize::try_from(n).map_err(|_| AppError::input(format!("--chunk-size {n} is too large.")))?,
        None => {
            let bytes = fs::metadata(&args.source)
                .map_err(|e| AppError::input(format!("Failed to read source '{}': {e}", args.source.display())))?
                .len();
            let size = chunk_size_for_file_size(bytes);
            info!(bytes, chunk_size = size, "Chunk size picked from source size");
            size
        }
    };

    let secondary = (!args.no_secondary).then(|| args.secondary_column.clone());

    Ok(PipelineConfig {
        chunk_size,
        columns: ColumnSpec {
            planting: args.planting_column.clone(),
            primary: args.primary_column.clone(),
            secondary,
        },
        negative_days: args.negative_days,
        delimiter,
    })
}

/// Rows per chunk for a source of `bytes` bytes: larger files get smaller
/// chunks.
///
/// - up to 200 KB: 50
/// - up to 500 KB: 25
/// - above: 10
pub fn chunk_size_for_file_size(bytes: u64) -> usize {
    const KB: u64 = 1024;
    if bytes <= 200 * KB {
        50
    } else if bytes <= 500 * KB {
        25
    } else {
        10
    }
}

/// `data/fields.csv` -> `data/fields_gdu.csv` (or `.txt`).
pub fn default_output_path(source: &Path, format: OutputFormat) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = match format {
        OutputFormat::Csv => "csv",
        OutputFormat::Text => "txt",
    };
    source.with_file_name(format!("{stem}_gdu.{extension}"))
}

fn load_reference_from_args(args: &ReferenceArgs, delimiter: u8) -> Result<LoadedReference, AppError> {
    let path = resolve_reference_path(args.reference.as_deref(), std::env::var(REFERENCE_ENV).ok())?;
    let options = ReferenceOptions {
        delimiter,
        clamp_temperatures: args.clamp_temperatures,
    };
    let loaded = load_reference(&path, &options)?;
    if !loaded.row_errors.is_empty() {
        warn!(
            skipped = loaded.row_errors.len(),
            read = loaded.rows_read,
            "Reference series loaded with skipped rows"
        );
    }
    Ok(loaded)
}

fn resolve_reference_path(flag: Option<&Path>, env: Option<String>) -> Result<PathBuf, AppError> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    match env {
        Some(value) if !value.trim().is_empty() => Ok(PathBuf::from(value.trim())),
        _ => Err(AppError::input(format!(
            "No reference series given. Pass --reference or set {REFERENCE_ENV}."
        ))),
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8, AppError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| AppError::input(format!("Delimiter '{delimiter}' must be a single ASCII character.")))
}

fn parse_cli_date(flag: &str, raw: &str) -> Result<NaiveDate, AppError> {
    parse_day_first(raw).ok_or_else(|| AppError::input(format!("{flag} '{raw}' is not a day-first date.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_tiers() {
        assert_eq!(chunk_size_for_file_size(0), 50);
        assert_eq!(chunk_size_for_file_size(200 * 1024), 50);
        assert_eq!(chunk_size_for_file_size(200 * 1024 + 1), 25);
        assert_eq!(chunk_size_for_file_size(500 * 1024), 25);
        assert_eq!(chunk_size_for_file_size(500 * 1024 + 1), 10);
        assert_eq!(chunk_size_for_file_size(u64::MAX), 10);
    }

    #[test]
    fn default_output_path_follows_format() {
        assert_eq!(
            default_output_path(Path::new("data/fields.csv"), OutputFormat::Csv),
            PathBuf::from("data/fields_gdu.csv")
        );
        assert_eq!(
            default_output_path(Path::new("fields.csv"), OutputFormat::Text),
            PathBuf::from("fields_gdu.txt")
        );
    }

    #[test]
    fn reference_flag_wins_over_env() {
        let path = resolve_reference_path(Some(Path::new("a.csv")), Some("b.csv".to_string())).unwrap();
        assert_eq!(path, PathBuf::from("a.csv"));

        let path = resolve_reference_path(None, Some(" b.csv ".to_string())).unwrap();
        assert_eq!(path, PathBuf::from("b.csv"));

        let err = resolve_reference_path(None, Some("  ".to_string())).unwrap_err();
        assert!(err.message().contains(REFERENCE_ENV));
        assert!(resolve_reference_path(None, None).is_err());
    }

    #[test]
    fn delimiter_must_be_ascii() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        assert_eq!(delimiter_byte('\t').unwrap(), b'\t');
        assert!(delimiter_byte('é').is_err());
    }

    #[test]
    fn cli_dates_are_day_first() {
        assert_eq!(
            parse_cli_date("--plant", "02/03/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
        assert!(parse_cli_date("--plant", "").is_err());
    }

    #[test]
    fn config_from_args_disables_secondary() {
        let cli = crate::cli::Cli::try_parse_from([
            "gdu",
            "process",
            "fields.csv",
            "--chunk-size",
            "7",
            "--no-secondary",
            "--planting-column",
            "sown",
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            panic!("expected process");
        };

        let config = pipeline_config_from_args(&args, b',').unwrap();
        assert_eq!(config.chunk_size, 7);
        assert_eq!(config.columns.planting, "sown");
        assert_eq!(config.columns.secondary, None);
    }
}
