//! Reference temperature series.
//!
//! The series is loaded once per run, sorted by date and then only read. The
//! interval aggregator asks it for half-open windows `(after, through]`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{ReferenceSample, Schema};
use crate::error::AppError;
use crate::heat::dates::parse_day_first;

/// Floor applied to `temp_min` when clamping is enabled.
pub const CLAMP_TEMP_MIN: f64 = 10.0;
/// Cap applied to `temp_max` when clamping is enabled.
pub const CLAMP_TEMP_MAX: f64 = 40.0;

/// How to read the reference table.
#[derive(Debug, Clone)]
pub struct ReferenceOptions {
    pub delimiter: u8,
    /// Floor `temp_min` at 10 and cap `temp_max` at 40 before accumulating.
    pub clamp_temperatures: bool,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            clamp_temperatures: false,
        }
    }
}

/// A reference row that was skipped during load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Loaded series plus what was skipped on the way.
#[derive(Debug, Clone)]
pub struct LoadedReference {
    pub series: ReferenceSeries,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Ordered, immutable daily temperature samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSeries {
    samples: Vec<ReferenceSample>,
}

/// One day of a single-interval breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyHeat {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    pub heat_units: f64,
    pub cumulative: f64,
}

impl ReferenceSeries {
    /// Builds a series, sorting samples ascending by date (stable for ties).
    pub fn new(mut samples: Vec<ReferenceSample>) -> Self {
        samples.sort_by_key(|s| s.date);
        Self { samples }
    }

    pub fn samples(&self) -> &[ReferenceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.samples.first().map(|s| s.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.samples.last().map(|s| s.date)
    }

    /// Samples dated strictly after `after` and up to and including `through`.
    ///
    /// Reversed bounds give an empty slice.
    pub fn window(&self, after: NaiveDate, through: NaiveDate) -> &[ReferenceSample] {
        if through <= after {
            return &[];
        }
        let start = self.samples.partition_point(|s| s.date <= after);
        let end = self.samples.partition_point(|s| s.date <= through);
        &self.samples[start..end]
    }

    /// Unrounded heat-unit sum over `(after, through]`.
    pub fn accumulate(&self, after: NaiveDate, through: NaiveDate) -> f64 {
        self.window(after, through).iter().map(ReferenceSample::heat_units).sum()
    }

    /// Per-day heat units and running total over `(after, through]`.
    pub fn daily_series(&self, after: NaiveDate, through: NaiveDate) -> Vec<DailyHeat> {
        let mut cumulative = 0.0;
        self.window(after, through)
            .iter()
            .map(|s| {
                let heat_units = s.heat_units();
                cumulative += heat_units;
                DailyHeat {
                    date: s.date,
                    temp_min: s.temp_min,
                    temp_max: s.temp_max,
                    heat_units,
                    cumulative,
                }
            })
            .collect()
    }
}

/// Load the reference series from a delimited file with `date`, `temp_min`,
/// `temp_max` columns.
pub fn load_reference(path: &Path, options: &ReferenceOptions) -> Result<LoadedReference, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::input(format!("Failed to open reference series '{}': {e}", path.display()))
    })?;
    let loaded = read_reference(file, options)?;

    info!(
        path = %path.display(),
        samples = loaded.series.len(),
        skipped = loaded.row_errors.len(),
        first = ?loaded.series.first_date(),
        last = ?loaded.series.last_date(),
        "Loaded reference series"
    );
    Ok(loaded)
}

/// Parse a reference table from any reader.
///
/// Bad rows are skipped and reported; an input with no usable row is an error.
pub fn read_reference<R: Read>(reader: R, options: &ReferenceOptions) -> Result<LoadedReference, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read reference headers: {e}")))?;
    let schema = Schema::from_record(headers);

    let column = |name: &str| {
        schema
            .index_of(name)
            .ok_or_else(|| AppError::input(format!("Reference series is missing required column: `{name}`")))
    };
    let date_idx = column("date")?;
    let min_idx = column("temp_min")?;
    let max_idx = column("temp_max")?;

    let mut samples = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header and lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_sample(&record, date_idx, min_idx, max_idx));

        match parsed {
            Ok(mut sample) => {
                if options.clamp_temperatures {
                    sample.temp_min = sample.temp_min.max(CLAMP_TEMP_MIN);
                    sample.temp_max = sample.temp_max.min(CLAMP_TEMP_MAX);
                }
                samples.push(sample);
            }
            Err(message) => {
                warn!(line, %message, "Skipping reference row");
                row_errors.push(RowError { line, message });
            }
        }
    }

    if samples.is_empty() {
        return Err(AppError::no_data("Reference series has no usable rows."));
    }

    Ok(LoadedReference {
        series: ReferenceSeries::new(samples),
        row_errors,
        rows_read,
    })
}

fn parse_sample(
    record: &StringRecord,
    date_idx: usize,
    min_idx: usize,
    max_idx: usize,
) -> Result<ReferenceSample, String> {
    let raw_date = record.get(date_idx).unwrap_or("");
    let date = parse_day_first(raw_date).ok_or_else(|| format!("Invalid date '{raw_date}'"))?;
    let temp_min = parse_temperature(record.get(min_idx), "temp_min")?;
    let temp_max = parse_temperature(record.get(max_idx), "temp_max")?;
    Ok(ReferenceSample {
        date,
        temp_min,
        temp_max,
    })
}

fn parse_temperature(raw: Option<&str>, name: &str) -> Result<f64, String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(format!("Missing `{name}` value"));
    };
    // Spreadsheets in day-first locales often use a decimal comma.
    let value = raw
        .parse::<f64>()
        .or_else(|_| raw.replace(',', ".").parse::<f64>())
        .map_err(|_| format!("Invalid `{name}` value '{raw}'"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("Non-finite `{name}` value '{raw}'"))
    }
}
