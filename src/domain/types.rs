//! Shared domain types.
//!
//! Everything the pipeline passes between stages lives here: reference
//! samples, per-field and per-record outcomes, chunk results and the run
//! counters. The output table and its column layout live in `table`.

use std::collections::HashMap;
use std::ops::{Add, AddAssign};

use chrono::NaiveDate;
use clap::ValueEnum;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

/// Base temperature subtracted from the daily mean.
pub const BASE_TEMPERATURE: f64 = 10.0;

/// Accumulations strictly above this value count as high-value intervals.
pub const HIGH_VALUE_THRESHOLD: f64 = 1200.0;

/// Tables larger than this are written in batches of this many rows.
pub const WRITE_BATCH_ROWS: usize = 1000;

/// Rows inspected when sizing output columns.
pub const WIDTH_SAMPLE_ROWS: usize = 100;

pub const DAYS_COLUMN: &str = "days";
pub const UNITS_COLUMN: &str = "accumulated_units";
pub const DAYS_SECONDARY_COLUMN: &str = "days_secondary";
pub const UNITS_SECONDARY_COLUMN: &str = "accumulated_units_secondary";

/// One day of the reference temperature series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSample {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
}

impl ReferenceSample {
    /// Daily heat units: `((min + max) / 2) - 10`.
    pub fn heat_units(&self) -> f64 {
        (self.temp_min + self.temp_max) / 2.0 - BASE_TEMPERATURE
    }
}

/// What to do with an interval whose observation date precedes planting.
///
/// Historically such rows were accepted with a negative day count and an
/// empty (0.0) accumulation. They usually point at data-entry problems, so
/// the default keeps them valid but flags them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NegativeDays {
    /// Keep the row as valid, silently.
    Accept,
    /// Keep the row as valid, but count it and log a warning.
    #[default]
    Flag,
    /// Treat the pair as missing and count an error.
    Reject,
}

/// Output artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Delimited text (re-readable as a source table).
    #[default]
    Csv,
    /// Fixed-width text with a styled header row.
    Text,
}

/// Column names the pipeline reads dates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub planting: String,
    pub primary: String,
    /// Optional second observation column; when absent from the source the
    /// secondary fields are dropped for the whole run.
    pub secondary: Option<String>,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            planting: "planting_date".to_string(),
            primary: "observation_date".to_string(),
            secondary: Some("secondary_observation_date".to_string()),
        }
    }
}

/// Core pipeline configuration.
///
/// Chunk size is an input: the caller picks it (usually from the source file
/// size) and the pipeline never adjusts it at runtime.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub columns: ColumnSpec,
    pub negative_days: NegativeDays,
    pub delimiter: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            columns: ColumnSpec::default(),
            negative_days: NegativeDays::default(),
            delimiter: b',',
        }
    }
}

/// Header of a source table, shared by every chunk of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        let mut lookup = HashMap::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            // First occurrence wins on duplicate names.
            lookup.entry(normalize_column_name(name)).or_insert(idx);
        }
        Self { columns, lookup }
    }

    pub fn from_record(record: &StringRecord) -> Self {
        Self::new(record.iter().map(str::to_string).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look a column up by name (trimmed, BOM-stripped, case-insensitive).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(&normalize_column_name(name)).copied()
    }
}

pub fn normalize_column_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// A computed date pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Whole days from planting to observation; negative when reversed.
    pub days: i64,
    /// Sum of daily heat units, rounded to 2 decimals.
    pub accumulated_units: f64,
    /// Unrounded sum exceeded `HIGH_VALUE_THRESHOLD`.
    pub high_value: bool,
}

/// Why a date pair has no derived values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    PlantingDate,
    ObservationDate,
    NegativeInterval,
    /// The whole record failed; see `RecordFailure`.
    RecordFailed,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MissingReason::PlantingDate => "missing or invalid planting date",
            MissingReason::ObservationDate => "missing or invalid observation date",
            MissingReason::NegativeInterval => "observation date precedes planting date",
            MissingReason::RecordFailed => "record could not be computed",
        };
        f.write_str(text)
    }
}

/// Field-level outcome: derived values are present or missing together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldOutcome {
    Computed(Interval),
    Missing(MissingReason),
}

impl FieldOutcome {
    pub fn interval(&self) -> Option<&Interval> {
        match self {
            FieldOutcome::Computed(interval) => Some(interval),
            FieldOutcome::Missing(_) => None,
        }
    }

    pub fn days(&self) -> Option<i64> {
        self.interval().map(|i| i.days)
    }

    pub fn accumulated_units(&self) -> Option<f64> {
        self.interval().map(|i| i.accumulated_units)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldOutcome::Missing(_))
    }
}

/// Record-level failure (anything that is not a bad date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFailure {
    /// The row is shorter than the schema and lacks a date column.
    FieldOutOfRange { column: String, index: usize },
    /// The accumulation did not produce a finite number.
    NonFiniteSum,
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFailure::FieldOutOfRange { column, index } => {
                write!(f, "column `{column}` (index {index}) is missing from the row")
            }
            RecordFailure::NonFiniteSum => f.write_str("accumulated heat units are not finite"),
        }
    }
}

/// Record-level outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Computed {
        primary: FieldOutcome,
        secondary: Option<FieldOutcome>,
    },
    Failed(RecordFailure),
}

/// A source row together with its derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedRecord {
    /// 1-based data row number in the source (header excluded).
    pub row: usize,
    pub fields: StringRecord,
    pub primary: FieldOutcome,
    /// `None` when the run has no secondary observation column.
    pub secondary: Option<FieldOutcome>,
}

/// Run counters; summed across chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    /// Date pairs (or whole records) that could not be computed.
    pub error_count: u64,
    /// Date pairs that were computed.
    pub valid_row_count: u64,
    /// Computed pairs whose accumulation exceeds `HIGH_VALUE_THRESHOLD`.
    pub high_value_count: u64,
    /// Computed pairs with a negative day count (only under `NegativeDays::Flag`).
    pub negative_interval_count: u64,
}

impl AggregateStats {
    /// Counters as returned to callers: `(errors, valid, high_value)`.
    pub fn triple(&self) -> (u64, u64, u64) {
        (self.error_count, self.valid_row_count, self.high_value_count)
    }
}

impl Add for AggregateStats {
    type Output = AggregateStats;

    fn add(self, rhs: AggregateStats) -> AggregateStats {
        AggregateStats {
            error_count: self.error_count + rhs.error_count,
            valid_row_count: self.valid_row_count + rhs.valid_row_count,
            high_value_count: self.high_value_count + rhs.high_value_count,
            negative_interval_count: self.negative_interval_count + rhs.negative_interval_count,
        }
    }
}

impl AddAssign for AggregateStats {
    fn add_assign(&mut self, rhs: AggregateStats) {
        *self = *self + rhs;
    }
}

/// Computed records and counters for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    /// 0-based chunk index.
    pub index: usize,
    /// 1-based source row of the chunk's first record.
    pub first_row: usize,
    pub records: Vec<ComputedRecord>,
    pub stats: AggregateStats,
}

impl ChunkResult {
    /// Records whose every derived pair was computed.
    pub fn rows_computed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.primary.is_missing() && !r.secondary.is_some_and(|s| s.is_missing()))
            .count()
    }

    /// Records with at least one missing derived pair.
    pub fn rows_failed(&self) -> usize {
        self.records.len() - self.rows_computed()
    }
}

/// A chunk that could not be read and was dropped from the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChunk {
    pub index: usize,
    /// 1-based source rows `first_row..=last_row` that were lost.
    pub first_row: usize,
    pub last_row: usize,
    pub reason: String,
}

impl SkippedChunk {
    pub fn row_count(&self) -> usize {
        self.last_row + 1 - self.first_row
    }
}

/// Rounds to 2 decimal places (half away from zero).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
