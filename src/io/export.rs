//! Batched, atomic export of the output table.
//!
//! Rows are streamed straight from the `OutputTable` into a temporary file in
//! the destination directory; nothing is copied into a second table. Tables
//! above the batch threshold get the header once and then fixed-size batches,
//! each flushed before the next one is rendered. On success the temporary
//! file replaces the destination; on failure it is removed.

use std::borrow::Cow;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::data::DailyHeat;
use crate::domain::{round2, ComputedRecord, OutputFormat, OutputTable, WIDTH_SAMPLE_ROWS, WRITE_BATCH_ROWS};
use crate::error::AppError;
use crate::io::manifest::{write_manifest, TableManifest};

/// Widest a fixed-width text column gets, in characters.
pub const MAX_COLUMN_WIDTH: usize = 50;

/// Gap between fixed-width columns.
const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub format: OutputFormat,
    pub batch_rows: usize,
    pub width_sample_rows: usize,
    pub delimiter: u8,
    /// Emit a `.manifest.json` sidecar (CSV output only).
    pub manifest: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            batch_rows: WRITE_BATCH_ROWS,
            width_sample_rows: WIDTH_SAMPLE_ROWS,
            delimiter: b',',
            manifest: true,
        }
    }
}

/// What was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub path: PathBuf,
    pub rows: usize,
    pub batches: usize,
    pub manifest: Option<PathBuf>,
}

/// A temp file next to the destination, persisted over it on `finish()`.
///
/// Dropping it unfinished deletes the temp file.
struct AtomicFile {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

impl AtomicFile {
    fn create(final_path: &Path) -> Result<Self, AppError> {
        let parent = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(parent).map_err(|e| {
            AppError::output(format!("Failed to create temporary file in '{}': {e}", parent.display()))
        })?;
        Ok(Self {
            writer: BufWriter::new(temp),
            final_path: final_path.to_path_buf(),
        })
    }

    fn finish(self) -> Result<(), AppError> {
        let temp = self
            .writer
            .into_inner()
            .map_err(|e| AppError::output(format!("Failed to flush output: {}", e.error())))?;
        temp.persist(&self.final_path).map_err(|e| {
            AppError::output(format!("Failed to persist '{}': {}", self.final_path.display(), e.error))
        })?;
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Write the output table to `path`.
pub fn write_table(path: &Path, table: &OutputTable, options: &WriteOptions) -> Result<WriteReport, AppError> {
    let header = table.header();
    let batch_rows = options.batch_rows.max(1);
    let records = table.records();

    // Small tables go out in one pass.
    let batches: Vec<&[ComputedRecord]> = if records.len() > batch_rows {
        records.chunks(batch_rows).collect()
    } else {
        vec![records]
    };

    let mut file = AtomicFile::create(path)?;
    match options.format {
        OutputFormat::Csv => write_csv(&mut file, table, &header, &batches, options.delimiter)?,
        OutputFormat::Text => {
            let widths = column_widths(table, &header, options.width_sample_rows);
            write_text(&mut file, table, &header, &widths, &batches)?;
        }
    }
    file.finish()?;

    let manifest = if options.manifest && options.format == OutputFormat::Csv {
        Some(write_manifest(path, &TableManifest::new(records.len() as u64, header))?)
    } else {
        None
    };

    info!(
        path = %path.display(),
        rows = records.len(),
        batches = batches.len(),
        "Wrote output table"
    );

    Ok(WriteReport {
        path: path.to_path_buf(),
        rows: records.len(),
        batches: batches.len(),
        manifest,
    })
}

fn write_csv(
    file: &mut AtomicFile,
    table: &OutputTable,
    header: &[String],
    batches: &[&[ComputedRecord]],
    delimiter: u8,
) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(file);

    if !header.is_empty() {
        writer
            .write_record(header)
            .map_err(|e| AppError::output(format!("Failed to write output header: {e}")))?;
    }

    for (idx, batch) in batches.iter().enumerate() {
        for record in batch.iter() {
            writer
                .write_record(table.cells(record).iter().map(|c| c.as_bytes()))
                .map_err(|e| AppError::output(format!("Failed to write output row {}: {e}", record.row)))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::output(format!("Failed to flush output batch: {e}")))?;
        debug!(batch = idx, rows = batch.len(), "Flushed output batch");
    }
    Ok(())
}

fn write_text(
    file: &mut AtomicFile,
    table: &OutputTable,
    header: &[String],
    widths: &[usize],
    batches: &[&[ComputedRecord]],
) -> Result<(), AppError> {
    let io_err = |e: std::io::Error| AppError::output(format!("Failed to write output: {e}"));

    let styled: Vec<Cow<'_, str>> = header.iter().map(|h| Cow::Owned(h.trim().to_uppercase())).collect();
    writeln!(file, "{}", render_line(&styled, widths)).map_err(io_err)?;
    let rule: Vec<Cow<'_, str>> = widths.iter().map(|w| Cow::Owned("-".repeat(*w))).collect();
    writeln!(file, "{}", render_line(&rule, widths)).map_err(io_err)?;

    for (idx, batch) in batches.iter().enumerate() {
        for record in batch.iter() {
            writeln!(file, "{}", render_line(&table.cells(record), widths)).map_err(io_err)?;
        }
        file.flush().map_err(io_err)?;
        debug!(batch = idx, rows = batch.len(), "Flushed output batch");
    }
    Ok(())
}

/// Column widths from the header plus the first `sample_rows` rows, capped.
pub fn column_widths(table: &OutputTable, header: &[String], sample_rows: usize) -> Vec<usize> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.trim().chars().count()).collect();
    for record in table.records().iter().take(sample_rows) {
        for (width, cell) in widths.iter_mut().zip(table.cells(record)) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths.into_iter().map(|w| w.clamp(1, MAX_COLUMN_WIDTH)).collect()
}

/// Left-pad each cell to its width; longer cells overflow rather than truncate.
fn render_line(cells: &[Cow<'_, str>], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, cell) in cells.iter().enumerate() {
        if idx > 0 {
            line.push_str(COLUMN_GAP);
        }
        let width = widths.get(idx).copied().unwrap_or(0);
        line.push_str(&format!("{cell:<width$}"));
    }
    line.trim_end().to_string()
}

/// Write a single-interval daily breakdown as CSV.
pub fn write_daily_series(path: &Path, days: &[DailyHeat], delimiter: u8) -> Result<WriteReport, AppError> {
    let mut file = AtomicFile::create(path)?;
    {
        let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(&mut file);
        let csv_err = |e: csv::Error| AppError::output(format!("Failed to write daily series: {e}"));

        writer
            .write_record(["date", "temp_min", "temp_max", "heat_units", "cumulative"])
            .map_err(csv_err)?;
        for day in days {
            writer
                .write_record([
                    day.date.format("%d/%m/%Y").to_string(),
                    day.temp_min.to_string(),
                    day.temp_max.to_string(),
                    format!("{:.2}", round2(day.heat_units)),
                    format!("{:.2}", round2(day.cumulative)),
                ])
                .map_err(csv_err)?;
        }
        writer
            .flush()
            .map_err(|e| AppError::output(format!("Failed to flush daily series: {e}")))?;
    }
    file.finish()?;

    Ok(WriteReport {
        path: path.to_path_buf(),
        rows: days.len(),
        batches: 1,
        manifest: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use csv::StringRecord;
    use tempfile::TempDir;

    use crate::domain::{FieldOutcome, Interval, MissingReason, Schema};
    use crate::io::manifest::read_manifest;

    fn table(rows: usize) -> OutputTable {
        let schema = Arc::new(Schema::new(vec!["id".to_string(), "note".to_string()]));
        let mut table = OutputTable::new(schema, false);
        table.extend(
            (1..=rows)
                .map(|row| ComputedRecord {
                    row,
                    fields: StringRecord::from(vec![row.to_string(), "x, y".to_string()]),
                    primary: if row % 2 == 0 {
                        FieldOutcome::Missing(MissingReason::ObservationDate)
                    } else {
                        FieldOutcome::Computed(Interval {
                            days: row as i64,
                            accumulated_units: row as f64 * 1.5,
                            high_value: false,
                        })
                    },
                    secondary: None,
                })
                .collect(),
        );
        table
    }

    fn read_back(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).expect("open output");
        let headers = reader.headers().unwrap().iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        (headers, rows)
    }

    #[test]
    fn small_table_single_pass() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let report = write_table(&path, &table(3), &WriteOptions::default()).unwrap();

        assert_eq!(report.rows, 3);
        assert_eq!(report.batches, 1);

        let (headers, rows) = read_back(&path);
        assert_eq!(headers, vec!["id", "note", "days", "accumulated_units"]);
        assert_eq!(rows[0], vec!["1", "x, y", "1", "1.50"]);
        assert_eq!(rows[1], vec!["2", "x, y", "", ""]);
    }

    #[test]
    fn large_table_is_batched_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let report = write_table(&path, &table(2_501), &WriteOptions::default()).unwrap();

        assert_eq!(report.batches, 3);
        let (_, rows) = read_back(&path);
        assert_eq!(rows.len(), 2_501);
        let ids: Vec<usize> = rows.iter().map(|r| r[0].parse().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn exactly_threshold_rows_is_one_pass() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let report = write_table(&path, &table(WRITE_BATCH_ROWS), &WriteOptions::default()).unwrap();
        assert_eq!(report.batches, 1);
    }

    #[test]
    fn csv_output_gets_a_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let report = write_table(&path, &table(4), &WriteOptions::default()).unwrap();

        assert!(report.manifest.is_some());
        let manifest = read_manifest(&path).expect("manifest");
        assert_eq!(manifest.rows, 4);
        assert_eq!(manifest.columns.len(), 4);
    }

    #[test]
    fn text_output_has_styled_header_and_padded_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let options = WriteOptions {
            format: OutputFormat::Text,
            ..WriteOptions::default()
        };
        let report = write_table(&path, &table(2), &options).unwrap();
        assert!(report.manifest.is_none());

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "ID  NOTE  DAYS  ACCUMULATED_UNITS");
        assert_eq!(lines[1], "--  ----  ----  -----------------");
        assert_eq!(lines[2], "1   x, y  1     1.50");
        assert_eq!(lines[3], "2   x, y");
    }

    #[test]
    fn widths_use_only_the_sample() {
        let schema = Arc::new(Schema::new(vec!["v".to_string()]));
        let mut table = OutputTable::new(schema, false);
        let record = |row: usize, text: &str| ComputedRecord {
            row,
            fields: StringRecord::from(vec![text]),
            primary: FieldOutcome::Missing(MissingReason::PlantingDate),
            secondary: None,
        };
        table.extend(vec![record(1, "abc"), record(2, &"z".repeat(80))]);

        let header = table.header();
        assert_eq!(column_widths(&table, &header, 1)[0], 3);
        assert_eq!(column_widths(&table, &header, 2)[0], MAX_COLUMN_WIDTH);
    }

    #[test]
    fn failed_write_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing_dir").join("out.csv");
        let err = write_table(&path, &table(1), &WriteOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_OUTPUT);
        assert!(!path.exists());
    }

    #[test]
    fn daily_series_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("series.csv");
        let days = vec![DailyHeat {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            temp_min: 15.0,
            temp_max: 25.0,
            heat_units: 10.0,
            cumulative: 10.0,
        }];
        write_daily_series(&path, &days, b',').unwrap();

        let (headers, rows) = read_back(&path);
        assert_eq!(headers, vec!["date", "temp_min", "temp_max", "heat_units", "cumulative"]);
        assert_eq!(rows[0], vec!["02/01/2024", "15", "25", "10.00", "10.00"]);
    }
}
