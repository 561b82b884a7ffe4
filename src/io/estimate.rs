//! Best-effort row count of a source table.
//!
//! The estimate only plans the chunk loop (capacity and progress); the chunk
//! reader streams to end-of-file regardless, so a wrong estimate never loses
//! rows. Strategies, in order:
//!
//! 1. a fresh sidecar manifest (no parsing)
//! 2. confirm the first record parses, then `file_size / 100`
//! 3. a fixed fallback
//!
//! Both counted strategies are clamped to `[MIN_ESTIMATE, MAX_ESTIMATE]`; a
//! manifest is only as trustworthy as whoever last edited it.
//!
//! Estimation never fails and closes everything it opens before returning.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::io::manifest::read_manifest;

/// Assumed average bytes per row for the size heuristic.
pub const BYTES_PER_ROW: u64 = 100;
pub const MIN_ESTIMATE: u64 = 10;
pub const MAX_ESTIMATE: u64 = 10_000;
pub const FALLBACK_ESTIMATE: u64 = 100;

/// Which strategy produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMethod {
    Manifest,
    FileSize,
    Fallback,
}

impl EstimateMethod {
    pub fn label(self) -> &'static str {
        match self {
            EstimateMethod::Manifest => "manifest",
            EstimateMethod::FileSize => "file size",
            EstimateMethod::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowEstimate {
    /// Data rows, header excluded.
    pub rows: u64,
    pub method: EstimateMethod,
}

impl RowEstimate {
    /// Expected number of chunks for `chunk_size`.
    pub fn chunks(&self, chunk_size: usize) -> u64 {
        let chunk_size = chunk_size.max(1) as u64;
        self.rows.div_ceil(chunk_size)
    }
}

/// Estimate the number of data rows in `path`.
pub fn estimate_rows(path: &Path, delimiter: u8) -> RowEstimate {
    if let Some(manifest) = read_manifest(path) {
        debug!(path = %path.display(), rows = manifest.rows, "Row count from manifest");
        return RowEstimate {
            rows: clamp_rows(manifest.rows),
            method: EstimateMethod::Manifest,
        };
    }

    match probe_first_record(path, delimiter).and_then(|()| file_size(path)) {
        Ok(bytes) => RowEstimate {
            rows: rows_from_file_size(bytes),
            method: EstimateMethod::FileSize,
        },
        Err(reason) => {
            warn!(path = %path.display(), %reason, "Row estimate falling back to default");
            RowEstimate {
                rows: FALLBACK_ESTIMATE,
                method: EstimateMethod::Fallback,
            }
        }
    }
}

/// `bytes / 100` clamped to `[10, 10000]`; non-decreasing in `bytes`.
pub fn rows_from_file_size(bytes: u64) -> u64 {
    clamp_rows(bytes / BYTES_PER_ROW)
}

fn clamp_rows(rows: u64) -> u64 {
    rows.clamp(MIN_ESTIMATE, MAX_ESTIMATE)
}

/// Read the header and the first record, if any, to confirm the file parses.
fn probe_first_record(path: &Path, delimiter: u8) -> Result<(), String> {
    let file = File::open(path).map_err(|e| format!("cannot open: {e}"))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(BufReader::new(file));

    reader.headers().map_err(|e| format!("unreadable header: {e}"))?;
    if let Some(first) = reader.records().next() {
        first.map_err(|e| format!("unreadable first record: {e}"))?;
    }
    Ok(())
}

fn file_size(path: &Path) -> Result<u64, String> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| format!("cannot stat: {e}"))
}
