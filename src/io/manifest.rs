//! Table manifests: a JSON sidecar next to every written table.
//!
//! A manifest records the row count and columns of the table it describes, so
//! the row estimator can size a later run over that table without parsing it.
//! A manifest older than its table is considered stale and ignored.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::AppError;

const MANIFEST_SUFFIX: &str = ".manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub tool: String,
    pub rows: u64,
    pub columns: Vec<String>,
}

impl TableManifest {
    pub fn new(rows: u64, columns: Vec<String>) -> Self {
        Self {
            tool: "gdu".to_string(),
            rows,
            columns,
        }
    }
}

/// `data/out.csv` -> `data/out.csv.manifest.json`
pub fn manifest_path(table: &Path) -> PathBuf {
    let mut name = table.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(MANIFEST_SUFFIX);
    table.with_file_name(name)
}

/// Write the sidecar manifest for `table`.
///
/// The manifest is written to a temp file in the same directory and then
/// renamed over the destination, so readers never see a truncated manifest.
pub fn write_manifest(table: &Path, manifest: &TableManifest) -> Result<PathBuf, AppError> {
    let path = manifest_path(table);
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(parent).map_err(|e| {
        AppError::output(format!("Failed to create temporary manifest in '{}': {e}", parent.display()))
    })?;
    let mut writer = BufWriter::new(temp);
    serde_json::to_writer_pretty(&mut writer, manifest)
        .map_err(|e| AppError::output(format!("Failed to write manifest: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::output(format!("Failed to flush manifest: {e}")))?;
    let temp = writer
        .into_inner()
        .map_err(|e| AppError::output(format!("Failed to flush manifest: {}", e.error())))?;

    temp.persist(&path)
        .map_err(|e| AppError::output(format!("Failed to persist manifest '{}': {}", path.display(), e.error)))?;
    Ok(path)
}

/// Read a fresh manifest for `table`, if one exists.
///
/// Never fails: a missing, unreadable, malformed or stale manifest is `None`.
pub fn read_manifest(table: &Path) -> Option<TableManifest> {
    let path = manifest_path(table);
    let manifest_modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
    let table_modified = fs::metadata(table).and_then(|m| m.modified()).ok()?;
    if manifest_modified < table_modified {
        return None;
    }

    let file = File::open(&path).ok()?;
    serde_json::from_reader(file).ok()
}
