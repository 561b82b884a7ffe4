//! The chunked heat-unit pipeline, shared by every front-end.
//!
//! estimate rows -> open chunk reader -> resolve columns once ->
//! per chunk: aggregate -> fold -> drop -> ordered output table + counters
//!
//! Chunks are handled strictly one at a time; only the reference series and
//! the growing output table outlive a chunk.

use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::data::ReferenceSeries;
use crate::domain::{AggregateStats, OutputTable, PipelineConfig, SkippedChunk};
use crate::error::AppError;
use crate::heat::{aggregate_chunk, ChunkMerger, MissingColumn, ResolvedColumns};
use crate::io::chunks::{ChunkRead, ChunkReader};
use crate::io::estimate::{estimate_rows, RowEstimate, MAX_ESTIMATE};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// A required column was absent; nothing was computed.
    MissingColumn(MissingColumn),
}

/// All outputs of one pipeline run. The caller owns the table.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: OutputTable,
    pub stats: AggregateStats,
    pub status: RunStatus,
    pub estimate: RowEstimate,
    pub chunks_processed: usize,
    /// Chunks whose rows were dropped; the output is short by their rows.
    pub skipped: Vec<SkippedChunk>,
}

impl RunOutput {
    fn missing_column(missing: MissingColumn, estimate: RowEstimate) -> Self {
        Self {
            table: OutputTable::empty(),
            stats: AggregateStats::default(),
            status: RunStatus::MissingColumn(missing),
            estimate,
            chunks_processed: 0,
            skipped: Vec::new(),
        }
    }

    /// `(table, error_count, valid_row_count, high_value_count)`.
    pub fn into_parts(self) -> (OutputTable, u64, u64, u64) {
        let (errors, valid, high) = self.stats.triple();
        (self.table, errors, valid, high)
    }

    pub fn rows_dropped(&self) -> usize {
        self.skipped.iter().map(SkippedChunk::row_count).sum()
    }
}

/// Run the pipeline over the source table at `source`.
///
/// # Errors
///
/// Only when the source cannot be opened or has no header. Missing required
/// columns, bad dates, failing records and unreadable chunks are all reported
/// through `RunOutput`.
pub fn process(source: &Path, reference: &ReferenceSeries, config: &PipelineConfig) -> Result<RunOutput, AppError> {
    let estimate = estimate_rows(source, config.delimiter);
    info!(
        source = %source.display(),
        estimated_rows = estimate.rows,
        method = estimate.method.label(),
        chunk_size = config.chunk_size,
        expected_chunks = estimate.chunks(config.chunk_size),
        "Processing source"
    );

    let reader = ChunkReader::open(source, config.chunk_size, config.delimiter)?;
    Ok(process_chunks(reader, reference, config, estimate))
}

/// Run the pipeline over an already-opened chunk reader.
pub fn process_chunks<R: Read>(
    reader: ChunkReader<R>,
    reference: &ReferenceSeries,
    config: &PipelineConfig,
    estimate: RowEstimate,
) -> RunOutput {
    let schema = reader.schema().clone();

    let columns = match ResolvedColumns::resolve(&schema, &config.columns) {
        Ok(columns) => columns,
        Err(missing) => {
            warn!(
                column = %missing.name,
                role = missing.role.label(),
                "Required column not found; nothing to compute"
            );
            return RunOutput::missing_column(missing, estimate);
        }
    };

    match &columns.secondary {
        Some((name, _)) => info!(column = %name, "Secondary observation column found"),
        None => info!("No secondary observation column; secondary fields disabled for this run"),
    }

    // The estimate is a hint; never preallocate past the heuristic ceiling.
    let capacity = usize::try_from(estimate.rows.min(MAX_ESTIMATE)).unwrap_or(0);
    let table = OutputTable::with_capacity(schema, columns.has_secondary(), capacity);

    let merged = reader
        .fold(ChunkMerger::new(table), |merger, read: ChunkRead| match read {
            Ok(chunk) => {
                let result = aggregate_chunk(chunk, &columns, reference, config.negative_days);
                info!(
                    chunk = result.index,
                    first_row = result.first_row,
                    rows = result.records.len(),
                    "Chunk processed"
                );
                merger.fold(result)
            }
            Err(failure) => {
                warn!(
                    chunk = failure.index,
                    first_row = failure.first_row,
                    last_row = failure.last_row,
                    reason = %failure.reason,
                    "Skipping unreadable chunk; its rows are dropped"
                );
                merger.skip(failure.into())
            }
        })
        .finish();

    info!(
        rows = merged.table.len(),
        chunks = merged.chunks_folded,
        skipped_chunks = merged.skipped.len(),
        errors = merged.stats.error_count,
        valid = merged.stats.valid_row_count,
        high_value = merged.stats.high_value_count,
        "Source processed"
    );

    RunOutput {
        table: merged.table,
        stats: merged.stats,
        status: RunStatus::Completed,
        estimate,
        chunks_processed: merged.chunks_folded,
        skipped: merged.skipped,
    }
}
