//! Folding chunk results into the run's output table and counters.
//!
//! The merger is an accumulator value: each step takes it by value and hands
//! it back, so nothing is shared or mutated behind the pipeline's back.

use tracing::debug;

use crate::domain::{AggregateStats, ChunkResult, OutputTable, SkippedChunk};

/// Running state of a pipeline run.
#[derive(Debug, Clone)]
pub struct ChunkMerger {
    table: OutputTable,
    stats: AggregateStats,
    skipped: Vec<SkippedChunk>,
    chunks_folded: usize,
}

/// Everything the merger accumulated.
#[derive(Debug, Clone)]
pub struct MergedRun {
    pub table: OutputTable,
    pub stats: AggregateStats,
    pub skipped: Vec<SkippedChunk>,
    pub chunks_folded: usize,
}

impl ChunkMerger {
    pub fn new(table: OutputTable) -> Self {
        Self {
            table,
            stats: AggregateStats::default(),
            skipped: Vec::new(),
            chunks_folded: 0,
        }
    }

    /// Append a chunk's records (strictly in arrival order) and add its counters.
    pub fn fold(mut self, result: ChunkResult) -> Self {
        let ChunkResult {
            index,
            first_row,
            records,
            stats,
        } = result;

        debug!(
            chunk = index,
            first_row,
            rows = records.len(),
            errors = stats.error_count,
            valid = stats.valid_row_count,
            "Folded chunk"
        );

        self.table.extend(records);
        self.stats += stats;
        self.chunks_folded += 1;
        self
    }

    /// Record a chunk whose rows were dropped.
    pub fn skip(mut self, skipped: SkippedChunk) -> Self {
        self.skipped.push(skipped);
        self
    }

    pub fn finish(self) -> MergedRun {
        MergedRun {
            table: self.table,
            stats: self.stats,
            skipped: self.skipped,
            chunks_folded: self.chunks_folded,
        }
    }
}
