//! Heat-unit computation.
//!
//! - day-first date parsing (`dates`)
//! - per-record interval aggregation (`interval`)
//! - folding chunk results into the run (`merge`)

pub mod dates;
pub mod interval;
pub mod merge;

pub use interval::{aggregate_chunk, compute_interval, compute_record, ColumnRole, MissingColumn, ResolvedColumns};
pub use merge::{ChunkMerger, MergedRun};
