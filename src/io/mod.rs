//! Input/output helpers.
//!
//! - row-count estimation (`estimate`)
//! - lazy chunked reading of the source table (`chunks`)
//! - batched, atomic table export (`export`)
//! - table manifests (`manifest`)

pub mod chunks;
pub mod estimate;
pub mod export;
pub mod manifest;

pub use chunks::{Chunk, ChunkFailure, ChunkRead, ChunkReader};
pub use estimate::{estimate_rows, EstimateMethod, RowEstimate};
pub use export::{write_daily_series, write_table, WriteOptions, WriteReport};
