//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - reference samples and run configuration (`ReferenceSample`, `PipelineConfig`)
//! - tagged field/record outcomes (`FieldOutcome`, `RecordOutcome`)
//! - chunk results, run counters and the output table (`ChunkResult`, `AggregateStats`, `OutputTable`)

pub mod table;
pub mod types;

pub use table::*;
pub use types::*;
