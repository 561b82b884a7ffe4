//! Reference data loaded ahead of the pipeline.

pub mod reference;

pub use reference::*;
