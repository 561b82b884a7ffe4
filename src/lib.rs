//! `gdu-chunks` library crate.
//!
//! The binary (`gdu`) is a thin wrapper around this library so that:
//!
//! - the chunked pipeline is testable without spawning processes
//! - the core (`app::pipeline::process`) can be driven by other front-ends

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod heat;
pub mod io;
pub mod report;
