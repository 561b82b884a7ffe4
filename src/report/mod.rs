//! Reporting: terminal summaries of runs, estimates and daily series.

pub mod format;

pub use format::{format_daily_series, format_estimate, format_run_summary};
