//! Formatted terminal output.
//!
//! Formatting stays in one place so the pipeline returns plain values and
//! output changes are localized.

use std::path::Path;

use chrono::NaiveDate;

use crate::app::pipeline::{RunOutput, RunStatus};
use crate::data::DailyHeat;
use crate::io::estimate::RowEstimate;
use crate::io::export::WriteReport;

/// Format the run summary: source, estimate, counters, skipped chunks and
/// the written artifact.
pub fn format_run_summary(source: &Path, output: &RunOutput, written: Option<&WriteReport>) -> String {
    let mut out = String::new();

    out.push_str("=== gdu - Heat Unit Intervals ===\n");
    out.push_str(&format!("Source: {}\n", source.display()));
    out.push_str(&format!(
        "Estimate: {} rows ({})\n",
        output.estimate.rows,
        output.estimate.method.label()
    ));

    if let RunStatus::MissingColumn(missing) = &output.status {
        out.push_str(&format!(
            "Required {} column '{}' not found; nothing computed.\n",
            missing.role.label(),
            missing.name
        ));
        return out;
    }

    let secondary = if output.table.has_secondary() { "yes" } else { "no" };
    out.push_str(&format!(
        "Rows: {} | chunks={} | secondary={secondary}\n",
        output.table.len(),
        output.chunks_processed,
    ));

    out.push_str("\nCounters:\n");
    out.push_str(&format!("  {:<18} {:>10}\n", "errors", output.stats.error_count));
    out.push_str(&format!("  {:<18} {:>10}\n", "valid", output.stats.valid_row_count));
    out.push_str(&format!("  {:<18} {:>10}\n", "high value", output.stats.high_value_count));
    if output.stats.negative_interval_count > 0 {
        out.push_str(&format!(
            "  {:<18} {:>10}\n",
            "negative intervals", output.stats.negative_interval_count
        ));
    }

    if !output.skipped.is_empty() {
        out.push_str(&format!(
            "\nSkipped chunks ({} rows dropped):\n",
            output.rows_dropped()
        ));
        for chunk in &output.skipped {
            out.push_str(&format!(
                "- chunk {} rows {}-{}: {}\n",
                chunk.index, chunk.first_row, chunk.last_row, chunk.reason
            ));
        }
    }

    if let Some(report) = written {
        out.push_str(&format!(
            "\nWrote {} rows to {} ({} batch{})\n",
            report.rows,
            report.path.display(),
            report.batches,
            if report.batches == 1 { "" } else { "es" }
        ));
        if let Some(manifest) = &report.manifest {
            out.push_str(&format!("Manifest: {}\n", manifest.display()));
        }
    }

    out
}

/// Format a row estimate with the chunk plan it implies.
pub fn format_estimate(source: &Path, estimate: &RowEstimate, chunk_size: usize) -> String {
    format!(
        "{}: ~{} rows via {} ({} chunks of {})\n",
        source.display(),
        estimate.rows,
        estimate.method.label(),
        estimate.chunks(chunk_size),
        chunk_size
    )
}

/// Format a single-interval daily breakdown.
pub fn format_daily_series(plant: NaiveDate, obs: NaiveDate, days: &[DailyHeat]) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Heat units after {} through {} ({} days)\n",
        plant.format("%d/%m/%Y"),
        obs.format("%d/%m/%Y"),
        (obs - plant).num_days()
    ));
    out.push_str(&format!(
        "{:<10} {:>8} {:>8} {:>10} {:>12}\n",
        "date", "temp_min", "temp_max", "heat_units", "cumulative"
    ));
    out.push_str(&format!(
        "{:-<10} {:-<8} {:-<8} {:-<10} {:-<12}\n",
        "", "", "", "", ""
    ));

    for day in days {
        out.push_str(&format!(
            "{:<10} {:>8.1} {:>8.1} {:>10.2} {:>12.2}\n",
            day.date.format("%d/%m/%Y").to_string(),
            day.temp_min,
            day.temp_max,
            day.heat_units,
            day.cumulative
        ));
    }

    let total = days.last().map_or(0.0, |d| d.cumulative);
    out.push_str(&format!("Total: {total:.2}\n"));
    out
}
