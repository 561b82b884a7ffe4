//! Interval aggregation: days elapsed and heat units accumulated between a
//! planting date and an observation date.
//!
//! Containment is explicit and layered:
//!
//! - field level: a missing/unparseable date marks that pair `Missing`
//! - record level: anything else marks every pair of the record `Missing`
//!   and counts one error
//!
//! Neither level aborts the chunk.

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::warn;

use crate::data::ReferenceSeries;
use crate::domain::{
    round2, AggregateStats, ChunkResult, ColumnSpec, ComputedRecord, FieldOutcome, Interval, MissingReason,
    NegativeDays, RecordFailure, RecordOutcome, Schema, HIGH_VALUE_THRESHOLD,
};
use crate::heat::dates::parse_day_first;
use crate::io::chunks::Chunk;

/// A column the run depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Planting,
    Primary,
}

impl ColumnRole {
    pub fn label(self) -> &'static str {
        match self {
            ColumnRole::Planting => "planting date",
            ColumnRole::Primary => "observation date",
        }
    }
}

/// A required column absent from the source header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingColumn {
    pub role: ColumnRole,
    pub name: String,
}

/// Column positions resolved once against the source schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub planting: (String, usize),
    pub primary: (String, usize),
    /// `None` disables secondary computation for the whole run.
    pub secondary: Option<(String, usize)>,
}

impl ResolvedColumns {
    pub fn resolve(schema: &Schema, spec: &ColumnSpec) -> Result<Self, MissingColumn> {
        let required = |name: &str, role: ColumnRole| {
            schema
                .index_of(name)
                .map(|idx| (name.to_string(), idx))
                .ok_or_else(|| MissingColumn {
                    role,
                    name: name.to_string(),
                })
        };

        let planting = required(&spec.planting, ColumnRole::Planting)?;
        let primary = required(&spec.primary, ColumnRole::Primary)?;
        let secondary = spec
            .secondary
            .as_deref()
            .and_then(|name| schema.index_of(name).map(|idx| (name.to_string(), idx)));

        Ok(Self {
            planting,
            primary,
            secondary,
        })
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }
}

/// Compute one date pair.
///
/// `plant` and `obs` are already-parsed dates (`None` = missing). The window
/// is `(plant, obs]`; `days` is not clamped, so reversed dates give a negative
/// count over an empty window unless `policy` rejects them.
pub fn compute_interval(
    plant: Option<NaiveDate>,
    obs: Option<NaiveDate>,
    series: &ReferenceSeries,
    policy: NegativeDays,
) -> FieldOutcome {
    let Some(plant) = plant else {
        return FieldOutcome::Missing(MissingReason::PlantingDate);
    };
    let Some(obs) = obs else {
        return FieldOutcome::Missing(MissingReason::ObservationDate);
    };

    let days = (obs - plant).num_days();
    if days < 0 && policy == NegativeDays::Reject {
        return FieldOutcome::Missing(MissingReason::NegativeInterval);
    }

    let total = series.accumulate(plant, obs);
    FieldOutcome::Computed(Interval {
        days,
        accumulated_units: round2(total),
        high_value: total > HIGH_VALUE_THRESHOLD,
    })
}

/// Compute every date pair of one record.
pub fn compute_record(
    fields: &StringRecord,
    columns: &ResolvedColumns,
    series: &ReferenceSeries,
    policy: NegativeDays,
) -> RecordOutcome {
    let field = |(name, idx): &(String, usize)| {
        fields.get(*idx).ok_or_else(|| RecordFailure::FieldOutOfRange {
            column: name.clone(),
            index: *idx,
        })
    };

    let plant_text = match field(&columns.planting) {
        Ok(text) => text,
        Err(failure) => return RecordOutcome::Failed(failure),
    };
    let primary_text = match field(&columns.primary) {
        Ok(text) => text,
        Err(failure) => return RecordOutcome::Failed(failure),
    };
    let secondary_text = match columns.secondary.as_ref().map(field).transpose() {
        Ok(text) => text,
        Err(failure) => return RecordOutcome::Failed(failure),
    };

    let plant = parse_day_first(plant_text);
    let primary = compute_interval(plant, parse_day_first(primary_text), series, policy);
    let secondary = secondary_text.map(|text| compute_interval(plant, parse_day_first(text), series, policy));

    let non_finite = |outcome: &FieldOutcome| {
        outcome
            .accumulated_units()
            .is_some_and(|units| !units.is_finite())
    };
    if non_finite(&primary) || secondary.as_ref().is_some_and(non_finite) {
        return RecordOutcome::Failed(RecordFailure::NonFiniteSum);
    }

    RecordOutcome::Computed { primary, secondary }
}

/// Turn a record outcome into its output record and counters.
pub fn settle_record(
    row: usize,
    fields: StringRecord,
    outcome: RecordOutcome,
    with_secondary: bool,
    policy: NegativeDays,
) -> (ComputedRecord, AggregateStats) {
    let mut stats = AggregateStats::default();

    let (primary, secondary) = match outcome {
        RecordOutcome::Computed { primary, secondary } => {
            tally_field(&mut stats, row, &primary, policy);
            if let Some(secondary) = secondary.as_ref() {
                tally_field(&mut stats, row, secondary, policy);
            }
            (primary, secondary)
        }
        RecordOutcome::Failed(failure) => {
            warn!(row, %failure, "Record could not be computed");
            stats.error_count += 1;
            let missing = FieldOutcome::Missing(MissingReason::RecordFailed);
            (missing, with_secondary.then_some(missing))
        }
    };

    let record = ComputedRecord {
        row,
        fields,
        primary,
        secondary,
    };
    (record, stats)
}

fn tally_field(stats: &mut AggregateStats, row: usize, outcome: &FieldOutcome, policy: NegativeDays) {
    match outcome {
        FieldOutcome::Computed(interval) => {
            stats.valid_row_count += 1;
            if interval.high_value {
                stats.high_value_count += 1;
            }
            if interval.days < 0 && policy == NegativeDays::Flag {
                stats.negative_interval_count += 1;
                warn!(row, days = interval.days, "Observation date precedes planting date");
            }
        }
        FieldOutcome::Missing(_) => stats.error_count += 1,
    }
}

/// Compute every record of a chunk. The chunk is consumed so its rows move
/// into the result without copying.
pub fn aggregate_chunk(
    chunk: Chunk,
    columns: &ResolvedColumns,
    series: &ReferenceSeries,
    policy: NegativeDays,
) -> ChunkResult {
    let Chunk {
        index,
        first_row,
        records: rows,
    } = chunk;

    let with_secondary = columns.has_secondary();
    let mut records = Vec::with_capacity(rows.len());
    let mut stats = AggregateStats::default();

    for (offset, fields) in rows.into_iter().enumerate() {
        let outcome = compute_record(&fields, columns, series, policy);
        let (record, record_stats) = settle_record(first_row + offset, fields, outcome, with_secondary, policy);
        stats += record_stats;
        records.push(record);
    }

    ChunkResult {
        index,
        first_row,
        records,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReferenceSample;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Jan 2-5 2024, 15/25 each day (10 heat units per day).
    fn series() -> ReferenceSeries {
        ReferenceSeries::new(
            (2..=5)
                .map(|d| ReferenceSample {
                    date: ymd(2024, 1, d),
                    temp_min: 15.0,
                    temp_max: 25.0,
                })
                .collect(),
        )
    }

    fn columns(secondary: bool) -> ResolvedColumns {
        ResolvedColumns {
            planting: ("plant".to_string(), 0),
            primary: ("obs".to_string(), 1),
            secondary: secondary.then(|| ("obs2".to_string(), 2)),
        }
    }

    #[test]
    fn scenario_four_days_forty_units() {
        let outcome = compute_interval(Some(ymd(2024, 1, 1)), Some(ymd(2024, 1, 5)), &series(), NegativeDays::Flag);
        let interval = outcome.interval().expect("computed");
        assert_eq!(interval.days, 4);
        assert_eq!(interval.accumulated_units, 40.0);
        assert!(!interval.high_value);
    }

    #[test]
    fn planting_day_excluded_observation_day_included() {
        let outcome = compute_interval(Some(ymd(2024, 1, 2)), Some(ymd(2024, 1, 3)), &series(), NegativeDays::Flag);
        assert_eq!(outcome.accumulated_units(), Some(10.0));
        assert_eq!(outcome.days(), Some(1));
    }

    #[test]
    fn missing_dates_are_tagged() {
        assert_eq!(
            compute_interval(None, Some(ymd(2024, 1, 5)), &series(), NegativeDays::Flag),
            FieldOutcome::Missing(MissingReason::PlantingDate)
        );
        assert_eq!(
            compute_interval(Some(ymd(2024, 1, 1)), None, &series(), NegativeDays::Flag),
            FieldOutcome::Missing(MissingReason::ObservationDate)
        );
    }

    #[test]
    fn negative_interval_policies() {
        let plant = Some(ymd(2024, 1, 5));
        let obs = Some(ymd(2024, 1, 1));

        let accepted = compute_interval(plant, obs, &series(), NegativeDays::Accept);
        assert_eq!(accepted.days(), Some(-4));
        assert_eq!(accepted.accumulated_units(), Some(0.0));

        let rejected = compute_interval(plant, obs, &series(), NegativeDays::Reject);
        assert_eq!(rejected, FieldOutcome::Missing(MissingReason::NegativeInterval));

        let fields = StringRecord::from(vec!["05/01/2024", "01/01/2024"]);
        let outcome = compute_record(&fields, &columns(false), &series(), NegativeDays::Flag);
        let (_, stats) = settle_record(1, fields, outcome, false, NegativeDays::Flag);
        assert_eq!(stats.valid_row_count, 1);
        assert_eq!(stats.negative_interval_count, 1);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn high_value_uses_threshold() {
        let hot = ReferenceSeries::new(
            (1..=31)
                .map(|d| ReferenceSample {
                    date: ymd(2024, 7, d),
                    temp_min: 40.0,
                    temp_max: 60.0,
                })
                .collect(),
        );
        // 40 units/day: 30 days = 1200 (not above), 31 days = 1240.
        let at = compute_interval(Some(ymd(2024, 6, 30)), Some(ymd(2024, 7, 30)), &hot, NegativeDays::Flag);
        assert_eq!(at.accumulated_units(), Some(1200.0));
        assert!(!at.interval().unwrap().high_value);

        let above = compute_interval(Some(ymd(2024, 6, 30)), Some(ymd(2024, 7, 31)), &hot, NegativeDays::Flag);
        assert!(above.interval().unwrap().high_value);
    }

    #[test]
    fn high_value_is_counted_per_pair() {
        let hot = ReferenceSeries::new(
            (1..=31)
                .map(|d| ReferenceSample {
                    date: ymd(2024, 7, d),
                    temp_min: 40.0,
                    temp_max: 60.0,
                })
                .collect(),
        );
        let settle = |cells: Vec<&str>| {
            let fields = StringRecord::from(cells);
            let outcome = compute_record(&fields, &columns(true), &hot, NegativeDays::Flag);
            settle_record(1, fields, outcome, true, NegativeDays::Flag).1
        };

        // 1240 units on both pairs.
        let both = settle(vec!["30/06/2024", "31/07/2024", "31/07/2024"]);
        assert_eq!(both.triple(), (0, 2, 2));

        // Primary 400 units, secondary 1240.
        let secondary_only = settle(vec!["30/06/2024", "10/07/2024", "31/07/2024"]);
        assert_eq!(secondary_only.triple(), (0, 2, 1));

        let chunk = Chunk {
            index: 0,
            first_row: 1,
            records: vec![
                StringRecord::from(vec!["30/06/2024", "31/07/2024", "31/07/2024"]),
                StringRecord::from(vec!["30/06/2024", "10/07/2024", "31/07/2024"]),
            ],
        };
        let result = aggregate_chunk(chunk, &columns(true), &hot, NegativeDays::Flag);
        assert_eq!(result.stats.high_value_count, 3);
    }

    #[test]
    fn empty_observation_counts_one_error() {
        let fields = StringRecord::from(vec!["01/01/2024", ""]);
        let outcome = compute_record(&fields, &columns(false), &series(), NegativeDays::Flag);
        let (record, stats) = settle_record(7, fields, outcome, false, NegativeDays::Flag);

        assert_eq!(record.row, 7);
        assert_eq!(record.primary, FieldOutcome::Missing(MissingReason::ObservationDate));
        assert_eq!(record.secondary, None);
        assert_eq!(stats.triple(), (1, 0, 0));
    }

    #[test]
    fn pairs_are_counted_independently() {
        let fields = StringRecord::from(vec!["01/01/2024", "05/01/2024", "garbage"]);
        let outcome = compute_record(&fields, &columns(true), &series(), NegativeDays::Flag);
        let (record, stats) = settle_record(1, fields, outcome, true, NegativeDays::Flag);

        assert_eq!(record.primary.days(), Some(4));
        assert_eq!(record.secondary, Some(FieldOutcome::Missing(MissingReason::ObservationDate)));
        assert_eq!(stats.triple(), (1, 1, 0));
    }

    #[test]
    fn short_row_fails_whole_record_once() {
        let fields = StringRecord::from(vec!["01/01/2024", "05/01/2024"]);
        let outcome = compute_record(&fields, &columns(true), &series(), NegativeDays::Flag);
        assert!(matches!(
            outcome,
            RecordOutcome::Failed(RecordFailure::FieldOutOfRange { index: 2, .. })
        ));

        let (record, stats) = settle_record(1, fields, outcome, true, NegativeDays::Flag);
        assert!(record.primary.is_missing());
        assert_eq!(record.secondary, Some(FieldOutcome::Missing(MissingReason::RecordFailed)));
        assert_eq!(stats.triple(), (1, 0, 0));
    }

    #[test]
    fn resolve_columns_checks_required_and_optional() {
        let schema = Schema::new(vec!["Plant".to_string(), "Obs".to_string()]);
        let spec = ColumnSpec {
            planting: "plant".to_string(),
            primary: "obs".to_string(),
            secondary: Some("obs2".to_string()),
        };
        let resolved = ResolvedColumns::resolve(&schema, &spec).unwrap();
        assert_eq!(resolved.planting.1, 0);
        assert_eq!(resolved.primary.1, 1);
        assert!(!resolved.has_secondary());

        let spec = ColumnSpec {
            planting: "sowing".to_string(),
            ..spec
        };
        let missing = ResolvedColumns::resolve(&schema, &spec).unwrap_err();
        assert_eq!(missing.role, ColumnRole::Planting);
        assert_eq!(missing.name, "sowing");
    }

    #[test]
    fn aggregate_chunk_keeps_order_and_sums_stats() {
        let chunk = Chunk {
            index: 3,
            first_row: 31,
            records: vec![
                StringRecord::from(vec!["01/01/2024", "05/01/2024", "03/01/2024"]),
                StringRecord::from(vec!["", "05/01/2024", "03/01/2024"]),
                StringRecord::from(vec!["01/01/2024", "n/a", "04/01/2024"]),
            ],
        };
        let result = aggregate_chunk(chunk, &columns(true), &series(), NegativeDays::Flag);

        assert_eq!(result.index, 3);
        assert_eq!(result.records.iter().map(|r| r.row).collect::<Vec<_>>(), vec![31, 32, 33]);
        assert_eq!(result.records[0].secondary.and_then(|s| s.accumulated_units()), Some(20.0));
        // Row 32: both pairs miss the planting date; row 33: primary missing.
        assert_eq!(result.stats.triple(), (3, 3, 0));
        assert_eq!(result.rows_computed(), 1);
        assert_eq!(result.rows_failed(), 2);
    }
}
