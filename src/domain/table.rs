//! The ordered output table and its column layout.

use std::borrow::Cow;
use std::sync::Arc;

use crate::domain::types::{
    ComputedRecord, FieldOutcome, Schema, DAYS_COLUMN, DAYS_SECONDARY_COLUMN, UNITS_COLUMN,
    UNITS_SECONDARY_COLUMN,
};

/// Where each derived field lands in an output row.
///
/// A derived field whose name already exists in the source overwrites that
/// column in place; otherwise it is appended after the source columns.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DerivedLayout {
    days: usize,
    units: usize,
    secondary: Option<(usize, usize)>,
    appended: Vec<String>,
}

impl DerivedLayout {
    fn new(schema: &Schema, with_secondary: bool) -> Self {
        let mut appended = Vec::new();
        let mut slot = |name: &str| match schema.index_of(name) {
            Some(idx) => idx,
            None => {
                appended.push(name.to_string());
                schema.len() + appended.len() - 1
            }
        };

        let days = slot(DAYS_COLUMN);
        let units = slot(UNITS_COLUMN);
        let secondary = with_secondary.then(|| (slot(DAYS_SECONDARY_COLUMN), slot(UNITS_SECONDARY_COLUMN)));

        Self {
            days,
            units,
            secondary,
            appended,
        }
    }
}

/// Ordered concatenation of every computed chunk, in source row order.
#[derive(Debug, Clone)]
pub struct OutputTable {
    schema: Arc<Schema>,
    layout: DerivedLayout,
    records: Vec<ComputedRecord>,
}

impl OutputTable {
    pub fn new(schema: Arc<Schema>, with_secondary: bool) -> Self {
        Self::with_capacity(schema, with_secondary, 0)
    }

    pub fn with_capacity(schema: Arc<Schema>, with_secondary: bool, capacity: usize) -> Self {
        let layout = DerivedLayout::new(&schema, with_secondary);
        Self {
            schema,
            layout,
            records: Vec::with_capacity(capacity),
        }
    }

    /// A table with no schema and no rows.
    pub fn empty() -> Self {
        Self::new(Arc::new(Schema::new(Vec::new())), false)
    }

    pub fn has_secondary(&self) -> bool {
        self.layout.secondary.is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ComputedRecord] {
        &self.records
    }

    /// Strict append; no reordering and no deduplication.
    pub fn extend(&mut self, records: Vec<ComputedRecord>) {
        self.records.extend(records);
    }

    /// Output header: source columns followed by appended derived columns.
    pub fn header(&self) -> Vec<String> {
        if self.schema.is_empty() {
            return Vec::new();
        }
        self.schema
            .columns()
            .iter()
            .cloned()
            .chain(self.layout.appended.iter().cloned())
            .collect()
    }

    pub fn width(&self) -> usize {
        if self.schema.is_empty() {
            0
        } else {
            self.schema.len() + self.layout.appended.len()
        }
    }

    /// Output cells of one record. Source text is passed through untouched
    /// except where a derived field overwrites it; missing values are empty.
    pub fn cells<'a>(&self, record: &'a ComputedRecord) -> Vec<Cow<'a, str>> {
        let mut cells: Vec<Cow<'a, str>> = record.fields.iter().map(Cow::Borrowed).collect();
        cells.resize(self.width(), Cow::Borrowed(""));

        put_outcome(&mut cells, self.layout.days, self.layout.units, &record.primary);
        if let (Some((days, units)), Some(outcome)) = (self.layout.secondary, record.secondary.as_ref()) {
            put_outcome(&mut cells, days, units, outcome);
        }
        cells
    }
}

fn put_outcome(cells: &mut [Cow<'_, str>], days_idx: usize, units_idx: usize, outcome: &FieldOutcome) {
    let (days, units) = match outcome {
        FieldOutcome::Computed(interval) => (
            interval.days.to_string(),
            format!("{:.2}", interval.accumulated_units),
        ),
        FieldOutcome::Missing(_) => (String::new(), String::new()),
    };
    if let Some(cell) = cells.get_mut(days_idx) {
        *cell = Cow::Owned(days);
    }
    if let Some(cell) = cells.get_mut(units_idx) {
        *cell = Cow::Owned(units);
    }
}
