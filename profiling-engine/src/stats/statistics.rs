//! Bounded streaming per-field statistics.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{stringify_value, Record};

/// Default cap on distinct values remembered per field.
pub const DEFAULT_DISTINCT_CAP: usize = 1000;

/// Summary of one field, as reported in a partition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Number of records in which the field appeared, nulls included.
    pub count: u64,
    pub null_count: u64,
    /// `null_count / count * 100`.
    pub null_percentage: f64,
    /// Distinct non-null values seen, bounded by the distinct cap.
    pub distinct_count: u64,
    /// True when values were dropped because the distinct set was full.
    pub distinct_capped: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Mean of the values that were JSON numbers, if any.
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct FieldAccumulator {
    count: u64,
    null_count: u64,
    distinct: HashSet<String>,
    distinct_capped: bool,
    numeric_sum: f64,
    numeric_count: u64,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl FieldAccumulator {
    fn observe(&mut self, value: &Value, distinct_cap: usize) {
        self.count += 1;
        if value.is_null() {
            self.null_count += 1;
            return;
        }

        if let Value::Number(n) = value {
            if let Some(v) = n.as_f64() {
                self.numeric_sum += v;
                self.numeric_count += 1;
            }
        }

        let rendered = stringify_value(value);
        let length = rendered.chars().count();
        self.min_length = Some(self.min_length.map_or(length, |m| m.min(length)));
        self.max_length = Some(self.max_length.map_or(length, |m| m.max(length)));

        if self.distinct.len() < distinct_cap {
            self.distinct.insert(rendered);
        } else if !self.distinct.contains(&rendered) {
            self.distinct_capped = true;
        }
    }

    fn summary(&self) -> FieldSummary {
        let null_percentage = if self.count > 0 {
            self.null_count as f64 / self.count as f64 * 100.0
        } else {
            0.0
        };
        let average = (self.numeric_count > 0)
            .then(|| self.numeric_sum / self.numeric_count as f64);

        FieldSummary {
            count: self.count,
            null_count: self.null_count,
            null_percentage,
            distinct_count: self.distinct.len() as u64,
            distinct_capped: self.distinct_capped,
            min_length: self.min_length,
            max_length: self.max_length,
            average,
        }
    }
}

/// Accumulates per-field summaries over a record stream.
///
/// Memory per field is bounded by the distinct cap; no other raw values are
/// retained. Results depend only on record order, not on how the stream was
/// batched.
#[derive(Debug, Clone)]
pub struct StatisticsCollector {
    fields: BTreeMap<String, FieldAccumulator>,
    distinct_cap: usize,
    records_seen: u64,
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::with_distinct_cap(DEFAULT_DISTINCT_CAP)
    }

    pub fn with_distinct_cap(distinct_cap: usize) -> Self {
        Self {
            fields: BTreeMap::new(),
            distinct_cap,
            records_seen: 0,
        }
    }

    /// Merges one batch of records into the running counters.
    pub fn update(&mut self, batch: &[Record]) {
        for record in batch {
            self.observe(record);
        }
    }

    /// Merges a single record into the running counters.
    pub fn observe(&mut self, record: &Record) {
        self.records_seen += 1;
        for (field, value) in record {
            if let Some(acc) = self.fields.get_mut(field) {
                acc.observe(value, self.distinct_cap);
            } else {
                let mut acc = FieldAccumulator::default();
                acc.observe(value, self.distinct_cap);
                self.fields.insert(field.clone(), acc);
            }
        }
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Returns the per-field summary, ordered by field name.
    pub fn get_summary(&self) -> BTreeMap<String, FieldSummary> {
        self.fields
            .iter()
            .map(|(field, acc)| (field.clone(), acc.summary()))
            .collect()
    }
}
