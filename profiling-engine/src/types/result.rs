use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, PartitionId, Record};
use crate::rules::{RuleFailure, Severity};
use crate::stats::FieldSummary;

/// Grouping key for anomaly patterns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    pub category: String,
    pub name: String,
}

impl RuleKey {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }
}

/// Exact number of failures of one rule within a partition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailureCount {
    pub category: String,
    pub name: String,
    pub count: u64,
}

impl RuleFailureCount {
    pub fn key(&self) -> RuleKey {
        RuleKey::new(&self.category, &self.name)
    }
}

/// A record that failed one or more rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub job_id: JobId,
    pub partition_id: PartitionId,
    /// Absolute offset of the record within its partition stream.
    pub offset: u64,
    pub record_id: String,
    pub severity: Severity,
    pub failures: Vec<RuleFailure>,
    pub record: Record,
    pub detected_at: DateTime<Utc>,
}

/// Output of one partition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionResult {
    pub job_id: JobId,
    pub partition_id: PartitionId,
    pub records_evaluated: u64,
    pub records_passed: u64,
    pub records_failed: u64,
    /// Capped sample of the anomalies seen, in stream order.
    pub anomalies: Vec<AnomalyRecord>,
    /// Exact anomaly count, independent of the sample cap.
    pub anomaly_count: u64,
    /// Per-rule failures over the whole partition, including tallies carried
    /// over from the checkpoint the run resumed from.
    pub rule_failure_counts: Vec<RuleFailureCount>,
    pub field_statistics: BTreeMap<String, FieldSummary>,
    pub execution_time_ms: u64,
    pub peak_memory_mb: f64,
    pub checkpoints_written: u64,
    pub flush_count: u64,
    pub anomalies_flushed: u64,
    pub resumed_from: u64,
}

impl PartitionResult {
    /// Returns true if the anomaly sample was truncated.
    pub fn is_sample_truncated(&self) -> bool {
        (self.anomalies.len() as u64) < self.anomaly_count
    }
}
