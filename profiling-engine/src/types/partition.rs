use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, PartitionId};

/// Lifecycle status of a single partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl PartitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStatus::Pending => "pending",
            PartitionStatus::Running => "running",
            PartitionStatus::Completed => "completed",
            PartitionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of the record space covered by one partition.
///
/// Id ranges are half-open. Date ranges are half-open unless `end_inclusive`
/// is set, which only the final partition of a job does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionRange {
    Id {
        start: u64,
        end: u64,
    },
    Date {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        end_inclusive: bool,
    },
}

impl PartitionRange {
    /// Human-readable range descriptor, used as the partition key.
    pub fn key(&self) -> String {
        match self {
            PartitionRange::Id { start, end } => format!("id:[{start},{end})"),
            PartitionRange::Date {
                start,
                end,
                end_inclusive,
            } => {
                let close = if *end_inclusive { ']' } else { ')' };
                format!("date:[{},{}{close}", start.to_rfc3339(), end.to_rfc3339())
            }
        }
    }

    /// Returns true if the timestamp falls within a date range.
    pub fn contains_date(&self, ts: &DateTime<Utc>) -> bool {
        match self {
            PartitionRange::Date {
                start,
                end,
                end_inclusive,
            } => ts >= start && (ts < end || (*end_inclusive && ts == end)),
            PartitionRange::Id { .. } => false,
        }
    }

    /// Start value rendered as a string.
    pub fn start_value(&self) -> String {
        match self {
            PartitionRange::Id { start, .. } => start.to_string(),
            PartitionRange::Date { start, .. } => start.to_rfc3339(),
        }
    }

    /// End value rendered as a string.
    pub fn end_value(&self) -> String {
        match self {
            PartitionRange::Id { end, .. } => end.to_string(),
            PartitionRange::Date { end, .. } => end.to_rfc3339(),
        }
    }
}

/// A planned partition before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub index: u32,
    pub range: PartitionRange,
    pub estimated_records: u64,
}

/// A persisted partition of a profiling job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingPartition {
    pub id: PartitionId,
    pub job_id: JobId,
    pub index: u32,
    pub partition_key: String,
    pub range: PartitionRange,
    pub start_value: String,
    pub end_value: String,
    pub estimated_records: u64,
    pub status: PartitionStatus,
    pub records_processed: u64,
    pub anomaly_count: u64,
    pub resumed_from: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ProfilingPartition {
    /// Builds a pending partition from a plan. The id is assigned by the repository.
    pub fn from_plan(job_id: JobId, plan: PartitionPlan) -> Self {
        Self {
            id: 0,
            job_id,
            index: plan.index,
            partition_key: plan.range.key(),
            start_value: plan.range.start_value(),
            end_value: plan.range.end_value(),
            range: plan.range,
            estimated_records: plan.estimated_records,
            status: PartitionStatus::Pending,
            records_processed: 0,
            anomaly_count: 0,
            resumed_from: 0,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Starts a run after `resumed_from` records, `prior_anomalies` of which
    /// were anomalies.
    pub(crate) fn mark_running(&mut self, resumed_from: u64, prior_anomalies: u64) {
        self.status = PartitionStatus::Running;
        self.resumed_from = resumed_from;
        self.records_processed = resumed_from;
        self.anomaly_count = prior_anomalies;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.error_message = None;
    }

    pub(crate) fn mark_completed(&mut self, records_processed: u64, anomaly_count: u64) {
        self.status = PartitionStatus::Completed;
        self.records_processed = records_processed;
        self.anomaly_count = anomaly_count;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = PartitionStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }
}
