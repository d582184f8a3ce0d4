use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Lifecycle status of a profiling job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns true if the job may be (re-)executed from this status.
    pub fn is_executable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job's record space is split into partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Contiguous offset ranges over `[0, total_records)`.
    #[default]
    ById,
    /// Contiguous wall-clock ranges over `[start_date, end_date]`.
    ByDate,
}

/// One profiling run over a record space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingJob {
    pub id: JobId,
    pub name: String,
    pub total_records: u64,
    pub partition_strategy: PartitionStrategy,
    pub partition_count: u32,
    pub memory_limit_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub records_processed: u64,
    #[serde(default)]
    pub anomalies_found: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ProfilingJob {
    /// Creates a pending `by_id` job. The id is assigned by the repository.
    pub fn new(name: impl Into<String>, total_records: u64, partition_count: u32) -> Self {
        Self {
            id: 0,
            name: name.into(),
            total_records,
            partition_strategy: PartitionStrategy::ById,
            partition_count,
            memory_limit_mb: 512,
            start_date: None,
            end_date: None,
            status: JobStatus::Pending,
            progress_percent: 0.0,
            records_processed: 0,
            anomalies_found: 0,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Switches the job to `by_date` partitioning over `[start, end]`.
    pub fn with_date_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.partition_strategy = PartitionStrategy::ByDate;
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Sets the per-partition memory ceiling in megabytes.
    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = limit;
        self
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.error_message = None;
        self.progress_percent = 0.0;
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.progress_percent = 100.0;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }
}
