use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// A cross-partition aggregation of anomalies sharing a rule category and name.
///
/// Created once per job after all partitions resolve and never mutated
/// afterwards; the downstream sampling engine reads it to weight its pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingAnomalyPattern {
    pub job_id: JobId,
    /// Rule category the pattern was grouped under.
    pub pattern_type: String,
    pub rule_name: String,
    pub description: String,
    pub confidence_score: f64,
    pub occurrence_count: u64,
    pub occurrence_percentage: f64,
    pub sample_record_ids: Vec<String>,
    pub recommended_for_sampling: bool,
    pub sampling_priority: u8,
    pub created_at: DateTime<Utc>,
}
