//! Data model shared by the planner, profiler, orchestrator and repositories.

mod job;
mod partition;
mod pattern;
mod record;
mod result;

pub use job::{JobStatus, PartitionStrategy, ProfilingJob};
pub use partition::{PartitionPlan, PartitionRange, PartitionStatus, ProfilingPartition};
pub use pattern::ProfilingAnomalyPattern;
pub use record::{numeric_value, record_identifier, stringify_value, Record};
pub use result::{AnomalyRecord, PartitionResult, RuleFailureCount, RuleKey};

/// Repository-assigned job identifier.
pub type JobId = u64;

/// Repository-assigned partition identifier.
pub type PartitionId = u64;
