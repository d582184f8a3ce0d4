//! Persistence seams for jobs, partitions, results, patterns and rules.
//!
//! The orchestrator writes every status transition, partition result and
//! pattern through [`ProfilingRepository`], and loads a job's rules through
//! [`RuleRepository`]. Storage is left to the embedding application;
//! [`InMemoryProfilingRepository`] implements both traits for tests and
//! single-process use.

use async_trait::async_trait;

use crate::error::Result;
use crate::rules::RuleDefinition;
use crate::types::{
    JobId, PartitionId, PartitionResult, ProfilingAnomalyPattern, ProfilingJob, ProfilingPartition,
};

mod in_memory;

pub use in_memory::InMemoryProfilingRepository;

/// Source of the rule definitions that apply to a job.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Loads the ordered rule definitions for `job_id`.
    async fn load_rules(&self, job_id: JobId) -> Result<Vec<RuleDefinition>>;
}

/// Storage for profiling jobs and everything they produce.
#[async_trait]
pub trait ProfilingRepository: Send + Sync {
    /// Loads a job.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilingError::JobNotFound`](crate::ProfilingError::JobNotFound)
    /// if the job does not exist.
    async fn get_job(&self, job_id: JobId) -> Result<ProfilingJob>;

    /// Persists the current state of a job.
    async fn update_job(&self, job: &ProfilingJob) -> Result<()>;

    /// Lists the partitions of a job ordered by partition index.
    async fn list_partitions(&self, job_id: JobId) -> Result<Vec<ProfilingPartition>>;

    /// Persists new partitions and returns them with assigned ids.
    async fn create_partitions(
        &self,
        job_id: JobId,
        partitions: Vec<ProfilingPartition>,
    ) -> Result<Vec<ProfilingPartition>>;

    /// Persists the current state of a partition.
    async fn update_partition(&self, partition: &ProfilingPartition) -> Result<()>;

    async fn save_partition_result(&self, result: &PartitionResult) -> Result<()>;

    async fn load_partition_result(&self, partition_id: PartitionId)
        -> Result<Option<PartitionResult>>;

    /// Appends patterns detected for a job.
    async fn save_patterns(&self, job_id: JobId, patterns: &[ProfilingAnomalyPattern])
        -> Result<()>;

    async fn list_patterns(&self, job_id: JobId) -> Result<Vec<ProfilingAnomalyPattern>>;
}
