use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::checkpoint::Checkpoint;
use crate::config::EngineConfig;
use crate::rules::Rule;
use crate::types::{
    JobId, PartitionId, PartitionRange, ProfilingJob, ProfilingPartition, RuleFailureCount,
};

/// Everything a profiler needs to run one partition.
///
/// Built by the orchestrator for every partition task and discarded when the
/// task ends.
#[derive(Debug, Clone)]
pub struct ProfilingContext {
    pub job_id: JobId,
    pub partition_id: PartitionId,
    pub range: PartitionRange,
    /// Estimated records in the partition.
    pub total_records: u64,
    pub batch_size: usize,
    pub memory_limit_mb: u64,
    pub rules: Arc<Vec<Rule>>,
    pub checkpoint_interval: u64,
    /// Absolute offset the stream was opened at.
    pub resume_offset: u64,
    /// Anomalies already found before `resume_offset`.
    pub prior_anomaly_count: u64,
    /// Rule failure tallies carried over from before `resume_offset`.
    pub prior_rule_counts: Vec<RuleFailureCount>,
    pub sample_limit: usize,
    pub record_id_field: String,
    pub cancel: CancellationToken,
}

impl ProfilingContext {
    /// Creates a context with default engine settings.
    pub fn new(
        job_id: JobId,
        partition_id: PartitionId,
        range: PartitionRange,
        rules: Arc<Vec<Rule>>,
    ) -> Self {
        let defaults = EngineConfig::default();
        Self {
            job_id,
            partition_id,
            range,
            total_records: 0,
            batch_size: defaults.batch_size(),
            memory_limit_mb: 512,
            rules,
            checkpoint_interval: defaults.checkpoint_interval(),
            resume_offset: 0,
            prior_anomaly_count: 0,
            prior_rule_counts: Vec::new(),
            sample_limit: defaults.anomaly_sample_limit(),
            record_id_field: defaults.record_id_field().to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates the context for a persisted partition of `job`.
    pub fn for_partition(
        job: &ProfilingJob,
        partition: &ProfilingPartition,
        rules: Arc<Vec<Rule>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            job_id: job.id,
            partition_id: partition.id,
            range: partition.range.clone(),
            total_records: partition.estimated_records,
            batch_size: config.batch_size(),
            memory_limit_mb: job.memory_limit_mb,
            rules,
            checkpoint_interval: config.checkpoint_interval(),
            resume_offset: 0,
            prior_anomaly_count: 0,
            prior_rule_counts: Vec::new(),
            sample_limit: config.anomaly_sample_limit(),
            record_id_field: config.record_id_field().to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = limit;
        self
    }

    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn with_total_records(mut self, total: u64) -> Self {
        self.total_records = total;
        self
    }

    /// Resume after `offset` records, of which `anomaly_count` were anomalies.
    pub fn with_resume(mut self, offset: u64, anomaly_count: u64) -> Self {
        self.resume_offset = offset;
        self.prior_anomaly_count = anomaly_count;
        self
    }

    /// Resume where `checkpoint` left off, carrying over its rule tallies.
    pub fn resume_from(self, checkpoint: &Checkpoint) -> Self {
        let mut ctx = self.with_resume(checkpoint.offset, checkpoint.anomaly_count);
        ctx.prior_rule_counts = checkpoint.rule_failure_counts.clone();
        ctx
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}
