use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, instrument};

use super::checkpoint::{checkpoint_key, Checkpoint, CheckpointStore};
use super::context::ProfilingContext;
use super::sink::{AnomalyBuffer, AnomalySink};
use crate::error::{ProfilingError, Result};
use crate::log_storage_op;
use crate::logging::LogConfig;
use crate::rules::RuleEngine;
use crate::sources::RecordStream;
use crate::stats::{MemoryProbe, MemoryTracker, ProcessMemoryProbe, StatisticsCollector};
use crate::types::{
    record_identifier, AnomalyRecord, PartitionResult, Record, RuleFailureCount, RuleKey,
};

/// Mutable state of one partition run.
struct RunState {
    offset: u64,
    evaluated: u64,
    passed: u64,
    failed: u64,
    anomaly_count: u64,
    sample: Vec<AnomalyRecord>,
    buffer: AnomalyBuffer,
    rule_counts: BTreeMap<RuleKey, u64>,
    stats: StatisticsCollector,
    checkpoints_written: u64,
    flush_count: u64,
    anomalies_flushed: u64,
}

impl RunState {
    fn new(ctx: &ProfilingContext) -> Self {
        Self {
            offset: ctx.resume_offset,
            evaluated: 0,
            passed: 0,
            failed: 0,
            anomaly_count: 0,
            sample: Vec::with_capacity(ctx.sample_limit.min(1024)),
            buffer: AnomalyBuffer::new(),
            rule_counts: ctx
                .prior_rule_counts
                .iter()
                .map(|tally| (tally.key(), tally.count))
                .collect(),
            stats: StatisticsCollector::new(),
            checkpoints_written: 0,
            flush_count: 0,
            anomalies_flushed: 0,
        }
    }
}

/// Profiles one partition from a lazy record stream.
///
/// Records are pulled in batches. Every record is evaluated by the rule
/// engine; field statistics are updated per batch. A checkpoint is written
/// each time the absolute offset reaches a multiple of the checkpoint
/// interval, after the anomaly buffer has been flushed, so the sink always
/// holds every anomaly before the checkpointed offset. When the process nears
/// the partition's memory ceiling after a batch, the buffer is flushed early.
pub struct StreamingProfiler {
    engine: Arc<RuleEngine>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn AnomalySink>,
    memory_probe: Arc<dyn MemoryProbe>,
    checkpoint_ttl: Duration,
    near_limit_ratio: f64,
    log_config: LogConfig,
}

impl StreamingProfiler {
    pub fn new(
        engine: Arc<RuleEngine>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn AnomalySink>,
    ) -> Self {
        Self {
            engine,
            checkpoints,
            sink,
            memory_probe: Arc::new(ProcessMemoryProbe),
            checkpoint_ttl: Duration::from_secs(24 * 60 * 60),
            near_limit_ratio: crate::stats::DEFAULT_NEAR_LIMIT_RATIO,
            log_config: LogConfig::default(),
        }
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn with_checkpoint_ttl(mut self, ttl: Duration) -> Self {
        self.checkpoint_ttl = ttl;
        self
    }

    pub fn with_near_limit_ratio(mut self, ratio: f64) -> Self {
        self.near_limit_ratio = ratio;
        self
    }

    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Consumes `stream` and returns the partition result.
    ///
    /// Stream errors, checkpoint errors and sink errors end the run and are
    /// returned as-is. Cancellation through `ctx.cancel` returns
    /// [`ProfilingError::Cancelled`].
    #[instrument(skip(self, ctx, stream), fields(job_id = ctx.job_id, partition_id = ctx.partition_id))]
    pub async fn profile_partition(
        &self,
        ctx: &ProfilingContext,
        mut stream: RecordStream,
    ) -> Result<PartitionResult> {
        let started = Instant::now();
        let tracker = MemoryTracker::new(Arc::clone(&self.memory_probe))
            .with_near_limit_ratio(self.near_limit_ratio);
        tracker.get_current_usage();

        let batch_size = ctx.batch_size.max(1);
        let mut state = RunState::new(ctx);
        let mut batch: Vec<Record> = Vec::with_capacity(batch_size);

        debug!(resume_offset = ctx.resume_offset, batch_size, "Starting partition scan");

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(ProfilingError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(record)) => {
                    batch.push(record);
                    if batch.len() >= batch_size {
                        self.process_batch(ctx, &mut state, &mut batch, &tracker).await?;
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        if !batch.is_empty() {
            self.process_batch(ctx, &mut state, &mut batch, &tracker).await?;
        }

        self.flush(ctx, &mut state).await?;

        let execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            records = state.evaluated,
            anomalies = state.anomaly_count,
            execution_time_ms,
            "Partition scan complete"
        );

        Ok(PartitionResult {
            job_id: ctx.job_id,
            partition_id: ctx.partition_id,
            records_evaluated: state.evaluated,
            records_passed: state.passed,
            records_failed: state.failed,
            anomalies: state.sample,
            anomaly_count: state.anomaly_count,
            rule_failure_counts: tallies(&state.rule_counts),
            field_statistics: state.stats.get_summary(),
            execution_time_ms,
            peak_memory_mb: tracker.peak_usage_mb(),
            checkpoints_written: state.checkpoints_written,
            flush_count: state.flush_count,
            anomalies_flushed: state.anomalies_flushed,
            resumed_from: ctx.resume_offset,
        })
    }

    async fn process_batch(
        &self,
        ctx: &ProfilingContext,
        state: &mut RunState,
        batch: &mut Vec<Record>,
        tracker: &MemoryTracker,
    ) -> Result<()> {
        for record in batch.iter() {
            let position = state.offset;
            state.offset += 1;
            state.evaluated += 1;

            let evaluation = self.engine.evaluate_record(record, &ctx.rules);
            match evaluation.severity {
                Some(severity) => {
                    state.failed += 1;
                    state.anomaly_count += 1;
                    for failure in &evaluation.failures {
                        *state
                            .rule_counts
                            .entry(RuleKey::new(&failure.rule_category, &failure.rule_name))
                            .or_insert(0) += 1;
                    }

                    let anomaly = AnomalyRecord {
                        job_id: ctx.job_id,
                        partition_id: ctx.partition_id,
                        offset: position,
                        record_id: record_identifier(record, &ctx.record_id_field, position),
                        severity,
                        failures: evaluation.failures,
                        record: record.clone(),
                        detected_at: Utc::now(),
                    };
                    if state.sample.len() < ctx.sample_limit {
                        state.sample.push(anomaly.clone());
                    }
                    state.buffer.push(anomaly);
                }
                None => state.passed += 1,
            }

            if state.offset % ctx.checkpoint_interval.max(1) == 0 {
                self.write_checkpoint(ctx, state).await?;
            }
        }

        state.stats.update(batch);
        batch.clear();

        if self.log_config.log_batch_progress {
            debug!(
                records = state.evaluated,
                anomalies = state.anomaly_count,
                buffered = state.buffer.len(),
                "Batch processed"
            );
        }

        if tracker.is_near_limit(ctx.memory_limit_mb) {
            log_storage_op!(
                self.log_config,
                buffered = state.buffer.len(),
                memory_mb = tracker.get_current_usage() / (1024 * 1024),
                limit_mb = ctx.memory_limit_mb,
                "Memory near limit, flushing anomaly buffer"
            );
            self.flush(ctx, state).await?;
            state.flush_count += 1;
        }

        Ok(())
    }

    async fn write_checkpoint(&self, ctx: &ProfilingContext, state: &mut RunState) -> Result<()> {
        self.flush(ctx, state).await?;

        let checkpoint = Checkpoint::new(
            state.offset,
            ctx.prior_anomaly_count + state.anomaly_count,
        )
        .with_rule_failure_counts(tallies(&state.rule_counts));
        self.checkpoints
            .set(&checkpoint_key(ctx.partition_id), &checkpoint, self.checkpoint_ttl)
            .await?;
        state.checkpoints_written += 1;

        log_storage_op!(self.log_config, offset = state.offset, "Checkpoint written");
        Ok(())
    }

    async fn flush(&self, ctx: &ProfilingContext, state: &mut RunState) -> Result<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        let drained = state.buffer.take();
        self.sink.flush(ctx.partition_id, &drained).await?;
        state.anomalies_flushed += drained.len() as u64;
        Ok(())
    }
}

fn tallies(counts: &BTreeMap<RuleKey, u64>) -> Vec<RuleFailureCount> {
    counts
        .iter()
        .map(|(key, &count)| RuleFailureCount {
            category: key.category.clone(),
            name: key.name.clone(),
            count,
        })
        .collect()
}
