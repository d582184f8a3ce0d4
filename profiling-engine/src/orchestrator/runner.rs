use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::patterns::PatternAnalyzer;
use super::planner::plan_partitions;
use crate::config::EngineConfig;
use crate::error::{ErrorContext, ProfilingError, Result};
use crate::perf_debug;
use crate::profiler::{
    checkpoint_key, AnomalySink, CheckpointStore, ProfilingContext, StreamingProfiler,
};
use crate::repository::{ProfilingRepository, RuleRepository};
use crate::rules::{Rule, RuleEngine};
use crate::sources::DataSource;
use crate::stats::{MemoryProbe, ProcessMemoryProbe};
use crate::types::{JobId, PartitionResult, PartitionStatus, ProfilingJob, ProfilingPartition};

/// Runs profiling jobs end to end.
///
/// For each job the orchestrator compiles the job's rules, plans (or reuses)
/// its partitions, profiles every unfinished partition as its own tokio task,
/// and aggregates the results into job totals and anomaly patterns. At most
/// `max_concurrent_partitions` partitions scan at once.
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use profiling_engine::prelude::*;
///
/// # async fn example(records: Vec<Record>) -> Result<()> {
/// let repo = Arc::new(InMemoryProfilingRepository::new());
/// let job = repo.create_job(ProfilingJob::new("accounts", records.len() as u64, 4)).await;
///
/// let orchestrator = ProfilingOrchestrator::new(
///     repo.clone(),
///     repo.clone(),
///     Arc::new(InMemoryDataSource::new(records)),
///     Arc::new(InMemoryCheckpointStore::new()),
///     repo.clone(),
/// );
/// let job = orchestrator.execute_job(job.id).await?;
/// println!("{} anomalies in {} records", job.anomalies_found, job.records_processed);
/// # Ok(())
/// # }
/// ```
pub struct ProfilingOrchestrator {
    repository: Arc<dyn ProfilingRepository>,
    rules: Arc<dyn RuleRepository>,
    source: Arc<dyn DataSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn AnomalySink>,
    engine: RuleEngine,
    memory_probe: Arc<dyn MemoryProbe>,
    config: EngineConfig,
}

impl ProfilingOrchestrator {
    pub fn new(
        repository: Arc<dyn ProfilingRepository>,
        rules: Arc<dyn RuleRepository>,
        source: Arc<dyn DataSource>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn AnomalySink>,
    ) -> Self {
        Self {
            repository,
            rules,
            source,
            checkpoints,
            sink,
            engine: RuleEngine::new(),
            memory_probe: Arc::new(ProcessMemoryProbe),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `engine` for its custom evaluators. The error policy and log
    /// settings always come from the engine config.
    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs a job to completion and returns its final state.
    ///
    /// A job whose partitions all fail is returned as `failed` rather than as
    /// an error. Setup failures (unknown job, invalid state, invalid rules or
    /// partitioning) and repository failures are returned as errors.
    pub async fn execute_job(&self, job_id: JobId) -> Result<ProfilingJob> {
        self.execute_job_with_cancellation(job_id, CancellationToken::new())
            .await
    }

    /// Like [`execute_job`](Self::execute_job), stopping early when `cancel`
    /// fires.
    ///
    /// On cancellation every unfinished partition is marked failed, the job is
    /// marked failed, and [`ProfilingError::Cancelled`] is returned.
    #[instrument(skip(self, cancel))]
    pub async fn execute_job_with_cancellation(
        &self,
        job_id: JobId,
        cancel: CancellationToken,
    ) -> Result<ProfilingJob> {
        self.config.validate()?;

        let mut job = self.repository.get_job(job_id).await?;
        if !job.status.is_executable() {
            return Err(ProfilingError::InvalidJobState {
                job_id,
                status: job.status,
            });
        }

        match self.run_job(&mut job, &cancel).await {
            Ok(()) => Ok(job),
            Err(e) => Err(self.fail_job(&mut job, e).await),
        }
    }

    /// Runs every stage of a job. Any error returned from here fails the job;
    /// by then no partition task is left running.
    async fn run_job(&self, job: &mut ProfilingJob, cancel: &CancellationToken) -> Result<()> {
        let rules = Arc::new(self.load_rules(job.id).await?);
        let partitions = self.prepare_partitions(job).await?;

        job.mark_running();
        self.repository.update_job(job).await?;
        info!(
            partitions = partitions.len(),
            rules = rules.len(),
            "Profiling job started"
        );

        let total = partitions.len();
        let mut resolved = 0usize;
        let mut results: Vec<PartitionResult> = Vec::with_capacity(total);
        let mut completed: Vec<ProfilingPartition> = Vec::with_capacity(total);
        let mut to_run = Vec::new();

        for partition in partitions {
            if partition.status == PartitionStatus::Completed {
                if let Some(result) = self.repository.load_partition_result(partition.id).await? {
                    resolved += 1;
                    results.push(result);
                    completed.push(partition);
                    continue;
                }
            }
            to_run.push(partition);
        }
        if resolved > 0 {
            info!(reused = resolved, "Reusing completed partitions");
            job.progress_percent = progress(resolved, total);
            self.repository.update_job(job).await?;
        }

        let run_token = cancel.child_token();
        let profiler = Arc::new(self.build_profiler());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_partitions()));
        let mut tasks = FuturesUnordered::new();

        for partition in to_run {
            let ctx = ProfilingContext::for_partition(job, &partition, Arc::clone(&rules), &self.config)
                .with_cancellation(run_token.clone());
            let original = partition.clone();
            perf_debug!(
                self.config.log_config(),
                partition_id = partition.id,
                index = partition.index,
                "Spawning partition task"
            );

            let task = PartitionTask {
                partition,
                ctx,
                repository: Arc::clone(&self.repository),
                source: Arc::clone(&self.source),
                checkpoints: Arc::clone(&self.checkpoints),
                profiler: Arc::clone(&profiler),
                semaphore: Arc::clone(&semaphore),
                timeout: self.config.partition_timeout(),
            };
            let handle = tokio::spawn(task.run());
            tasks.push(async move { (original, handle.await) });
        }

        let mut failed = 0usize;
        while let Some((original, joined)) = tasks.next().await {
            resolved += 1;

            let (mut partition, outcome) = task_output(original, joined);
            if let Err(e) = self
                .record_outcome(&mut partition, outcome, &mut results)
                .await
            {
                self.mark_aborted(&mut partition, &e).await;
                self.abort_run(&e, &run_token, &mut tasks).await;
                return Err(e);
            }
            match partition.status {
                PartitionStatus::Completed => completed.push(partition),
                _ => failed += 1,
            }

            job.progress_percent = progress(resolved, total);
            if let Err(e) = self.repository.update_job(job).await {
                self.abort_run(&e, &run_token, &mut tasks).await;
                return Err(e);
            }
        }

        if cancel.is_cancelled() && failed > 0 {
            warn!(failed, "Profiling job cancelled");
            return Err(ProfilingError::Cancelled);
        }

        if completed.is_empty() && total > 0 {
            warn!(partitions = total, "All partitions failed");
            job.mark_failed(format!("All {total} partitions failed"));
            self.repository.update_job(job).await?;
            return Ok(());
        }

        job.records_processed = completed.iter().map(|p| p.records_processed).sum();
        job.anomalies_found = completed.iter().map(|p| p.anomaly_count).sum();

        let patterns = PatternAnalyzer::new()
            .with_min_occurrences(self.config.pattern_min_occurrences())
            .with_max_sample_ids(self.config.pattern_sample_ids())
            .analyze(job.id, &results, job.records_processed);
        if !patterns.is_empty() {
            self.repository
                .save_patterns(job.id, &patterns)
                .await
                .context("Failed to persist anomaly patterns")?;
        }

        job.mark_completed();
        self.repository.update_job(job).await?;
        info!(
            records = job.records_processed,
            anomalies = job.anomalies_found,
            patterns = patterns.len(),
            failed_partitions = failed,
            "Profiling job completed"
        );
        Ok(())
    }

    /// Cancels the remaining partition tasks after a job-level error and waits
    /// for all of them.
    ///
    /// Partitions that still finish on their own are recorded as usual; the
    /// rest are marked failed with `error`.
    async fn abort_run<F>(
        &self,
        error: &ProfilingError,
        run_token: &CancellationToken,
        tasks: &mut FuturesUnordered<F>,
    ) where
        F: Future<Output = (ProfilingPartition, std::result::Result<TaskOutput, JoinError>)>,
    {
        run_token.cancel();
        warn!(remaining = tasks.len(), error = %error, "Aborting profiling run");

        let mut discarded = Vec::new();
        while let Some((original, joined)) = tasks.next().await {
            let (mut partition, outcome) = task_output(original, joined);
            let recorded = match outcome {
                Err(ProfilingError::Cancelled) => false,
                outcome => self
                    .record_outcome(&mut partition, outcome, &mut discarded)
                    .await
                    .is_ok(),
            };
            if !recorded {
                self.mark_aborted(&mut partition, error).await;
            }
        }
    }

    async fn mark_aborted(&self, partition: &mut ProfilingPartition, error: &ProfilingError) {
        partition.mark_failed(format!("Job aborted: {error}"));
        if let Err(e) = self.repository.update_partition(partition).await {
            warn!(partition_id = partition.id, error = %e, "Failed to persist aborted partition");
        }
    }

    async fn load_rules(&self, job_id: JobId) -> Result<Vec<Rule>> {
        let definitions = self.rules.load_rules(job_id).await?;
        self.engine.compile_rules(&definitions)
    }

    /// Returns the job's existing partitions, or plans and persists new ones.
    async fn prepare_partitions(&self, job: &ProfilingJob) -> Result<Vec<ProfilingPartition>> {
        let existing = self.repository.list_partitions(job.id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let planned = plan_partitions(job)?
            .into_iter()
            .map(|plan| ProfilingPartition::from_plan(job.id, plan))
            .collect();
        self.repository.create_partitions(job.id, planned).await
    }

    fn build_profiler(&self) -> StreamingProfiler {
        let engine = self
            .engine
            .clone()
            .with_error_policy(self.config.rule_error_policy())
            .with_log_config(self.config.log_config().clone());

        StreamingProfiler::new(
            Arc::new(engine),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.sink),
        )
        .with_memory_probe(Arc::clone(&self.memory_probe))
        .with_checkpoint_ttl(self.config.checkpoint_ttl())
        .with_near_limit_ratio(self.config.memory_near_limit_ratio())
        .with_log_config(self.config.log_config().clone())
    }

    /// Persists the outcome of one partition task.
    ///
    /// Errors returned from here are job-level; partition failures are
    /// recorded on the partition instead.
    async fn record_outcome(
        &self,
        partition: &mut ProfilingPartition,
        outcome: Result<PartitionResult>,
        results: &mut Vec<PartitionResult>,
    ) -> Result<()> {
        match outcome {
            Ok(result) => {
                self.repository.save_partition_result(&result).await?;
                partition.mark_completed(
                    partition.resumed_from + result.records_evaluated,
                    partition.anomaly_count + result.anomaly_count,
                );
                self.repository.update_partition(partition).await?;

                if let Err(e) = self.checkpoints.delete(&checkpoint_key(partition.id)).await {
                    warn!(partition_id = partition.id, error = %e, "Failed to delete checkpoint");
                }
                info!(
                    partition_id = partition.id,
                    records = partition.records_processed,
                    anomalies = partition.anomaly_count,
                    "Partition completed"
                );
                results.push(result);
                Ok(())
            }
            Err(e) if e.is_partition_scoped() || matches!(e, ProfilingError::Cancelled) => {
                warn!(partition_id = partition.id, error = %e, "Partition failed");
                partition.mark_failed(e.to_string());
                self.repository.update_partition(partition).await
            }
            Err(e) => Err(e),
        }
    }

    /// Marks the job failed with `error` and returns the error.
    async fn fail_job(&self, job: &mut ProfilingJob, error: ProfilingError) -> ProfilingError {
        warn!(job_id = job.id, error = %error, "Profiling job failed");
        job.mark_failed(error.to_string());
        if let Err(e) = self.repository.update_job(job).await {
            warn!(job_id = job.id, error = %e, "Failed to persist job failure");
        }
        error
    }
}

/// What a partition task hands back: the partition and its run outcome.
type TaskOutput = (ProfilingPartition, Result<PartitionResult>);

/// Resolves a joined task, turning a panic into a failure of `original`.
fn task_output(
    original: ProfilingPartition,
    joined: std::result::Result<TaskOutput, JoinError>,
) -> TaskOutput {
    match joined {
        Ok(output) => output,
        Err(join_error) => {
            let partition_id = original.id;
            (
                original,
                Err(ProfilingError::TaskPanicked {
                    partition_id,
                    message: join_error.to_string(),
                }),
            )
        }
    }
}

fn progress(resolved: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        resolved as f64 / total as f64 * 100.0
    }
}

/// One partition's work, moved into its own tokio task.
struct PartitionTask {
    partition: ProfilingPartition,
    ctx: ProfilingContext,
    repository: Arc<dyn ProfilingRepository>,
    source: Arc<dyn DataSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    profiler: Arc<StreamingProfiler>,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl PartitionTask {
    async fn run(mut self) -> TaskOutput {
        let outcome = self.execute().await;
        (self.partition, outcome)
    }

    async fn execute(&mut self) -> Result<PartitionResult> {
        let _permit = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => return Err(ProfilingError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map_err(|_| ProfilingError::Internal("Partition semaphore closed".to_string()))?,
        };

        let key = checkpoint_key(self.partition.id);
        let ctx = match self.checkpoints.get(&key).await? {
            Some(checkpoint) => {
                info!(
                    partition_id = self.partition.id,
                    offset = checkpoint.offset,
                    "Resuming partition from checkpoint"
                );
                self.ctx.clone().resume_from(&checkpoint)
            }
            None => self.ctx.clone(),
        };
        let offset = ctx.resume_offset;

        self.partition.mark_running(offset, ctx.prior_anomaly_count);
        self.repository.update_partition(&self.partition).await?;

        let partition_id = self.partition.id;
        let scan = async {
            let stream = self.source.open(&ctx.range, offset).await?;
            self.profiler.profile_partition(&ctx, stream).await
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, scan)
                .await
                .map_err(|_| ProfilingError::Timeout {
                    partition_id,
                    elapsed: limit,
                })?,
            None => scan.await,
        }
    }
}
