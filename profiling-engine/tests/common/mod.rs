//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use profiling_engine::error::{ProfilingError, Result};
use profiling_engine::repository::{InMemoryProfilingRepository, ProfilingRepository};
use profiling_engine::rules::RuleDefinition;
use profiling_engine::sources::{DataSource, InMemoryDataSource, RecordStream};
use profiling_engine::types::{
    JobId, PartitionId, PartitionRange, PartitionResult, ProfilingAnomalyPattern, ProfilingJob,
    ProfilingPartition, Record,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

/// Deterministic synthetic transactions.
///
/// Roughly 5% have a null amount, 5% an amount above 1000, 3% a malformed
/// account code and 1% a non-numeric amount.
pub fn synthetic_records(n: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let roll: u32 = rng.random_range(0..100);
            let amount = match roll {
                0..=4 => Value::Null,
                5..=9 => json!(rng.random_range(1001..100_000)),
                10 => json!("n/a"),
                _ => json!(rng.random_range(0..1000)),
            };
            let account = if rng.random_range(0..100) < 3 {
                format!("X{i}")
            } else {
                format!("AC-{:06}", rng.random_range(0..1_000_000))
            };
            json!({
                "id": format!("txn-{i}"),
                "amount": amount,
                "account": account,
                "branch": rng.random_range(0..50),
            })
            .as_object()
            .cloned()
            .unwrap()
        })
        .collect()
}

/// Records whose `amount` is null for every tenth record.
pub fn numbered_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let amount = if i % 10 == 0 { Value::Null } else { json!(i) };
            json!({"id": i, "amount": amount}).as_object().cloned().unwrap()
        })
        .collect()
}

pub fn transaction_rules() -> Vec<RuleDefinition> {
    serde_json::from_value(json!([
        {"id": "amount_present", "name": "amount_present", "category": "completeness",
         "type": "null_check", "field": "amount"},
        {"id": "amount_range", "name": "amount_range", "category": "validity",
         "type": "range", "field": "amount", "min": 0, "max": 1000, "severity": "critical"},
        {"id": "account_format", "name": "account_format", "category": "validity",
         "type": "pattern", "field": "account", "pattern": r"AC-\d{6}", "severity": "low"}
    ]))
    .unwrap()
}

pub fn null_amount_rule() -> Vec<RuleDefinition> {
    serde_json::from_value(json!([
        {"id": "amount_present", "name": "amount_present", "type": "null_check", "field": "amount"}
    ]))
    .unwrap()
}

fn range_start(range: &PartitionRange) -> Option<u64> {
    match range {
        PartitionRange::Id { start, .. } => Some(*start),
        PartitionRange::Date { .. } => None,
    }
}

/// Fails partitions starting at one of `failing_starts` after a few records.
#[derive(Debug)]
pub struct FailingSource {
    inner: InMemoryDataSource,
    failing_starts: Vec<u64>,
}

impl FailingSource {
    pub fn new(records: Vec<Record>, failing_starts: Vec<u64>) -> Self {
        Self {
            inner: InMemoryDataSource::new(records),
            failing_starts,
        }
    }
}

#[async_trait]
impl DataSource for FailingSource {
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream> {
        let stream = self.inner.open(range, offset).await?;
        match range_start(range) {
            Some(start) if self.failing_starts.contains(&start) => Ok(stream
                .take(5)
                .chain(stream::once(async {
                    Err(ProfilingError::data_source("connection reset by peer"))
                }))
                .boxed()),
            _ => Ok(stream),
        }
    }
}

/// Fails any stream once it reaches a given absolute offset.
#[derive(Debug)]
pub struct FailAtOffsetSource {
    inner: InMemoryDataSource,
    fail_at: u64,
}

impl FailAtOffsetSource {
    pub fn new(records: Vec<Record>, fail_at: u64) -> Self {
        Self {
            inner: InMemoryDataSource::new(records),
            fail_at,
        }
    }
}

#[async_trait]
impl DataSource for FailAtOffsetSource {
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream> {
        let stream = self.inner.open(range, offset).await?;
        let remaining = self.fail_at.saturating_sub(offset) as usize;
        Ok(stream
            .take(remaining)
            .chain(stream::once(async {
                Err(ProfilingError::data_source("stream aborted"))
            }))
            .boxed())
    }
}

/// Delays every record and records how many streams are open at once.
#[derive(Debug)]
pub struct SlowSource {
    inner: InMemoryDataSource,
    delay: Duration,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SlowSource {
    pub fn new(records: Vec<Record>, delay: Duration) -> Self {
        Self {
            inner: InMemoryDataSource::new(records),
            delay,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for SlowSource {
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream> {
        let stream = self.inner.open(range, offset).await?;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let guard = ActiveGuard(Arc::clone(&self.active));
        let delay = self.delay;
        Ok(stream
            .then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed())
    }
}

/// Streams a few records of the partition starting at `stalled_start`, then
/// never yields again.
#[derive(Debug)]
pub struct StallingSource {
    inner: InMemoryDataSource,
    stalled_start: u64,
    records_before_stall: usize,
}

impl StallingSource {
    pub fn new(records: Vec<Record>, stalled_start: u64, records_before_stall: usize) -> Self {
        Self {
            inner: InMemoryDataSource::new(records),
            stalled_start,
            records_before_stall,
        }
    }
}

#[async_trait]
impl DataSource for StallingSource {
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream> {
        let stream = self.inner.open(range, offset).await?;
        if range_start(range) == Some(self.stalled_start) {
            Ok(stream
                .take(self.records_before_stall)
                .chain(stream::pending())
                .boxed())
        } else {
            Ok(stream)
        }
    }
}

/// Removes consecutive duplicates from a status history.
pub fn dedup<T: PartialEq + Clone>(history: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in history {
        if out.last() != Some(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Delegates to an in-memory repository but fails the `fail_on`-th
/// `update_job` call (1-based).
pub struct FlakyRepository {
    inner: Arc<InMemoryProfilingRepository>,
    update_job_calls: AtomicUsize,
    fail_on: usize,
}

impl FlakyRepository {
    pub fn new(inner: Arc<InMemoryProfilingRepository>, fail_on: usize) -> Self {
        Self {
            inner,
            update_job_calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl ProfilingRepository for FlakyRepository {
    async fn get_job(&self, job_id: JobId) -> Result<ProfilingJob> {
        self.inner.get_job(job_id).await
    }

    async fn update_job(&self, job: &ProfilingJob) -> Result<()> {
        let call = self.update_job_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(ProfilingError::repository("database unavailable"));
        }
        self.inner.update_job(job).await
    }

    async fn list_partitions(&self, job_id: JobId) -> Result<Vec<ProfilingPartition>> {
        self.inner.list_partitions(job_id).await
    }

    async fn create_partitions(
        &self,
        job_id: JobId,
        partitions: Vec<ProfilingPartition>,
    ) -> Result<Vec<ProfilingPartition>> {
        self.inner.create_partitions(job_id, partitions).await
    }

    async fn update_partition(&self, partition: &ProfilingPartition) -> Result<()> {
        self.inner.update_partition(partition).await
    }

    async fn save_partition_result(&self, result: &PartitionResult) -> Result<()> {
        self.inner.save_partition_result(result).await
    }

    async fn load_partition_result(
        &self,
        partition_id: PartitionId,
    ) -> Result<Option<PartitionResult>> {
        self.inner.load_partition_result(partition_id).await
    }

    async fn save_patterns(
        &self,
        job_id: JobId,
        patterns: &[ProfilingAnomalyPattern],
    ) -> Result<()> {
        self.inner.save_patterns(job_id, patterns).await
    }

    async fn list_patterns(&self, job_id: JobId) -> Result<Vec<ProfilingAnomalyPattern>> {
        self.inner.list_patterns(job_id).await
    }
}
