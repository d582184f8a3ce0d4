//! In-memory repository for tests and single-process runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ProfilingRepository, RuleRepository};
use crate::error::{ProfilingError, Result};
use crate::profiler::AnomalySink;
use crate::rules::RuleDefinition;
use crate::types::{
    AnomalyRecord, JobId, JobStatus, PartitionId, PartitionResult, PartitionStatus,
    ProfilingAnomalyPattern, ProfilingJob, ProfilingPartition,
};

#[derive(Debug, Default)]
struct Store {
    next_job_id: JobId,
    next_partition_id: PartitionId,
    jobs: HashMap<JobId, ProfilingJob>,
    job_history: HashMap<JobId, Vec<JobStatus>>,
    partitions: BTreeMap<PartitionId, ProfilingPartition>,
    partition_history: HashMap<PartitionId, Vec<PartitionStatus>>,
    results: HashMap<PartitionId, PartitionResult>,
    patterns: HashMap<JobId, Vec<ProfilingAnomalyPattern>>,
    rules: HashMap<JobId, Vec<RuleDefinition>>,
    anomalies: HashMap<PartitionId, Vec<AnomalyRecord>>,
}

/// Repository keeping everything in process memory.
///
/// Implements [`ProfilingRepository`], [`RuleRepository`] and [`AnomalySink`].
/// Clones share the same underlying store. Every job and partition update is
/// also appended to a status history, which tests use to check lifecycle
/// transitions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfilingRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryProfilingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new job and returns it with its assigned id.
    pub async fn create_job(&self, mut job: ProfilingJob) -> ProfilingJob {
        let mut store = self.store.write().await;
        store.next_job_id += 1;
        job.id = store.next_job_id;
        store.job_history.insert(job.id, vec![job.status]);
        store.jobs.insert(job.id, job.clone());
        debug!(job_id = job.id, "Created profiling job");
        job
    }

    /// Sets the rule definitions returned by [`RuleRepository::load_rules`].
    pub async fn set_rules(&self, job_id: JobId, rules: Vec<RuleDefinition>) {
        self.store.write().await.rules.insert(job_id, rules);
    }

    /// Every status a job has been persisted with, oldest first.
    pub async fn job_status_history(&self, job_id: JobId) -> Vec<JobStatus> {
        self.store
            .read()
            .await
            .job_history
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every status a partition has been persisted with, oldest first.
    pub async fn partition_status_history(&self, partition_id: PartitionId) -> Vec<PartitionStatus> {
        self.store
            .read()
            .await
            .partition_history
            .get(&partition_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Anomalies flushed for a partition, in flush order.
    pub async fn flushed_anomalies(&self, partition_id: PartitionId) -> Vec<AnomalyRecord> {
        self.store
            .read()
            .await
            .anomalies
            .get(&partition_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RuleRepository for InMemoryProfilingRepository {
    async fn load_rules(&self, job_id: JobId) -> Result<Vec<RuleDefinition>> {
        let store = self.store.read().await;
        if !store.jobs.contains_key(&job_id) {
            return Err(ProfilingError::JobNotFound { job_id });
        }
        Ok(store.rules.get(&job_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ProfilingRepository for InMemoryProfilingRepository {
    async fn get_job(&self, job_id: JobId) -> Result<ProfilingJob> {
        self.store
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(ProfilingError::JobNotFound { job_id })
    }

    async fn update_job(&self, job: &ProfilingJob) -> Result<()> {
        let mut store = self.store.write().await;
        if !store.jobs.contains_key(&job.id) {
            return Err(ProfilingError::JobNotFound { job_id: job.id });
        }
        store.job_history.entry(job.id).or_default().push(job.status);
        store.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn list_partitions(&self, job_id: JobId) -> Result<Vec<ProfilingPartition>> {
        let store = self.store.read().await;
        let mut partitions: Vec<ProfilingPartition> = store
            .partitions
            .values()
            .filter(|p| p.job_id == job_id)
            .cloned()
            .collect();
        partitions.sort_by_key(|p| p.index);
        Ok(partitions)
    }

    async fn create_partitions(
        &self,
        job_id: JobId,
        partitions: Vec<ProfilingPartition>,
    ) -> Result<Vec<ProfilingPartition>> {
        let mut store = self.store.write().await;
        if !store.jobs.contains_key(&job_id) {
            return Err(ProfilingError::JobNotFound { job_id });
        }

        let mut created = Vec::with_capacity(partitions.len());
        for mut partition in partitions {
            store.next_partition_id += 1;
            partition.id = store.next_partition_id;
            partition.job_id = job_id;
            store
                .partition_history
                .insert(partition.id, vec![partition.status]);
            store.partitions.insert(partition.id, partition.clone());
            created.push(partition);
        }
        Ok(created)
    }

    async fn update_partition(&self, partition: &ProfilingPartition) -> Result<()> {
        let mut store = self.store.write().await;
        if !store.partitions.contains_key(&partition.id) {
            return Err(ProfilingError::PartitionNotFound {
                partition_id: partition.id,
            });
        }
        store
            .partition_history
            .entry(partition.id)
            .or_default()
            .push(partition.status);
        store.partitions.insert(partition.id, partition.clone());
        Ok(())
    }

    async fn save_partition_result(&self, result: &PartitionResult) -> Result<()> {
        self.store
            .write()
            .await
            .results
            .insert(result.partition_id, result.clone());
        Ok(())
    }

    async fn load_partition_result(
        &self,
        partition_id: PartitionId,
    ) -> Result<Option<PartitionResult>> {
        Ok(self.store.read().await.results.get(&partition_id).cloned())
    }

    async fn save_patterns(
        &self,
        job_id: JobId,
        patterns: &[ProfilingAnomalyPattern],
    ) -> Result<()> {
        self.store
            .write()
            .await
            .patterns
            .entry(job_id)
            .or_default()
            .extend_from_slice(patterns);
        Ok(())
    }

    async fn list_patterns(&self, job_id: JobId) -> Result<Vec<ProfilingAnomalyPattern>> {
        Ok(self
            .store
            .read()
            .await
            .patterns
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AnomalySink for InMemoryProfilingRepository {
    async fn flush(&self, partition_id: PartitionId, anomalies: &[AnomalyRecord]) -> Result<()> {
        self.store
            .write()
            .await
            .anomalies
            .entry(partition_id)
            .or_default()
            .extend_from_slice(anomalies);
        Ok(())
    }
}
