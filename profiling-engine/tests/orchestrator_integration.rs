//! End-to-end tests for job orchestration.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use profiling_engine::prelude::*;
use profiling_engine::profiler::checkpoint_key;
use profiling_engine::rules::RuleOutcome;
use profiling_engine::sources::DataSource;
use profiling_engine::types::{PartitionRange, PartitionStatus};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use common::{
    dedup, null_amount_rule, numbered_records, synthetic_records, transaction_rules,
    FailingSource, FlakyRepository, SlowSource, StallingSource,
};

struct Harness {
    repo: Arc<InMemoryProfilingRepository>,
    checkpoints: Arc<InMemoryCheckpointStore>,
    job_id: u64,
}

impl Harness {
    async fn new(job: ProfilingJob, rules: Vec<RuleDefinition>) -> Self {
        let repo = Arc::new(InMemoryProfilingRepository::new());
        let job = repo.create_job(job).await;
        repo.set_rules(job.id, rules).await;
        Self {
            repo,
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            job_id: job.id,
        }
    }

    fn orchestrator(&self, source: Arc<dyn DataSource>, config: EngineConfig) -> ProfilingOrchestrator {
        ProfilingOrchestrator::new(
            self.repo.clone(),
            self.repo.clone(),
            source,
            self.checkpoints.clone(),
            self.repo.clone(),
        )
        .with_memory_probe(Arc::new(StaticMemoryProbe::from_mb(16)))
        .with_config(config)
    }

    async fn partition(&self, index: u32) -> ProfilingPartition {
        self.repo
            .list_partitions(self.job_id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.index == index)
            .unwrap()
    }
}

fn config() -> EngineConfig {
    EngineConfig::new()
        .with_batch_size(50)
        .with_max_concurrent_partitions(4)
}

#[tokio::test]
async fn test_single_partition_failure_keeps_job_completed() {
    let harness = Harness::new(ProfilingJob::new("ledger", 1000, 4), null_amount_rule()).await;
    let source = Arc::new(FailingSource::new(numbered_records(1000), vec![500]));

    let job = harness
        .orchestrator(source, config())
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 750);
    assert_eq!(job.anomalies_found, 75);
    assert_eq!(job.progress_percent, 100.0);

    let failed = harness.partition(2).await;
    assert_eq!(failed.status, PartitionStatus::Failed);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("connection reset"));
    for index in [0, 1, 3] {
        assert_eq!(
            harness.partition(index).await.status,
            PartitionStatus::Completed,
            "partition {index}"
        );
    }
}

#[tokio::test]
async fn test_repository_failure_mid_run_fails_job_and_partitions() {
    let inner = Arc::new(InMemoryProfilingRepository::new());
    let job = inner.create_job(ProfilingJob::new("ledger", 400, 4)).await;
    inner.set_rules(job.id, null_amount_rule()).await;

    // Call 1 marks the job running; call 2 is the progress update after the
    // first partition completes.
    let repo = Arc::new(FlakyRepository::new(inner.clone(), 2));
    let source = Arc::new(SlowSource::new(numbered_records(400), Duration::from_millis(1)));
    let orchestrator = ProfilingOrchestrator::new(
        repo,
        inner.clone(),
        source,
        Arc::new(InMemoryCheckpointStore::new()),
        inner.clone(),
    )
    .with_memory_probe(Arc::new(StaticMemoryProbe::from_mb(16)))
    .with_config(
        EngineConfig::new()
            .with_batch_size(10)
            .with_max_concurrent_partitions(1),
    );

    let err = orchestrator.execute_job(job.id).await.unwrap_err();
    assert!(matches!(err, ProfilingError::Repository(_)), "{err}");

    let stored = inner.get_job(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .contains("database unavailable"));

    let partitions = inner.list_partitions(job.id).await.unwrap();
    assert_eq!(partitions[0].status, PartitionStatus::Completed);
    for partition in &partitions[1..] {
        assert_eq!(partition.status, PartitionStatus::Failed, "partition {}", partition.index);
        assert!(partition
            .error_message
            .as_deref()
            .unwrap()
            .contains("Job aborted"));
    }
}

#[tokio::test]
async fn test_corrupt_json_line_fails_only_its_partition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let lines: Vec<String> = numbered_records(400)
        .iter()
        .enumerate()
        .map(|(i, record)| {
            if i == 50 {
                "{\"id\": 50, \"amount\":".to_string()
            } else {
                serde_json::to_string(record).unwrap()
            }
        })
        .collect();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let harness = Harness::new(ProfilingJob::new("ledger", 400, 4), null_amount_rule()).await;
    let job = harness
        .orchestrator(Arc::new(JsonLinesSource::new(&path)), config())
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 300);
    assert_eq!(job.anomalies_found, 30);
    assert_eq!(harness.partition(0).await.status, PartitionStatus::Failed);
    for index in [1, 2, 3] {
        assert_eq!(
            harness.partition(index).await.status,
            PartitionStatus::Completed,
            "partition {index}"
        );
    }
}

#[tokio::test]
async fn test_all_partitions_failing_fails_job() {
    let harness = Harness::new(ProfilingJob::new("ledger", 1000, 4), null_amount_rule()).await;
    let source = Arc::new(FailingSource::new(
        numbered_records(1000),
        vec![0, 250, 500, 750],
    ));

    let job = harness
        .orchestrator(source, config())
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("All 4 partitions failed"));
    assert!(harness.repo.list_patterns(harness.job_id).await.unwrap().is_empty());
    assert_eq!(
        dedup(&harness.repo.job_status_history(harness.job_id).await),
        vec![JobStatus::Pending, JobStatus::Running, JobStatus::Failed]
    );
}

#[tokio::test]
async fn test_partition_timeout() {
    let harness = Harness::new(ProfilingJob::new("ledger", 200, 2), null_amount_rule()).await;
    let source = Arc::new(SlowSource::new(numbered_records(200), Duration::from_millis(5)));

    let job = harness
        .orchestrator(source, config().with_partition_timeout(Duration::from_millis(50)))
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    let partition = harness.partition(0).await;
    assert_eq!(partition.status, PartitionStatus::Failed);
    assert!(partition.error_message.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_rerun_reuses_completed_and_resumes_from_checkpoint() {
    let harness = Harness::new(ProfilingJob::new("ledger", 1000, 4), null_amount_rule()).await;
    let run_config = config()
        .with_batch_size(10)
        .with_checkpoint_interval(100)
        .with_max_concurrent_partitions(1);

    // The second partition stalls after 150 records, past its first checkpoint.
    let stalling = Arc::new(StallingSource::new(numbered_records(1000), 250, 150));
    let orchestrator = harness.orchestrator(stalling, run_config.clone());
    let cancel = CancellationToken::new();

    let canceller = async {
        loop {
            let partitions = harness.repo.list_partitions(harness.job_id).await.unwrap();
            if let Some(second) = partitions.iter().find(|p| p.index == 1) {
                let key = checkpoint_key(second.id);
                if harness.checkpoints.get(&key).await.unwrap().is_some() {
                    cancel.cancel();
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let (first_run, ()) = tokio::join!(
        orchestrator.execute_job_with_cancellation(harness.job_id, cancel.clone()),
        canceller
    );
    assert!(matches!(first_run, Err(ProfilingError::Cancelled)));
    assert_eq!(
        harness.repo.get_job(harness.job_id).await.unwrap().status,
        JobStatus::Failed
    );

    let first = harness.partition(0).await;
    let second = harness.partition(1).await;
    assert_eq!(first.status, PartitionStatus::Completed);
    assert_eq!(second.status, PartitionStatus::Failed);

    // Rerun with a healthy source against the same repository and checkpoints.
    let healthy = Arc::new(InMemoryDataSource::new(numbered_records(1000)));
    let job = harness
        .orchestrator(healthy, run_config)
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 1000);
    assert_eq!(job.anomalies_found, 100);

    assert_eq!(
        dedup(&harness.repo.partition_status_history(first.id).await),
        vec![
            PartitionStatus::Pending,
            PartitionStatus::Running,
            PartitionStatus::Completed
        ]
    );
    assert_eq!(
        dedup(&harness.repo.partition_status_history(second.id).await),
        vec![
            PartitionStatus::Pending,
            PartitionStatus::Running,
            PartitionStatus::Failed,
            PartitionStatus::Running,
            PartitionStatus::Completed
        ]
    );

    let resumed = harness.partition(1).await;
    assert_eq!(resumed.resumed_from, 100);
    assert_eq!(resumed.records_processed, 250);
    assert_eq!(resumed.anomaly_count, 25);
    let stored = harness
        .repo
        .load_partition_result(resumed.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.resumed_from, 100);
    assert_eq!(stored.records_evaluated, 150);
    assert!(harness.checkpoints.is_empty().await);

    // Tallies from before the checkpoint count towards the pattern.
    let patterns = harness.repo.list_patterns(harness.job_id).await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].occurrence_count, job.anomalies_found);
    assert!((patterns[0].occurrence_percentage - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_panicking_evaluator_fails_only_its_partition() {
    let rules: Vec<RuleDefinition> = serde_json::from_value(json!([
        {"id": "fragile", "name": "fragile", "type": "custom", "field": "amount", "evaluator": "fragile"}
    ]))
    .unwrap();
    let harness = Harness::new(ProfilingJob::new("ledger", 1000, 4), rules).await;

    let engine = RuleEngine::new().with_custom_evaluator(
        "fragile",
        |_field: &str, record: &Record, _params: &Value| -> Result<RuleOutcome> {
            if record.get("id") == Some(&json!(600)) {
                panic!("evaluator blew up");
            }
            Ok(RuleOutcome::Pass)
        },
    );
    let job = harness
        .orchestrator(
            Arc::new(InMemoryDataSource::new(numbered_records(1000))),
            config(),
        )
        .with_rule_engine(engine)
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 750);
    let panicked = harness.partition(2).await;
    assert_eq!(panicked.status, PartitionStatus::Failed);
    assert!(panicked
        .error_message
        .as_deref()
        .unwrap()
        .contains("task panicked"));
}

#[tokio::test]
async fn test_patterns_and_lifecycle_are_persisted() {
    let harness = Harness::new(ProfilingJob::new("transactions", 4000, 4), transaction_rules()).await;
    let job = harness
        .orchestrator(
            Arc::new(InMemoryDataSource::new(synthetic_records(4000, 21))),
            config().with_checkpoint_interval(500),
        )
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 4000);
    assert!(job.anomalies_found > 0);

    let patterns = harness.repo.list_patterns(harness.job_id).await.unwrap();
    assert!(!patterns.is_empty());
    assert!(patterns.iter().all(|p| p.occurrence_count >= 10));
    assert!(patterns
        .windows(2)
        .all(|w| w[0].sampling_priority >= w[1].sampling_priority));
    assert!(patterns.iter().all(|p| p.sample_record_ids.len() <= 10));

    assert_eq!(
        dedup(&harness.repo.job_status_history(harness.job_id).await),
        vec![JobStatus::Pending, JobStatus::Running, JobStatus::Completed]
    );
    for partition in harness.repo.list_partitions(harness.job_id).await.unwrap() {
        assert_eq!(
            dedup(&harness.repo.partition_status_history(partition.id).await),
            vec![
                PartitionStatus::Pending,
                PartitionStatus::Running,
                PartitionStatus::Completed
            ]
        );
    }
    // Checkpoints are removed once their partition completes.
    assert!(harness.checkpoints.is_empty().await);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let harness = Harness::new(ProfilingJob::new("ledger", 60, 6), null_amount_rule()).await;
    let source = Arc::new(SlowSource::new(numbered_records(60), Duration::from_millis(2)));

    let job = harness
        .orchestrator(source.clone(), config().with_max_concurrent_partitions(2))
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 60);
    assert!(source.max_active() >= 1);
    assert!(source.max_active() <= 2);
}

#[tokio::test]
async fn test_date_partitioned_job() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = start + chrono::Duration::hours(89);
    let records: Vec<Record> = (0..90)
        .map(|i| {
            let created_at = start + chrono::Duration::hours(i);
            json!({"id": i, "amount": if i % 3 == 0 { Value::Null } else { json!(i) },
                   "created_at": created_at.to_rfc3339()})
            .as_object()
            .cloned()
            .unwrap()
        })
        .collect();

    let harness = Harness::new(
        ProfilingJob::new("daily", 90, 3).with_date_range(start, end),
        null_amount_rule(),
    )
    .await;
    let job = harness
        .orchestrator(Arc::new(InMemoryDataSource::new(records)), config())
        .execute_job(harness.job_id)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 90);
    assert_eq!(job.anomalies_found, 30);

    let partitions = harness.repo.list_partitions(harness.job_id).await.unwrap();
    assert_eq!(partitions.len(), 3);
    assert!(partitions
        .iter()
        .all(|p| matches!(p.range, PartitionRange::Date { .. })));
}

#[tokio::test]
async fn test_rule_error_policy_from_config() {
    let rules: Vec<RuleDefinition> = serde_json::from_value(json!([
        {"id": "even_only", "name": "even_only", "type": "custom", "field": "amount", "evaluator": "even_only"}
    ]))
    .unwrap();
    let engine = || {
        RuleEngine::new().with_custom_evaluator(
            "even_only",
            |_field: &str, record: &Record, _params: &Value| -> Result<RuleOutcome> {
                match record.get("amount").and_then(Value::as_u64) {
                    Some(n) if n % 2 == 0 => Ok(RuleOutcome::Pass),
                    _ => Err(ProfilingError::rule_evaluation("even_only", "cannot evaluate")),
                }
            },
        )
    };

    // 1, 3, 5, 7, 9 and the null at 0 raise evaluation errors.
    let run = |policy: RuleErrorPolicy| {
        let rules = rules.clone();
        async move {
            let harness = Harness::new(ProfilingJob::new("ledger", 10, 1), rules).await;
            harness
                .orchestrator(
                    Arc::new(InMemoryDataSource::new(numbered_records(10))),
                    config().with_rule_error_policy(policy),
                )
                .with_rule_engine(engine())
                .execute_job(harness.job_id)
                .await
                .unwrap()
        }
    };

    assert_eq!(run(RuleErrorPolicy::TreatAsPass).await.anomalies_found, 0);
    assert_eq!(run(RuleErrorPolicy::TreatAsAnomaly).await.anomalies_found, 6);
}
