use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::stream::{self, StreamExt};
use profiling_engine::prelude::*;
use profiling_engine::stats::StatisticsCollector;
use profiling_engine::types::PartitionRange;
use serde_json::json;

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let amount = match i % 20 {
                0 => json!(null),
                1 => json!(5000),
                _ => json!(i % 1000),
            };
            let account = if i % 33 == 0 {
                format!("X{i}")
            } else {
                format!("AC-{:06}", i)
            };
            json!({"id": i, "amount": amount, "account": account, "branch": i % 50})
                .as_object()
                .cloned()
                .unwrap()
        })
        .collect()
}

fn rules() -> Vec<Rule> {
    vec![
        Rule::null_check("amount_present", "amount"),
        Rule::range("amount_range", "amount", Some(0.0), Some(1000.0)).unwrap(),
        Rule::pattern("account_format", "account", r"AC-\d{6}").unwrap(),
    ]
}

fn benchmark_evaluate_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_record");
    let engine = RuleEngine::new();
    let rules = rules();

    for n in [1000, 10_000].iter() {
        let data = records(*n);
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &data, |b, data| {
            b.iter(|| {
                data.iter()
                    .filter(|r| engine.evaluate_record(std::hint::black_box(r), &rules).is_anomaly())
                    .count()
            });
        });
    }

    group.finish();
}

fn benchmark_statistics_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics_update");
    let data = records(10_000);
    group.throughput(Throughput::Elements(data.len() as u64));

    for batch in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| {
                let mut collector = StatisticsCollector::new();
                for chunk in data.chunks(batch) {
                    collector.update(chunk);
                }
                collector.get_summary()
            });
        });
    }

    group.finish();
}

fn benchmark_profile_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile_partition");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let data = records(10_000);
    let compiled = Arc::new(rules());
    group.throughput(Throughput::Elements(data.len() as u64));

    for batch in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| {
                let profiler = StreamingProfiler::new(
                    Arc::new(RuleEngine::new()),
                    Arc::new(InMemoryCheckpointStore::new()),
                    Arc::new(InMemoryProfilingRepository::new()),
                )
                .with_memory_probe(Arc::new(StaticMemoryProbe::from_mb(1)));
                let ctx = ProfilingContext::new(
                    1,
                    1,
                    PartitionRange::Id {
                        start: 0,
                        end: data.len() as u64,
                    },
                    Arc::clone(&compiled),
                )
                .with_batch_size(batch);
                let stream = stream::iter(data.clone().into_iter().map(Ok)).boxed();
                runtime
                    .block_on(profiler.profile_partition(&ctx, stream))
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_evaluate_record,
    benchmark_statistics_update,
    benchmark_profile_partition
);
criterion_main!(benches);
