//! # Profiling Engine - Streaming Data-Quality Profiling
//!
//! The profiling engine scans very large record sets partition by partition,
//! evaluates every record against data-quality rules, keeps bounded per-field
//! statistics, and reports anomaly patterns that a downstream sampling step
//! uses to choose which records to test.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use profiling_engine::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let records: Vec<Record> = (0..100)
//!     .map(|i| {
//!         let amount = if i % 4 == 0 { json!(null) } else { json!(i * 10) };
//!         json!({"id": i, "amount": amount}).as_object().cloned().unwrap()
//!     })
//!     .collect();
//!
//! let repo = Arc::new(InMemoryProfilingRepository::new());
//! let job = repo.create_job(ProfilingJob::new("transactions", 100, 4)).await;
//! repo.set_rules(
//!     job.id,
//!     serde_json::from_value(json!([
//!         {"id": "amount_present", "name": "amount_present", "type": "null_check", "field": "amount"},
//!         {"id": "amount_range", "name": "amount_range", "type": "range", "field": "amount", "min": 0, "max": 500}
//!     ]))?,
//! )
//! .await;
//!
//! let orchestrator = ProfilingOrchestrator::new(
//!     repo.clone(),
//!     repo.clone(),
//!     Arc::new(InMemoryDataSource::new(records)),
//!     Arc::new(InMemoryCheckpointStore::new()),
//!     repo.clone(),
//! );
//!
//! let job = orchestrator.execute_job(job.id).await?;
//! assert_eq!(job.status, JobStatus::Completed);
//! assert_eq!(job.records_processed, 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`orchestrator`**: partition planning, concurrent partition tasks,
//!   progress tracking, aggregation and pattern analysis
//! - **`profiler`**: the per-partition streaming loop, checkpoints and
//!   anomaly flushing
//! - **`rules`**: rule definitions, the rule kinds and the rule engine
//! - **`stats`**: bounded field statistics and memory tracking
//! - **`sources`**: record stream adapters
//! - **`repository`**: persistence traits and an in-memory implementation
//! - **`config`**, **`logging`**, **`error`**: engine configuration, tracing
//!   setup and the crate error type
//!
//! Storage, rule lookup and record access are all injected through traits,
//! so the engine holds no global state.

pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod prelude;
pub mod profiler;
pub mod repository;
pub mod rules;
pub mod sources;
pub mod stats;
pub mod types;

pub use config::EngineConfig;
pub use error::{ProfilingError, Result};
