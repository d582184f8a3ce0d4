//! Prelude for commonly used types and traits in profiling-engine.

pub use crate::config::EngineConfig;
pub use crate::error::{ErrorContext, ProfilingError, Result};
pub use crate::logging::LogConfig;
pub use crate::orchestrator::{PatternAnalyzer, ProfilingOrchestrator};
pub use crate::profiler::{
    AnomalySink, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    JsonLinesAnomalySink, ProfilingContext, StreamingProfiler,
};
pub use crate::repository::{InMemoryProfilingRepository, ProfilingRepository, RuleRepository};
pub use crate::rules::{Rule, RuleDefinition, RuleEngine, RuleErrorPolicy, Severity};
pub use crate::sources::{DataSource, InMemoryDataSource, JsonLinesSource, RecordStream};
pub use crate::stats::{MemoryProbe, StaticMemoryProbe};
pub use crate::types::{
    JobStatus, PartitionResult, PartitionStatus, ProfilingAnomalyPattern, ProfilingJob,
    ProfilingPartition, Record,
};
