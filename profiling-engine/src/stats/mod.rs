//! Streaming statistics and memory tracking used by the partition profiler.

mod memory;
mod statistics;

pub use memory::{
    MemoryProbe, MemoryTracker, ProcessMemoryProbe, StaticMemoryProbe, DEFAULT_NEAR_LIMIT_RATIO,
};
pub use statistics::{FieldSummary, StatisticsCollector, DEFAULT_DISTINCT_CAP};
