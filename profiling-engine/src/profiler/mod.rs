//! Per-partition streaming profiler and its storage seams.

mod checkpoint;
mod context;
mod sink;
mod streaming;

pub use checkpoint::{
    checkpoint_key, Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
pub use context::ProfilingContext;
pub use sink::{AnomalyBuffer, AnomalySink, JsonLinesAnomalySink};
pub use streaming::StreamingProfiler;
