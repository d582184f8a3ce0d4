//! Job-level coordination: partition planning, concurrent partition runs
//! and cross-partition pattern analysis.

mod patterns;
mod planner;
mod runner;

pub use patterns::{sampling_priority, PatternAnalyzer};
pub use planner::{plan_by_date, plan_by_id, plan_partitions};
pub use runner::ProfilingOrchestrator;
