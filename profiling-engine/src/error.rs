//! Error types for the profiling engine.
//!
//! All fallible operations in the crate return [`ProfilingError`] through the
//! [`Result`] alias. Errors are split into two scopes, which callers use to
//! decide what fails: a partition-scoped error fails only the partition that
//! raised it, anything else fails the whole job.

use std::time::Duration;

use thiserror::Error;

use crate::types::{JobId, JobStatus, PartitionId};

/// The main error type for the profiling engine.
#[derive(Error, Debug)]
pub enum ProfilingError {
    /// The requested job does not exist in the repository.
    #[error("Profiling job {job_id} not found")]
    JobNotFound { job_id: JobId },

    /// The requested partition does not exist in the repository.
    #[error("Partition {partition_id} not found")]
    PartitionNotFound { partition_id: PartitionId },

    /// The job is in a state that does not allow the requested transition.
    #[error("Job {job_id} cannot be executed while {status}")]
    InvalidJobState { job_id: JobId, status: JobStatus },

    /// A rule definition could not be compiled.
    #[error("Invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    /// Error related to engine or job configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error raised by a data-source adapter while opening or reading a stream.
    #[error("Data source error: {message}")]
    DataSource {
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error reading or writing a checkpoint.
    #[error("Checkpoint error for '{key}': {message}")]
    Checkpoint { key: String, message: String },

    /// Error raised by the job/partition repository.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Error raised inside a single rule evaluation.
    #[error("Rule '{rule}' failed to evaluate: {message}")]
    RuleEvaluation { rule: String, message: String },

    /// A partition did not finish within its time budget.
    #[error("Partition {partition_id} timed out after {elapsed:?}")]
    Timeout {
        partition_id: PartitionId,
        elapsed: Duration,
    },

    /// A partition task panicked.
    #[error("Partition {partition_id} task panicked: {message}")]
    TaskPanicked {
        partition_id: PartitionId,
        message: String,
    },

    /// The run was cancelled before completion.
    #[error("Profiling run cancelled")]
    Cancelled,

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, ProfilingError>`.
pub type Result<T> = std::result::Result<T, ProfilingError>;

impl ProfilingError {
    /// Creates a new data source error.
    pub fn data_source(message: impl Into<String>) -> Self {
        Self::DataSource {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new data source error with a source error.
    pub fn data_source_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::DataSource {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new invalid rule error.
    pub fn invalid_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Creates a new rule evaluation error.
    pub fn rule_evaluation(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleEvaluation {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Creates a new checkpoint error.
    pub fn checkpoint(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new repository error.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }

    /// Returns true if this error should fail only the partition that raised it.
    pub fn is_partition_scoped(&self) -> bool {
        matches!(
            self,
            ProfilingError::DataSource { .. }
                | ProfilingError::Checkpoint { .. }
                | ProfilingError::RuleEvaluation { .. }
                | ProfilingError::Timeout { .. }
                | ProfilingError::TaskPanicked { .. }
                | ProfilingError::PartitionNotFound { .. }
                | ProfilingError::Io(_)
                | ProfilingError::Serialization(_)
        )
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ProfilingError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            ProfilingError::Internal(inner) => ProfilingError::Internal(format!("{msg}: {inner}")),
            other => ProfilingError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                ProfilingError::Internal(inner) => {
                    ProfilingError::Internal(format!("{msg}: {inner}"))
                }
                other => ProfilingError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
