//! Partition checkpoints with time-to-live.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{ProfilingError, Result};
use crate::types::{PartitionId, RuleFailureCount};

/// Progress marker for a partition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Absolute number of partition records consumed when the checkpoint was written.
    pub offset: u64,
    /// Anomalies found among those records.
    pub anomaly_count: u64,
    /// Per-rule failure tallies over those records.
    #[serde(default)]
    pub rule_failure_counts: Vec<RuleFailureCount>,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(offset: u64, anomaly_count: u64) -> Self {
        Self {
            offset,
            anomaly_count,
            rule_failure_counts: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_rule_failure_counts(mut self, counts: Vec<RuleFailureCount>) -> Self {
        self.rule_failure_counts = counts;
        self
    }
}

/// Store key for the checkpoint of a partition.
pub fn checkpoint_key(partition_id: PartitionId) -> String {
    format!("profiling:checkpoint:{partition_id}")
}

/// Key-value storage for checkpoints.
///
/// Entries older than their TTL must read back as absent.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn set(&self, key: &str, checkpoint: &Checkpoint, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Checkpoint>>;

    /// Removes a checkpoint. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local checkpoint store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    entries: Arc<RwLock<HashMap<String, (Checkpoint, Instant)>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn set(&self, key: &str, checkpoint: &Checkpoint, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (checkpoint.clone(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Checkpoint>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((checkpoint, _)) => Ok(Some(checkpoint.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCheckpoint {
    checkpoint: Checkpoint,
    expires_at: DateTime<Utc>,
}

/// Checkpoint store writing one JSON file per key under a base directory.
///
/// ```text
/// base_path/
/// ├── profiling_checkpoint_1.json
/// └── profiling_checkpoint_2.json
/// ```
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    base_path: PathBuf,
}

impl FileCheckpointStore {
    /// Creates the store, creating `base_path` if needed.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            ProfilingError::checkpoint(
                base_path.display().to_string(),
                format!("Failed to create checkpoint directory: {e}"),
            )
        })?;
        Ok(Self { base_path })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{name}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    #[instrument(skip(self, checkpoint))]
    async fn set(&self, key: &str, checkpoint: &Checkpoint, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ProfilingError::checkpoint(key, format!("Invalid TTL: {e}")))?;
        let stored = StoredCheckpoint {
            checkpoint: checkpoint.clone(),
            expires_at: Utc::now() + ttl,
        };
        let data = serde_json::to_vec(&stored)?;
        fs::write(self.file_path(key), data)
            .await
            .map_err(|e| ProfilingError::checkpoint(key, format!("Failed to write checkpoint: {e}")))?;
        debug!(key, offset = checkpoint.offset, "Saved checkpoint");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Checkpoint>> {
        let path = self.file_path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProfilingError::checkpoint(
                    key,
                    format!("Failed to read checkpoint: {e}"),
                ))
            }
        };

        let stored: StoredCheckpoint = serde_json::from_slice(&data)
            .map_err(|e| ProfilingError::checkpoint(key, format!("Corrupt checkpoint: {e}")))?;
        if stored.expires_at <= Utc::now() {
            debug!(key, "Checkpoint expired");
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(stored.checkpoint))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProfilingError::checkpoint(
                key,
                format!("Failed to delete checkpoint: {e}"),
            )),
        }
    }
}
