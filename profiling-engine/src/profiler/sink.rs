//! Anomaly buffering and durable flush targets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::{AnomalyRecord, PartitionId};

/// Durable destination for anomalies evicted from a partition's buffer.
#[async_trait]
pub trait AnomalySink: Send + Sync {
    /// Appends `anomalies` to the durable set of `partition_id`.
    async fn flush(&self, partition_id: PartitionId, anomalies: &[AnomalyRecord]) -> Result<()>;
}

/// Anomalies awaiting a flush.
#[derive(Debug, Default)]
pub struct AnomalyBuffer {
    entries: Vec<AnomalyRecord>,
}

impl AnomalyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, anomaly: AnomalyRecord) {
        self.entries.push(anomaly);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Removes every entry and releases the buffer's allocation.
    pub fn take(&mut self) -> Vec<AnomalyRecord> {
        std::mem::take(&mut self.entries)
    }
}

/// Writes anomalies as JSON lines, one file per partition.
///
/// Each flush appends to `partition-<id>.jsonl` under the sink directory.
#[derive(Debug, Clone)]
pub struct JsonLinesAnomalySink {
    dir: PathBuf,
}

impl JsonLinesAnomalySink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn partition_path(&self, partition_id: PartitionId) -> PathBuf {
        self.dir.join(format!("partition-{partition_id}.jsonl"))
    }
}

#[async_trait]
impl AnomalySink for JsonLinesAnomalySink {
    #[instrument(skip(self, anomalies), fields(count = anomalies.len()))]
    async fn flush(&self, partition_id: PartitionId, anomalies: &[AnomalyRecord]) -> Result<()> {
        if anomalies.is_empty() {
            return Ok(());
        }

        let mut payload = Vec::new();
        for anomaly in anomalies {
            serde_json::to_writer(&mut payload, anomaly)?;
            payload.push(b'\n');
        }

        let path = self.partition_path(partition_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&payload).await?;
        file.flush().await?;

        debug!(partition_id, path = %path.display(), "Flushed anomalies");
        Ok(())
    }
}
