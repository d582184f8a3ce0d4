use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, instrument};

use super::{record_in_range, DataSource, RecordStream, DEFAULT_DATE_FIELD};
use crate::error::{ProfilingError, Result};
use crate::types::{PartitionRange, Record};

/// A data source reading newline-delimited JSON objects from a file.
///
/// Records are parsed lazily as the stream is polled. Blank lines are ignored
/// and do not count toward record positions. A line that is not a JSON object
/// ends the stream with a data-source error.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    date_field: String,
}

impl JsonLinesSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            date_field: DEFAULT_DATE_FIELD.to_string(),
        }
    }

    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = field.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct ReadState {
    lines: Lines<BufReader<File>>,
    range: PartitionRange,
    date_field: String,
    skip: u64,
    index: u64,
    matched: u64,
    done: bool,
}

impl ReadState {
    async fn next_record(&mut self) -> Option<Result<Record>> {
        if self.done {
            return None;
        }
        loop {
            if let PartitionRange::Id { end, .. } = self.range {
                if self.index >= end {
                    return None;
                }
            }

            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ProfilingError::data_source_with_source(
                        "Failed to read line",
                        Box::new(e),
                    )));
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let index = self.index;
            self.index += 1;
            if let PartitionRange::Id { start, .. } = self.range {
                if index < start {
                    continue;
                }
            }

            let record: Record = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ProfilingError::data_source_with_source(
                        format!("Invalid JSON object at record {index}"),
                        Box::new(e),
                    )));
                }
            };

            if !record_in_range(&self.range, index, &record, &self.date_field) {
                continue;
            }
            self.matched += 1;
            if self.matched <= self.skip {
                continue;
            }
            return Some(Ok(record));
        }
    }
}

#[async_trait]
impl DataSource for JsonLinesSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream> {
        let file = File::open(&self.path).await.map_err(|e| {
            ProfilingError::data_source_with_source(
                format!("Failed to open {}", self.path.display()),
                Box::new(e),
            )
        })?;
        debug!(range = %range.key(), offset, "Opened JSON lines source");

        let state = ReadState {
            lines: BufReader::new(file).lines(),
            range: range.clone(),
            date_field: self.date_field.clone(),
            skip: offset,
            index: 0,
            matched: 0,
            done: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            state.next_record().await.map(|item| (item, state))
        })
        .boxed())
    }
}
