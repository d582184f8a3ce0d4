use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::{record_in_range, DataSource, RecordStream, DEFAULT_DATE_FIELD};
use crate::error::Result;
use crate::types::{PartitionRange, Record};

/// A data source over records held in memory.
///
/// Cloning is cheap; every clone shares the same record vector.
#[derive(Debug, Clone)]
pub struct InMemoryDataSource {
    records: Arc<Vec<Record>>,
    date_field: String,
}

impl InMemoryDataSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(records),
            date_field: DEFAULT_DATE_FIELD.to_string(),
        }
    }

    /// Set the field read when selecting records for date partitions.
    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = field.into();
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream> {
        let selected: Vec<Record> = match range {
            PartitionRange::Id { start, end } => {
                let len = self.records.len() as u64;
                let lo = (*start).min(len) as usize;
                let hi = ((*end).min(len) as usize).max(lo);
                self.records[lo..hi]
                    .iter()
                    .skip(offset as usize)
                    .cloned()
                    .collect()
            }
            PartitionRange::Date { .. } => self
                .records
                .iter()
                .enumerate()
                .filter(|(i, record)| record_in_range(range, *i as u64, record, &self.date_field))
                .skip(offset as usize)
                .map(|(_, record)| record.clone())
                .collect(),
        };

        Ok(stream::iter(selected.into_iter().map(Ok)).boxed())
    }
}
