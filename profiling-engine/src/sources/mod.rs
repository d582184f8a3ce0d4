//! Data-source adapters that stream the records of one partition.
//!
//! A source is opened once per partition run with the partition's range and a
//! resume offset. The returned stream yields records in a stable order, so a
//! run resumed from offset `n` sees exactly the records a fresh run would have
//! seen after its first `n`.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::Result;
use crate::types::{PartitionRange, Record};

mod json_lines;
mod memory;

pub use json_lines::JsonLinesSource;
pub use memory::InMemoryDataSource;

/// Lazy stream of records. Errors end the partition run.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Default record field used to place records into date partitions.
pub const DEFAULT_DATE_FIELD: &str = "created_at";

/// A source of records that can be streamed partition by partition.
#[async_trait]
pub trait DataSource: Debug + Send + Sync {
    /// Opens a stream over the records in `range`, skipping the first `offset`.
    async fn open(&self, range: &PartitionRange, offset: u64) -> Result<RecordStream>;
}

/// Returns true if the record at `index` belongs to `range`.
///
/// Id ranges select by stream position. Date ranges read `date_field`, which
/// may hold an RFC 3339 timestamp or a plain `YYYY-MM-DD` date; records without
/// a parseable date belong to no date partition.
pub(crate) fn record_in_range(
    range: &PartitionRange,
    index: u64,
    record: &Record,
    date_field: &str,
) -> bool {
    match range {
        PartitionRange::Id { start, end } => index >= *start && index < *end,
        PartitionRange::Date { .. } => record
            .get(date_field)
            .and_then(parse_timestamp)
            .is_some_and(|ts| range.contains_date(&ts)),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
