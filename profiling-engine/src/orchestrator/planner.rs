//! Splits a job's record space into disjoint partitions.

use chrono::{DateTime, Duration, Utc};

use crate::error::{ProfilingError, Result};
use crate::types::{PartitionPlan, PartitionRange, PartitionStrategy, ProfilingJob};

/// Plans the partitions of `job` according to its strategy.
pub fn plan_partitions(job: &ProfilingJob) -> Result<Vec<PartitionPlan>> {
    match job.partition_strategy {
        PartitionStrategy::ById => plan_by_id(job.total_records, job.partition_count),
        PartitionStrategy::ByDate => {
            let (start, end) = match (job.start_date, job.end_date) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(ProfilingError::Configuration(format!(
                        "Job {} uses by_date partitioning without a start and end date",
                        job.id
                    )))
                }
            };
            plan_by_date(start, end, job.partition_count, job.total_records)
        }
    }
}

/// Splits `[0, total_records)` into `count` contiguous ranges.
///
/// Every range holds `total_records / count` records except the last, which
/// absorbs the remainder. When `count` exceeds `total_records` the leading
/// ranges are empty.
pub fn plan_by_id(total_records: u64, count: u32) -> Result<Vec<PartitionPlan>> {
    check_count(count)?;
    let chunk = total_records / count as u64;

    Ok((0..count)
        .map(|index| {
            let start = index as u64 * chunk;
            let end = if index + 1 == count {
                total_records
            } else {
                start + chunk
            };
            PartitionPlan {
                index,
                range: PartitionRange::Id { start, end },
                estimated_records: end - start,
            }
        })
        .collect())
}

/// Splits `[start, end]` into `count` contiguous sub-ranges of equal span.
///
/// Sub-ranges are half-open except the last, which includes `end`. The span
/// is computed in whole milliseconds; any rounding remainder goes to the last
/// sub-range.
pub fn plan_by_date(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    count: u32,
    total_records: u64,
) -> Result<Vec<PartitionPlan>> {
    check_count(count)?;
    if end < start {
        return Err(ProfilingError::Configuration(format!(
            "Date range ends before it starts: {start} > {end}"
        )));
    }

    let step_ms = (end - start).num_milliseconds() / count as i64;
    let per_partition = total_records / count as u64;

    Ok((0..count)
        .map(|index| {
            let last = index + 1 == count;
            let range_start = start + Duration::milliseconds(step_ms * index as i64);
            let range_end = if last {
                end
            } else {
                start + Duration::milliseconds(step_ms * (index as i64 + 1))
            };
            let estimated_records = if last {
                total_records - per_partition * (count as u64 - 1)
            } else {
                per_partition
            };
            PartitionPlan {
                index,
                range: PartitionRange::Date {
                    start: range_start,
                    end: range_end,
                    end_inclusive: last,
                },
                estimated_records,
            }
        })
        .collect())
}

fn check_count(count: u32) -> Result<()> {
    if count == 0 {
        return Err(ProfilingError::Configuration(
            "partition_count must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
