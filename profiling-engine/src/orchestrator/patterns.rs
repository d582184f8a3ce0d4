//! Cross-partition anomaly pattern detection.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::types::{JobId, PartitionResult, ProfilingAnomalyPattern, RuleKey};

/// Groups anomalies by rule and turns frequent groups into sampling patterns.
///
/// Occurrence counts come from the exact per-rule tallies of each partition
/// result, so a truncated anomaly sample never lowers a count. Sample record
/// ids are taken from the anomaly samples in partition order.
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    min_occurrences: u64,
    max_sample_ids: usize,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self {
            min_occurrences: 10,
            max_sample_ids: 10,
        }
    }
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups with fewer occurrences than this are dropped.
    pub fn with_min_occurrences(mut self, min: u64) -> Self {
        self.min_occurrences = min;
        self
    }

    pub fn with_max_sample_ids(mut self, max: usize) -> Self {
        self.max_sample_ids = max;
        self
    }

    /// Derives patterns from the successful partition results of a job.
    ///
    /// Output is ordered by sampling priority, then occurrence count (both
    /// descending), then category and rule name.
    pub fn analyze(
        &self,
        job_id: JobId,
        results: &[PartitionResult],
        records_processed: u64,
    ) -> Vec<ProfilingAnomalyPattern> {
        let mut counts: BTreeMap<RuleKey, u64> = BTreeMap::new();
        for result in results {
            for tally in &result.rule_failure_counts {
                *counts.entry(tally.key()).or_insert(0) += tally.count;
            }
        }

        let mut samples: BTreeMap<RuleKey, Vec<String>> = BTreeMap::new();
        for anomaly in results.iter().flat_map(|r| r.anomalies.iter()) {
            for failure in &anomaly.failures {
                let ids = samples
                    .entry(RuleKey::new(&failure.rule_category, &failure.rule_name))
                    .or_default();
                if ids.len() < self.max_sample_ids && !ids.contains(&anomaly.record_id) {
                    ids.push(anomaly.record_id.clone());
                }
            }
        }

        let created_at = Utc::now();
        let mut patterns: Vec<ProfilingAnomalyPattern> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.min_occurrences)
            .map(|(key, count)| {
                let occurrence_percentage = if records_processed > 0 {
                    count as f64 / records_processed as f64 * 100.0
                } else {
                    0.0
                };
                ProfilingAnomalyPattern {
                    job_id,
                    description: format!(
                        "Rule '{}' in category '{}' failed for {} records ({:.2}%)",
                        key.name, key.category, count, occurrence_percentage
                    ),
                    sample_record_ids: samples.remove(&key).unwrap_or_default(),
                    pattern_type: key.category,
                    rule_name: key.name,
                    confidence_score: (count as f64 / 100.0).min(1.0),
                    occurrence_count: count,
                    occurrence_percentage,
                    recommended_for_sampling: true,
                    sampling_priority: sampling_priority(count),
                    created_at,
                }
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.sampling_priority
                .cmp(&a.sampling_priority)
                .then(b.occurrence_count.cmp(&a.occurrence_count))
                .then_with(|| a.pattern_type.cmp(&b.pattern_type))
                .then_with(|| a.rule_name.cmp(&b.rule_name))
        });
        patterns
    }
}

/// Sampling priority for a pattern with `count` occurrences.
pub fn sampling_priority(count: u64) -> u8 {
    match count {
        c if c > 1000 => 10,
        c if c > 100 => 7,
        c if c > 10 => 5,
        _ => 3,
    }
}
