//! Engine-wide configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilingError, Result};
use crate::logging::LogConfig;
use crate::rules::RuleErrorPolicy;

/// Configuration shared by the orchestrator and every partition profiler.
///
/// Values can be set through the `with_*` builders or loaded from JSON, where
/// durations are written in seconds and any omitted field takes its default:
///
/// ```rust
/// use profiling_engine::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{"batch_size": 500, "partition_timeout_secs": 60}"#)
///     .unwrap();
/// assert_eq!(config.batch_size(), 500);
/// assert_eq!(config.checkpoint_interval(), 10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    batch_size: usize,
    checkpoint_interval: u64,
    #[serde(rename = "checkpoint_ttl_secs", with = "duration_secs")]
    checkpoint_ttl: Duration,
    anomaly_sample_limit: usize,
    memory_near_limit_ratio: f64,
    max_concurrent_partitions: usize,
    #[serde(rename = "partition_timeout_secs", with = "option_duration_secs")]
    partition_timeout: Option<Duration>,
    rule_error_policy: RuleErrorPolicy,
    record_id_field: String,
    pattern_min_occurrences: u64,
    pattern_sample_ids: usize,
    #[serde(skip)]
    log_config: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            checkpoint_interval: 10_000,
            checkpoint_ttl: Duration::from_secs(24 * 60 * 60),
            anomaly_sample_limit: 1000,
            memory_near_limit_ratio: 0.8,
            max_concurrent_partitions: num_cpus::get().max(1),
            partition_timeout: None,
            rule_error_policy: RuleErrorPolicy::default(),
            record_id_field: "id".to_string(),
            pattern_min_occurrences: 10,
            pattern_sample_ids: 10,
            log_config: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ProfilingError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(ProfilingError::Configuration(
                "checkpoint_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_partitions == 0 {
            return Err(ProfilingError::Configuration(
                "max_concurrent_partitions must be greater than zero".to_string(),
            ));
        }
        if !(self.memory_near_limit_ratio > 0.0 && self.memory_near_limit_ratio <= 1.0) {
            return Err(ProfilingError::Configuration(format!(
                "memory_near_limit_ratio must be in (0, 1], got {}",
                self.memory_near_limit_ratio
            )));
        }
        if self.record_id_field.is_empty() {
            return Err(ProfilingError::Configuration(
                "record_id_field must not be empty".to_string(),
            ));
        }
        if matches!(self.partition_timeout, Some(t) if t.is_zero()) {
            return Err(ProfilingError::Configuration(
                "partition_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the number of records evaluated per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set how many records pass between checkpoint writes.
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_checkpoint_ttl(mut self, ttl: Duration) -> Self {
        self.checkpoint_ttl = ttl;
        self
    }

    /// Set the maximum number of anomalies kept in a partition result.
    pub fn with_anomaly_sample_limit(mut self, limit: usize) -> Self {
        self.anomaly_sample_limit = limit;
        self
    }

    pub fn with_memory_near_limit_ratio(mut self, ratio: f64) -> Self {
        self.memory_near_limit_ratio = ratio;
        self
    }

    /// Set how many partitions may run at the same time.
    pub fn with_max_concurrent_partitions(mut self, max: usize) -> Self {
        self.max_concurrent_partitions = max;
        self
    }

    pub fn with_partition_timeout(mut self, timeout: Duration) -> Self {
        self.partition_timeout = Some(timeout);
        self
    }

    pub fn with_rule_error_policy(mut self, policy: RuleErrorPolicy) -> Self {
        self.rule_error_policy = policy;
        self
    }

    /// Set the record field used as the anomaly identifier.
    pub fn with_record_id_field(mut self, field: impl Into<String>) -> Self {
        self.record_id_field = field.into();
        self
    }

    /// Set the pattern analyzer's minimum occurrences and sample id cap.
    pub fn with_pattern_thresholds(mut self, min_occurrences: u64, sample_ids: usize) -> Self {
        self.pattern_min_occurrences = min_occurrences;
        self.pattern_sample_ids = sample_ids;
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn checkpoint_interval(&self) -> u64 {
        self.checkpoint_interval
    }

    pub fn checkpoint_ttl(&self) -> Duration {
        self.checkpoint_ttl
    }

    pub fn anomaly_sample_limit(&self) -> usize {
        self.anomaly_sample_limit
    }

    pub fn memory_near_limit_ratio(&self) -> f64 {
        self.memory_near_limit_ratio
    }

    pub fn max_concurrent_partitions(&self) -> usize {
        self.max_concurrent_partitions
    }

    pub fn partition_timeout(&self) -> Option<Duration> {
        self.partition_timeout
    }

    pub fn rule_error_policy(&self) -> RuleErrorPolicy {
        self.rule_error_policy
    }

    pub fn record_id_field(&self) -> &str {
        &self.record_id_field
    }

    pub fn pattern_min_occurrences(&self) -> u64 {
        self.pattern_min_occurrences
    }

    pub fn pattern_sample_ids(&self) -> usize {
        self.pattern_sample_ids
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size(), 1000);
        assert_eq!(config.checkpoint_interval(), 10_000);
        assert_eq!(config.checkpoint_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.anomaly_sample_limit(), 1000);
        assert_eq!(config.memory_near_limit_ratio(), 0.8);
        assert!(config.max_concurrent_partitions() >= 1);
        assert_eq!(config.partition_timeout(), None);
        assert_eq!(config.rule_error_policy(), RuleErrorPolicy::TreatAsPass);
        assert_eq!(config.record_id_field(), "id");
        assert_eq!(config.pattern_min_occurrences(), 10);
        assert_eq!(config.pattern_sample_ids(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_batch_size(10)
            .with_checkpoint_interval(50)
            .with_partition_timeout(Duration::from_secs(5))
            .with_rule_error_policy(RuleErrorPolicy::TreatAsAnomaly)
            .with_pattern_thresholds(3, 5);
        assert_eq!(config.batch_size(), 10);
        assert_eq!(config.checkpoint_interval(), 50);
        assert_eq!(config.partition_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.rule_error_policy(), RuleErrorPolicy::TreatAsAnomaly);
        assert_eq!(config.pattern_min_occurrences(), 3);
        assert_eq!(config.pattern_sample_ids(), 5);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json_str(
            r#"{
                "batch_size": 250,
                "checkpoint_ttl_secs": 60,
                "partition_timeout_secs": 30,
                "rule_error_policy": "treat_as_anomaly"
            }"#,
        )
        .unwrap();
        assert_eq!(config.batch_size(), 250);
        assert_eq!(config.checkpoint_ttl(), Duration::from_secs(60));
        assert_eq!(config.partition_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.rule_error_policy(), RuleErrorPolicy::TreatAsAnomaly);
        assert_eq!(config.anomaly_sample_limit(), 1000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::new().with_batch_size(0).validate(),
            Err(ProfilingError::Configuration(_))
        ));
        assert!(EngineConfig::new()
            .with_memory_near_limit_ratio(1.5)
            .validate()
            .is_err());
        assert!(EngineConfig::new()
            .with_max_concurrent_partitions(0)
            .validate()
            .is_err());
        assert!(EngineConfig::from_json_str(r#"{"checkpoint_interval": 0}"#).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"record_id_field": "account_id"}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.record_id_field(), "account_id");
    }
}
