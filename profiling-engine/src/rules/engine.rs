use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{
    CustomEvaluator, FailureReason, Rule, RuleCheck, RuleDefinition, RuleFailure, RuleKind,
    RuleOutcome, Severity,
};
use crate::error::Result;
use crate::log_rule;
use crate::logging::{truncate_field, LogConfig};
use crate::types::{stringify_value, Record};

/// What the engine does when a rule returns an error instead of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleErrorPolicy {
    /// Log the error and count the rule as passed for the record.
    #[default]
    TreatAsPass,
    /// Report the error as a `high` failure with reason `evaluation_error`.
    TreatAsAnomaly,
}

/// Failures produced by evaluating one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordEvaluation {
    pub failures: Vec<RuleFailure>,
    /// Maximum severity over the failures, `None` when the record passed.
    pub severity: Option<Severity>,
}

impl RecordEvaluation {
    pub fn is_anomaly(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Evaluates records against ordered rule lists.
///
/// The engine holds no per-record state; the same instance is shared by every
/// partition of a job.
#[derive(Clone, Default)]
pub struct RuleEngine {
    custom_evaluators: HashMap<String, Arc<dyn CustomEvaluator>>,
    error_policy: RuleErrorPolicy,
    log_config: LogConfig,
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.custom_evaluators.keys().collect();
        keys.sort();
        f.debug_struct("RuleEngine")
            .field("custom_evaluators", &keys)
            .field("error_policy", &self.error_policy)
            .finish()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an evaluator for `custom` rules that name `key`.
    pub fn with_custom_evaluator(
        mut self,
        key: impl Into<String>,
        evaluator: impl CustomEvaluator + 'static,
    ) -> Self {
        self.custom_evaluators
            .insert(key.into(), Arc::new(evaluator));
        self
    }

    pub fn with_error_policy(mut self, policy: RuleErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    pub fn error_policy(&self) -> RuleErrorPolicy {
        self.error_policy
    }

    /// Compiles rule definitions and binds custom rules to registered evaluators.
    ///
    /// Custom rules without a registered evaluator stay unbound and pass.
    pub fn compile_rules(&self, definitions: &[RuleDefinition]) -> Result<Vec<Rule>> {
        definitions
            .iter()
            .map(|definition| {
                let mut rule = definition.compile()?;
                self.bind(&mut rule);
                Ok(rule)
            })
            .collect()
    }

    /// Binds a custom rule to its evaluator if one is registered.
    pub fn bind(&self, rule: &mut Rule) {
        if let RuleKind::Custom(custom) = &mut rule.kind {
            match self.custom_evaluators.get(custom.evaluator_key()) {
                Some(evaluator) => custom.bind(Arc::clone(evaluator)),
                None => warn!(
                    rule = %rule.id,
                    evaluator = custom.evaluator_key(),
                    "No evaluator registered for custom rule; it will pass every record"
                ),
            }
        }
    }

    /// Evaluates `record` against `rules` in order.
    pub fn evaluate_record(&self, record: &Record, rules: &[Rule]) -> RecordEvaluation {
        let mut failures = Vec::new();

        for rule in rules {
            let outcome = match rule.kind.evaluate(record) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(rule = %rule.id, error = %e, "Rule evaluation failed");
                    match self.error_policy {
                        RuleErrorPolicy::TreatAsPass => RuleOutcome::Pass,
                        RuleErrorPolicy::TreatAsAnomaly => RuleOutcome::Fail {
                            reason: FailureReason::EvaluationError,
                            severity: Some(Severity::High),
                            message: e.to_string(),
                        },
                    }
                }
            };

            if let RuleOutcome::Fail {
                reason,
                severity,
                message,
            } = outcome
            {
                log_rule!(self.log_config, rule = %rule.id, %message, "Rule failed");
                failures.push(RuleFailure {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    rule_category: rule.category.clone(),
                    rule_type: rule.rule_type(),
                    field: rule.field.clone(),
                    severity: severity.unwrap_or(rule.severity),
                    reason,
                    message,
                    observed_value: self.observed_value(record, &rule.field),
                });
            }
        }

        let severity = Severity::max_of(failures.iter().map(|f| f.severity));
        RecordEvaluation { failures, severity }
    }

    fn observed_value(&self, record: &Record, field: &str) -> Option<String> {
        match record.get(field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(truncate_field(
                &stringify_value(value),
                self.log_config.max_field_length,
            )),
        }
    }
}
