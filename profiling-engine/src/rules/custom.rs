use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{RuleCheck, RuleOutcome};
use crate::error::Result;
use crate::types::Record;

/// Rule-specific logic plugged into the engine under a string key.
///
/// Closures with the matching signature implement this trait.
pub trait CustomEvaluator: Send + Sync {
    fn evaluate(&self, field: &str, record: &Record, params: &Value) -> Result<RuleOutcome>;
}

impl<F> CustomEvaluator for F
where
    F: Fn(&str, &Record, &Value) -> Result<RuleOutcome> + Send + Sync,
{
    fn evaluate(&self, field: &str, record: &Record, params: &Value) -> Result<RuleOutcome> {
        self(field, record, params)
    }
}

/// A rule whose semantics live in a registered [`CustomEvaluator`].
///
/// A rule whose evaluator key has no registration passes every record.
#[derive(Clone)]
pub struct CustomRule {
    field: String,
    evaluator_key: String,
    params: Value,
    evaluator: Option<Arc<dyn CustomEvaluator>>,
}

impl CustomRule {
    pub fn new(field: impl Into<String>, evaluator_key: impl Into<String>, params: Value) -> Self {
        Self {
            field: field.into(),
            evaluator_key: evaluator_key.into(),
            params,
            evaluator: None,
        }
    }

    pub(crate) fn bind(&mut self, evaluator: Arc<dyn CustomEvaluator>) {
        self.evaluator = Some(evaluator);
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn evaluator_key(&self) -> &str {
        &self.evaluator_key
    }

    pub fn is_bound(&self) -> bool {
        self.evaluator.is_some()
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("field", &self.field)
            .field("evaluator_key", &self.evaluator_key)
            .field("params", &self.params)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl RuleCheck for CustomRule {
    fn evaluate(&self, record: &Record) -> Result<RuleOutcome> {
        match &self.evaluator {
            Some(evaluator) => evaluator.evaluate(&self.field, record, &self.params),
            None => Ok(RuleOutcome::Pass),
        }
    }
}
