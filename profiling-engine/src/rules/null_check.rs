use serde_json::Value;

use super::{RuleCheck, RuleOutcome};
use crate::error::Result;
use crate::types::Record;

/// Fails when the field is missing, null, or an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullCheck {
    field: String,
}

impl NullCheck {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl RuleCheck for NullCheck {
    fn evaluate(&self, record: &Record) -> Result<RuleOutcome> {
        let outcome = match record.get(&self.field) {
            None | Some(Value::Null) => {
                RuleOutcome::violation(format!("Field '{}' is null", self.field))
            }
            Some(Value::String(s)) if s.is_empty() => {
                RuleOutcome::violation(format!("Field '{}' is empty", self.field))
            }
            Some(_) => RuleOutcome::Pass,
        };
        Ok(outcome)
    }
}
