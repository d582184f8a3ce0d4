use regex::Regex;
use serde_json::Value;

use super::{RuleCheck, RuleOutcome};
use crate::error::{ProfilingError, Result};
use crate::types::{stringify_value, Record};

/// Fails when the stringified field value does not match a regular expression.
///
/// The match is anchored at the start of the value. Null and missing values
/// are left to [`NullCheck`](super::NullCheck) and pass here.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    field: String,
    regex: Regex,
}

impl PatternMatch {
    /// Compiles the pattern. Fails if the expression is not valid.
    pub fn new(field: impl Into<String>, pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{pattern})");
        let regex = Regex::new(&anchored)
            .map_err(|e| ProfilingError::invalid_rule(pattern, format!("invalid regex: {e}")))?;
        Ok(Self {
            field: field.into(),
            regex,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl RuleCheck for PatternMatch {
    fn evaluate(&self, record: &Record) -> Result<RuleOutcome> {
        let value = match record.get(&self.field) {
            None | Some(Value::Null) => return Ok(RuleOutcome::Pass),
            Some(value) => stringify_value(value),
        };

        if self.regex.is_match(&value) {
            Ok(RuleOutcome::Pass)
        } else {
            Ok(RuleOutcome::violation(format!(
                "Field '{}' does not match pattern {}",
                self.field,
                self.regex.as_str()
            )))
        }
    }
}
