use serde_json::Value;

use super::{RuleCheck, RuleOutcome, Severity};
use crate::error::{ProfilingError, Result};
use crate::types::{numeric_value, Record};

/// Fails when the field is not numeric or falls outside `[min, max]`.
///
/// A value that cannot be read as a number is reported as a type mismatch with
/// severity forced to [`Severity::High`]. Null and missing values pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeCheck {
    field: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeCheck {
    /// Creates a range check. At least one bound is required and `min <= max`.
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Result<Self> {
        let field = field.into();
        match (min, max) {
            (None, None) => {
                return Err(ProfilingError::invalid_rule(
                    &field,
                    "range rule needs at least one of min or max",
                ))
            }
            (Some(lo), Some(hi)) if lo > hi => {
                return Err(ProfilingError::invalid_rule(
                    &field,
                    format!("range min {lo} is greater than max {hi}"),
                ))
            }
            _ => {}
        }
        Ok(Self { field, min, max })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        (self.min, self.max)
    }
}

impl RuleCheck for RangeCheck {
    fn evaluate(&self, record: &Record) -> Result<RuleOutcome> {
        let raw = match record.get(&self.field) {
            None | Some(Value::Null) => return Ok(RuleOutcome::Pass),
            Some(raw) => raw,
        };

        let Some(value) = numeric_value(raw) else {
            return Ok(RuleOutcome::type_mismatch(
                Severity::High,
                format!("Field '{}' is not numeric", self.field),
            ));
        };

        if let Some(min) = self.min {
            if value < min {
                return Ok(RuleOutcome::violation(format!(
                    "Field '{}' value {value} is below minimum {min}",
                    self.field
                )));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Ok(RuleOutcome::violation(format!(
                    "Field '{}' value {value} is above maximum {max}",
                    self.field
                )));
            }
        }
        Ok(RuleOutcome::Pass)
    }
}
