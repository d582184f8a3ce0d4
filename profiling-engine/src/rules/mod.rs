//! Record-level data-quality rules and the engine that evaluates them.
//!
//! Rules come from the rule repository as [`RuleDefinition`]s and are compiled
//! once per job into [`Rule`]s. Every rule kind implements [`RuleCheck`], and
//! [`RuleKind`] dispatches over the closed set of kinds:
//!
//! - `null_check`: the field is missing, null, or an empty string
//! - `pattern`: the stringified value does not match a regular expression
//! - `range`: the value is not numeric, or lies outside `[min, max]`
//! - `custom`: delegated to a registered [`CustomEvaluator`]
//!
//! # Example
//!
//! ```rust
//! use profiling_engine::rules::{Rule, RuleEngine, Severity};
//! use serde_json::json;
//!
//! let rules = vec![
//!     Rule::null_check("amount_present", "amount"),
//!     Rule::range("amount_range", "amount", Some(0.0), Some(1000.0)).unwrap(),
//! ];
//! let engine = RuleEngine::new();
//!
//! let record = json!({"amount": 5000}).as_object().cloned().unwrap();
//! let evaluation = engine.evaluate_record(&record, &rules);
//! assert_eq!(evaluation.failures.len(), 1);
//! assert_eq!(evaluation.severity, Some(Severity::Medium));
//! ```

mod custom;
mod definition;
mod engine;
mod null_check;
mod pattern;
mod range;
mod severity;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Record;

pub use custom::{CustomEvaluator, CustomRule};
pub use definition::{Rule, RuleDefinition, RuleKind, RuleKindDefinition};
pub use engine::{RecordEvaluation, RuleEngine, RuleErrorPolicy};
pub use null_check::NullCheck;
pub use pattern::PatternMatch;
pub use range::RangeCheck;
pub use severity::Severity;

/// Uniform contract implemented by every rule kind.
pub trait RuleCheck {
    /// Evaluates one record. An `Err` means the rule itself could not run.
    fn evaluate(&self, record: &Record) -> Result<RuleOutcome>;
}

/// Discriminant of a rule kind, as named in rule definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    NullCheck,
    Pattern,
    Range,
    Custom,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::NullCheck => "null_check",
            RuleType::Pattern => "pattern",
            RuleType::Range => "range",
            RuleType::Custom => "custom",
        }
    }
}

/// Why a rule failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The value violates the rule.
    Violation,
    /// The value could not be interpreted as the type the rule needs.
    TypeMismatch,
    /// The rule raised an error and the engine is configured to report it.
    EvaluationError,
}

/// Result of evaluating one rule against one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Pass,
    Fail {
        reason: FailureReason,
        /// Overrides the rule's configured severity when set.
        severity: Option<Severity>,
        message: String,
    },
}

impl RuleOutcome {
    /// A rule violation at the rule's own severity.
    pub fn violation(message: impl Into<String>) -> Self {
        RuleOutcome::Fail {
            reason: FailureReason::Violation,
            severity: None,
            message: message.into(),
        }
    }

    /// A type mismatch at a fixed severity.
    pub fn type_mismatch(severity: Severity, message: impl Into<String>) -> Self {
        RuleOutcome::Fail {
            reason: FailureReason::TypeMismatch,
            severity: Some(severity),
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RuleOutcome::Fail { .. })
    }
}

/// One failed rule on one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_category: String,
    pub rule_type: RuleType,
    pub field: String,
    pub severity: Severity,
    pub reason: FailureReason,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_value: Option<String>,
}
