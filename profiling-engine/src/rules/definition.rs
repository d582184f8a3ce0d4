use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CustomRule, NullCheck, PatternMatch, RangeCheck, RuleCheck, RuleOutcome, RuleType, Severity,
};
use crate::error::{ProfilingError, Result};
use crate::types::{Record, RuleKey};

fn default_category() -> String {
    "data_quality".to_string()
}

/// A rule as stored by the rule repository.
///
/// ```rust
/// use profiling_engine::rules::RuleDefinition;
///
/// let def: RuleDefinition = serde_json::from_str(
///     r#"{"id": "r1", "name": "amount_range", "type": "range",
///         "field": "amount", "min": 0, "max": 1000}"#,
/// ).unwrap();
/// let rule = def.compile().unwrap();
/// assert_eq!(rule.field, "amount");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(flatten)]
    pub kind: RuleKindDefinition,
}

/// Kind-specific parameters, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKindDefinition {
    NullCheck,
    Pattern {
        pattern: String,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Custom {
        evaluator: String,
        #[serde(default)]
        params: Value,
    },
}

impl RuleDefinition {
    /// Compiles the definition into an executable rule.
    ///
    /// Custom rules come out unbound; [`RuleEngine::compile_rules`](super::RuleEngine::compile_rules)
    /// binds them to registered evaluators.
    pub fn compile(&self) -> Result<Rule> {
        let kind = match &self.kind {
            RuleKindDefinition::NullCheck => RuleKind::NullCheck(NullCheck::new(&self.field)),
            RuleKindDefinition::Pattern { pattern } => RuleKind::Pattern(
                PatternMatch::new(&self.field, pattern)
                    .map_err(|e| ProfilingError::invalid_rule(&self.id, e.to_string()))?,
            ),
            RuleKindDefinition::Range { min, max } => RuleKind::Range(
                RangeCheck::new(&self.field, *min, *max)
                    .map_err(|e| ProfilingError::invalid_rule(&self.id, e.to_string()))?,
            ),
            RuleKindDefinition::Custom { evaluator, params } => {
                RuleKind::Custom(CustomRule::new(&self.field, evaluator, params.clone()))
            }
        };

        Ok(Rule {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            field: self.field.clone(),
            severity: self.severity.unwrap_or_default(),
            kind,
        })
    }
}

/// The closed set of rule implementations.
#[derive(Debug, Clone)]
pub enum RuleKind {
    NullCheck(NullCheck),
    Pattern(PatternMatch),
    Range(RangeCheck),
    Custom(CustomRule),
}

impl RuleKind {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleKind::NullCheck(_) => RuleType::NullCheck,
            RuleKind::Pattern(_) => RuleType::Pattern,
            RuleKind::Range(_) => RuleType::Range,
            RuleKind::Custom(_) => RuleType::Custom,
        }
    }
}

impl RuleCheck for RuleKind {
    fn evaluate(&self, record: &Record) -> Result<RuleOutcome> {
        match self {
            RuleKind::NullCheck(check) => check.evaluate(record),
            RuleKind::Pattern(check) => check.evaluate(record),
            RuleKind::Range(check) => check.evaluate(record),
            RuleKind::Custom(check) => check.evaluate(record),
        }
    }
}

/// A compiled, executable rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub category: String,
    pub field: String,
    pub severity: Severity,
    pub kind: RuleKind,
}

impl Rule {
    /// Null check on `field`; the rule id doubles as its name.
    pub fn null_check(id: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self::from_kind(id, &field, RuleKind::NullCheck(NullCheck::new(&field)))
    }

    /// Pattern rule on `field`.
    pub fn pattern(id: impl Into<String>, field: impl Into<String>, pattern: &str) -> Result<Self> {
        let field = field.into();
        let check = PatternMatch::new(&field, pattern)?;
        Ok(Self::from_kind(id, &field, RuleKind::Pattern(check)))
    }

    /// Range rule on `field`.
    pub fn range(
        id: impl Into<String>,
        field: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Self> {
        let field = field.into();
        let check = RangeCheck::new(&field, min, max)?;
        Ok(Self::from_kind(id, &field, RuleKind::Range(check)))
    }

    /// Custom rule on `field`, evaluated by the evaluator registered under `evaluator`.
    pub fn custom(
        id: impl Into<String>,
        field: impl Into<String>,
        evaluator: impl Into<String>,
        params: Value,
    ) -> Self {
        let field = field.into();
        let check = CustomRule::new(&field, evaluator, params);
        Self::from_kind(id, &field, RuleKind::Custom(check))
    }

    fn from_kind(id: impl Into<String>, field: &str, kind: RuleKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: default_category(),
            field: field.to_string(),
            severity: Severity::default(),
            kind,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn rule_type(&self) -> RuleType {
        self.kind.rule_type()
    }

    /// Pattern grouping key for this rule.
    pub fn key(&self) -> RuleKey {
        RuleKey::new(&self.category, &self.name)
    }
}
