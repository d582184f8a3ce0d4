//! Anomaly severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity of a rule failure.
///
/// Levels are ordered `Low < Medium < High < Critical`; a record's overall
/// severity is the maximum over its failing rules.
///
/// # Examples
///
/// ```rust
/// use profiling_engine::rules::Severity;
///
/// assert!(Severity::Critical > Severity::High);
/// assert_eq!(
///     Severity::max_of([Severity::Medium, Severity::Critical, Severity::Low]),
///     Some(Severity::Critical)
/// );
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Severity {
    /// Returns the string representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Returns the most severe level in the iterator, or `None` if it is empty.
    pub fn max_of(levels: impl IntoIterator<Item = Severity>) -> Option<Severity> {
        levels.into_iter().max()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
