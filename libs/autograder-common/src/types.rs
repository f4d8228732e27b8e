use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a test's output is judged against its expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// String equality, or containment when the case asks for a substring match
    #[default]
    Exact,
    /// Unanchored regular expression search
    Regex,
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonMode::Exact => write!(f, "exact"),
            ComparisonMode::Regex => write!(f, "regex"),
        }
    }
}

/// One declared unit of evaluation. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub setup_command: String,
    pub run_command: String,
    pub input: String,
    pub timeout_seconds: f64,
    pub expected_output: String,
    pub comparison_mode: ComparisonMode,
    /// Exact mode only: the expectation only has to appear somewhere in the output
    pub as_substring: bool,
    pub points: f64,
    pub partial_fragments: Vec<String>,
    /// Optional human-readable description of what the case exercises
    pub display: Option<String>,
}

impl TestCase {
    pub fn has_partial_credit(&self) -> bool {
        !self.partial_fragments.is_empty()
    }
}

/// Extra credit granted when the reference time precedes `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusRule {
    pub threshold: DateTime<Utc>,
    pub points: f64,
}

/// A fully parsed test list: the cases in declared order plus bonus rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub tests: Vec<TestCase>,
    pub bonus: Vec<BonusRule>,
}

impl TestSuite {
    /// Sum of every case's points, independent of outcomes
    pub fn available_points(&self) -> f64 {
        self.tests.iter().map(|t| t.points).sum()
    }
}
