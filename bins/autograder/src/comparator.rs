/// Output Comparator - Mode-Specific Matching Rules
///
/// **Core Responsibility:**
/// Decide whether captured output satisfies an expectation, and how much
/// partial credit a set of expected fragments earns.
///
/// **Properties:**
/// - Pure: no I/O, no state between calls
/// - One `OutputComparator` per `ComparisonMode`, selected by `comparator_for`
/// - Fragments are checked independently against the full output, so
///   overlapping fragments can all match
use autograder_common::types::ComparisonMode;
use regex::Regex;
use tracing::warn;

/// Matching rules for one comparison mode
pub trait OutputComparator: Send + Sync {
    /// Full-expectation check
    fn is_match(&self, output: &str, expected: &str, as_substring: bool) -> bool;

    /// Whether a single partial-credit fragment is present in the output
    fn contains_fragment(&self, output: &str, fragment: &str) -> bool;
}

/// Byte-for-byte equality, or containment for substring cases
pub struct ExactComparator;

impl OutputComparator for ExactComparator {
    fn is_match(&self, output: &str, expected: &str, as_substring: bool) -> bool {
        if as_substring {
            output.contains(expected)
        } else {
            output == expected
        }
    }

    fn contains_fragment(&self, output: &str, fragment: &str) -> bool {
        output.contains(fragment)
    }
}

/// Unanchored regular expression search
pub struct RegexComparator;

impl RegexComparator {
    fn search(output: &str, pattern: &str) -> bool {
        match Regex::new(pattern) {
            Ok(re) => re.is_match(output),
            Err(e) => {
                warn!(pattern = pattern, error = %e, "Invalid regular expression never matches");
                false
            }
        }
    }
}

impl OutputComparator for RegexComparator {
    fn is_match(&self, output: &str, expected: &str, _as_substring: bool) -> bool {
        Self::search(output, expected)
    }

    fn contains_fragment(&self, output: &str, fragment: &str) -> bool {
        Self::search(output, fragment)
    }
}

pub fn comparator_for(mode: ComparisonMode) -> &'static dyn OutputComparator {
    match mode {
        ComparisonMode::Exact => &ExactComparator,
        ComparisonMode::Regex => &RegexComparator,
    }
}

/// Outcome of checking one partial-credit fragment
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentVerdict {
    pub fragment: String,
    pub matched: bool,
}

pub fn matches(output: &str, expected: &str, mode: ComparisonMode, as_substring: bool) -> bool {
    comparator_for(mode).is_match(output, expected, as_substring)
}

/// Award `total_points / fragments.len()` for every fragment found in `output`
pub fn partial_score(
    output: &str,
    fragments: &[String],
    mode: ComparisonMode,
    total_points: f64,
) -> (f64, Vec<FragmentVerdict>) {
    if fragments.is_empty() {
        return (0.0, Vec::new());
    }

    let comparator = comparator_for(mode);
    let verdicts: Vec<FragmentVerdict> = fragments
        .iter()
        .map(|fragment| FragmentVerdict {
            fragment: fragment.clone(),
            matched: comparator.contains_fragment(output, fragment),
        })
        .collect();

    let found = verdicts.iter().filter(|v| v.matched).count();
    let points = total_points * found as f64 / fragments.len() as f64;

    (points, verdicts)
}
