// Plain-text rendering of per-case results and the final summary
use crate::aggregator::Report;
use crate::comparator::FragmentVerdict;
use crate::evaluator::{CaseResult, ExecutionOutcome, FailureKind};
use anyhow::{Context, Result};
use autograder_common::types::{ComparisonMode, TestCase};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const RULE_WIDTH: usize = 72;

/// Feedback body for one case: diagnostics, diff and fragment verdicts
pub fn render_feedback(
    test: &TestCase,
    outcome: &ExecutionOutcome,
    matched: bool,
    verdicts: &[FragmentVerdict],
) -> String {
    let mut out = String::new();

    if outcome.failure_kind == FailureKind::BuildFailed {
        let _ = writeln!(out, "Compilation error:");
        if let Some(diagnostic) = &outcome.diagnostic {
            let _ = writeln!(out, "  {}", diagnostic);
        }
        push_indented(&mut out, &outcome.stdout);
        return out;
    }

    if let Some(diagnostic) = &outcome.diagnostic {
        let _ = writeln!(out, "{}", diagnostic);
    }

    if !matched && outcome.failure_kind != FailureKind::DecodeError {
        match (test.comparison_mode, test.as_substring) {
            (ComparisonMode::Regex, _) => {
                let _ = writeln!(out, "Expected pattern:\t{:?}", test.expected_output);
                let _ = writeln!(out, "Output:\t\t{:?}", outcome.stdout);
            }
            (ComparisonMode::Exact, true) => {
                let _ = writeln!(out, "Expected to contain:\t{:?}", test.expected_output);
                let _ = writeln!(out, "Output:\t\t{:?}", outcome.stdout);
            }
            (ComparisonMode::Exact, false) => {
                let _ = writeln!(out, "Expected (-) vs output (+):");
                out.push_str(&render_diff(&test.expected_output, &outcome.stdout));
            }
        }
    }

    if !outcome.stderr.is_empty() {
        let _ = writeln!(out, "Error output:");
        push_indented(&mut out, &outcome.stderr);
    }

    if let Some(code) = outcome.exit_code.filter(|c| *c != 0) {
        let _ = writeln!(out, "Exit status: {}", code);
    }

    if !verdicts.is_empty() {
        let found = verdicts.iter().filter(|v| v.matched).count();
        let _ = writeln!(
            out,
            "Partial credit: {}/{} fragments found ({} match)",
            found,
            verdicts.len(),
            test.comparison_mode
        );
        for verdict in verdicts {
            let mark = if verdict.matched { "found" } else { "missing" };
            let _ = writeln!(out, "  [{}] {:?}", mark, verdict.fragment);
        }
    }

    out
}

/// Line-oriented diff; lines are quoted so whitespace differences stay visible
pub fn render_diff(expected: &str, actual: &str) -> String {
    let expected_lines: Vec<&str> = expected.split('\n').collect();
    let actual_lines: Vec<&str> = actual.split('\n').collect();
    let len = expected_lines.len().max(actual_lines.len());

    let mut out = String::new();
    for i in 0..len {
        match (expected_lines.get(i), actual_lines.get(i)) {
            (Some(e), Some(a)) if e == a => {
                let _ = writeln!(out, "    {:?}", e);
            }
            (e, a) => {
                if let Some(e) = e {
                    let _ = writeln!(out, "  - {:?}", e);
                }
                if let Some(a) = a {
                    let _ = writeln!(out, "  + {:?}", a);
                }
            }
        }
    }
    out
}

/// Header line plus feedback for one evaluated case
pub fn render_case(result: &CaseResult<'_>) -> String {
    let test = result.test_case;
    let mut out = String::new();

    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "Test: {}", test.name);
    if let Some(display) = &test.display {
        let _ = writeln!(out, "Case: {}", display);
    }

    let verdict = if result.passed { "PASS" } else { "FAIL" };
    let _ = write!(
        out,
        "{} ({:.2}/{:.2} points, {:.3}s)",
        verdict, result.awarded_points, test.points, result.elapsed_seconds
    );
    if result.failure_kind != FailureKind::None {
        let _ = write!(out, " [{}]", result.failure_kind);
    }
    out.push('\n');

    if !result.passed && !result.rendered_feedback.is_empty() {
        out.push('\n');
        out.push_str(&result.rendered_feedback);
    }

    out
}

pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "*".repeat(RULE_WIDTH));
    if let Some(bonus) = report.bonus_applied {
        let _ = writeln!(out, "Bonus:\t{:.2}", bonus);
    }
    let _ = writeln!(out, "Points:\t{}", report.format_score());
    out
}

/// Persist the machine-readable `awarded/available` score
pub fn write_score_file(path: &Path, report: &Report) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, report.format_score())
        .with_context(|| format!("Failed to write score to {}", path.display()))
}

fn push_indented(out: &mut String, text: &str) {
    for line in text.lines() {
        let _ = writeln!(out, "  {}", line);
    }
}
