/// Test Case Evaluator - Per-Case Scoring Logic
///
/// **Core Responsibility:**
/// Drive one test case through Setup → Run → Score and produce an immutable
/// `CaseResult`.
///
/// **Scoring Rules:**
/// - BuildFailed: always 0, the run step never happens
/// - Clean run, output matches: full points
/// - Clean run, output mismatches: partial credit if fragments are declared, else 0
/// - RuntimeError / TimedOut / DecodeError: half of full points if the output
///   still matches, else half of the partial credit, else 0
/// - TimedOut and DecodeError never count as a match
///
/// The full-match check always takes precedence over partial fragments.
use crate::comparator::{self, FragmentVerdict};
use crate::engine::{timeout_from_secs, LocalEngine};
use crate::report;
use autograder_common::types::TestCase;
use std::fmt;
use tracing::{info, instrument};

/// Classification of one command's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureKind {
    #[default]
    None,
    BuildFailed,
    TimedOut,
    DecodeError,
    RuntimeError,
}

impl FailureKind {
    /// Whether captured output can be trusted for a full comparison
    fn output_is_complete(&self) -> bool {
        matches!(self, FailureKind::None | FailureKind::RuntimeError)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::None => "ok",
            FailureKind::BuildFailed => "build failed",
            FailureKind::TimedOut => "timed out",
            FailureKind::DecodeError => "decode error",
            FailureKind::RuntimeError => "runtime error",
        };
        f.write_str(label)
    }
}

/// Raw result of running one command.
/// Produced by the engine, consumed immediately by the evaluator.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub failure_kind: FailureKind,
    pub elapsed_seconds: f64,
    pub exit_code: Option<i32>,
    /// Timeout, decode or setup message shown to the student
    pub diagnostic: Option<String>,
}

/// Final, immutable verdict for one test case
#[derive(Debug, Clone)]
pub struct CaseResult<'a> {
    pub test_case: &'a TestCase,
    pub awarded_points: f64,
    pub passed: bool,
    pub failure_kind: FailureKind,
    pub elapsed_seconds: f64,
    pub fragment_verdicts: Vec<FragmentVerdict>,
    pub rendered_feedback: String,
}

/// Evaluate one test case end to end
#[instrument(skip(test, engine), fields(test = %test.name))]
pub async fn evaluate_case<'a>(test: &'a TestCase, engine: &LocalEngine) -> CaseResult<'a> {
    // Setup
    let setup = engine.run_setup(&test.setup_command).await;
    if setup.failure_kind == FailureKind::BuildFailed {
        info!(test = %test.name, "Setup failed; skipping run");
        return score_outcome(test, setup);
    }

    // Run
    let outcome = engine
        .run_target(
            &test.run_command,
            &test.input,
            timeout_from_secs(test.timeout_seconds),
        )
        .await;

    // Score
    score_outcome(test, outcome)
}

/// Score a finished execution. Pure: the same outcome always yields the same result.
pub fn score_outcome(test: &TestCase, outcome: ExecutionOutcome) -> CaseResult<'_> {
    let kind = outcome.failure_kind;

    let matched = kind.output_is_complete()
        && comparator::matches(
            &outcome.stdout,
            &test.expected_output,
            test.comparison_mode,
            test.as_substring,
        );

    let (awarded, verdicts) = match kind {
        FailureKind::BuildFailed => (0.0, Vec::new()),
        FailureKind::None if matched => (test.points, Vec::new()),
        FailureKind::None => partial_credit(test, &outcome.stdout),
        _ if matched => (test.points / 2.0, Vec::new()),
        _ => {
            let (points, verdicts) = partial_credit(test, &outcome.stdout);
            (points / 2.0, verdicts)
        }
    };

    let awarded_points = awarded.clamp(0.0, test.points);
    let passed = kind == FailureKind::None && matched;

    info!(
        test = %test.name,
        failure = %kind,
        matched,
        awarded = awarded_points,
        points = test.points,
        elapsed_ms = (outcome.elapsed_seconds * 1000.0) as u64,
        "Case scored"
    );

    let rendered_feedback = report::render_feedback(test, &outcome, matched, &verdicts);

    CaseResult {
        test_case: test,
        awarded_points,
        passed,
        failure_kind: kind,
        elapsed_seconds: outcome.elapsed_seconds,
        fragment_verdicts: verdicts,
        rendered_feedback,
    }
}

fn partial_credit(test: &TestCase, output: &str) -> (f64, Vec<FragmentVerdict>) {
    if !test.has_partial_credit() {
        return (0.0, Vec::new());
    }
    comparator::partial_score(
        output,
        &test.partial_fragments,
        test.comparison_mode,
        test.points,
    )
}
