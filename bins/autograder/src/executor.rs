/// Suite Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Run every declared case in order through the evaluator, print each
/// result as soon as it is known, and hand the collected results back for
/// aggregation.
///
/// Cases run strictly one at a time: no state is shared between them, and
/// sequential execution keeps console output deterministic. A failing case
/// never stops the run.
use crate::engine::LocalEngine;
use crate::evaluator::{evaluate_case, CaseResult, FailureKind};
use crate::report;
use autograder_common::types::TestSuite;
use std::io::Write;
use tracing::{info, warn};

pub async fn execute_suite<'a>(suite: &'a TestSuite, engine: &LocalEngine) -> Vec<CaseResult<'a>> {
    let mut results = Vec::with_capacity(suite.tests.len());

    info!(
        test_count = suite.tests.len(),
        available = suite.available_points(),
        bonus_rules = suite.bonus.len(),
        "Starting test run"
    );

    for (idx, test) in suite.tests.iter().enumerate() {
        info!(
            test_num = idx + 1,
            test = %test.name,
            mode = %test.comparison_mode,
            "Running test"
        );

        let result = evaluate_case(test, engine).await;

        match result.failure_kind {
            FailureKind::None => {}
            FailureKind::BuildFailed => warn!(test = %test.name, "Setup failed; case scored 0"),
            kind => warn!(
                test = %test.name,
                failure = %kind,
                elapsed_ms = (result.elapsed_seconds * 1000.0) as u64,
                "Run did not complete cleanly"
            ),
        }
        if !result.fragment_verdicts.is_empty() {
            let found = result.fragment_verdicts.iter().filter(|v| v.matched).count();
            info!(
                test = %test.name,
                found,
                declared = result.fragment_verdicts.len(),
                "Partial credit applied"
            );
        }

        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout);
        let _ = write!(stdout, "{}", report::render_case(&result));
        let _ = stdout.flush();

        results.push(result);
    }

    info!(completed = results.len(), "All test cases executed");
    results
}
