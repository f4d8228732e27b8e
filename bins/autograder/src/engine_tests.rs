/// Integration tests for the local process engine
///
/// These tests spawn real `sh` processes and verify:
/// 1. Clean runs capture stdout and stderr separately
/// 2. Input is fed, and an absent input closes stdin
/// 3. Timeouts kill the whole process group without hanging
/// 4. Invalid UTF-8 output is classified as a decode error
/// 5. Setup failures short-circuit the case with zero points
/// 6. Output written before exit survives descendants that outlive the group

#[cfg(test)]
mod local_engine_tests {
    use crate::engine::{timeout_from_secs, LocalEngine};
    use crate::evaluator::{evaluate_case, FailureKind};
    use autograder_common::types::{ComparisonMode, TestCase};
    use std::time::{Duration, Instant};

    fn engine() -> LocalEngine {
        LocalEngine::new(Duration::from_secs(30))
    }

    fn make_test_case(run: &str, expected: &str, points: f64) -> TestCase {
        TestCase {
            name: run.to_string(),
            setup_command: String::new(),
            run_command: run.to_string(),
            input: String::new(),
            timeout_seconds: 10.0,
            expected_output: expected.to_string(),
            comparison_mode: ComparisonMode::Exact,
            as_substring: false,
            points,
            partial_fragments: Vec::new(),
            display: None,
        }
    }

    #[tokio::test]
    async fn test_clean_run_captures_stdout() {
        let outcome = engine()
            .run_target("echo hello", "", Duration::from_secs(10))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.elapsed_seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_stderr_is_runtime_error_and_kept_separate() {
        let outcome = engine()
            .run_target("echo out; echo err >&2", "", Duration::from_secs(10))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::RuntimeError);
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_is_clean() {
        let outcome = engine()
            .run_target("echo partial; exit 3", "", Duration::from_secs(10))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_input_is_fed() {
        let outcome = engine()
            .run_target("cat", "line one\nline two\n", Duration::from_secs(10))
            .await;

        assert_eq!(outcome.stdout, "line one\nline two\n");
    }

    #[tokio::test]
    async fn test_empty_input_closes_stdin() {
        let start = Instant::now();
        let outcome = engine().run_target("cat", "", Duration::from_secs(10)).await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.stdout, "");
        assert!(start.elapsed() < Duration::from_secs(5), "cat should see EOF at once");
    }

    #[tokio::test]
    async fn test_unread_input_is_not_an_error() {
        let outcome = engine()
            .run_target("echo done", &"x".repeat(1 << 20), Duration::from_secs(10))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let start = Instant::now();
        let outcome = engine()
            .run_target("sleep 30", "", Duration::from_millis(500))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(outcome.elapsed_seconds >= 0.5);
        assert!(outcome.diagnostic.unwrap().contains("0.5 seconds"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let outcome = engine()
            .run_target("echo partial; sleep 30", "", Duration::from_secs(1))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::TimedOut);
        assert_eq!(outcome.stdout, "partial\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_background_descendants() {
        // The background sleep holds stdout open; only a group kill releases it
        let start = Instant::now();
        let outcome = engine()
            .run_target("sleep 30 & sleep 30", "", Duration::from_millis(300))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_normal_exit_kills_background_descendants() {
        // The shell exits at once but its background child keeps stdout open
        let start = Instant::now();
        let outcome = engine()
            .run_target("sleep 30 & echo hello", "", Duration::from_secs(10))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.stdout, "hello\n");
        // Well under the pipe drain grace: EOF came from the group kill
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_output_kept_when_detached_daemon_holds_pipe() {
        // setsid escapes the process group, so the pipe never reaches EOF
        let start = Instant::now();
        let outcome = engine()
            .run_target("setsid sleep 5 & sleep 0.3; echo hello", "", Duration::from_secs(5))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.stdout, "hello\n");
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_setup_output_kept_when_detached_daemon_holds_pipe() {
        let start = Instant::now();
        let outcome = engine()
            .run_setup("setsid sleep 5 & sleep 0.3; echo built")
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert!(outcome.stdout.contains("built"));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_conversion_saturates() {
        assert_eq!(timeout_from_secs(2.5), Duration::from_millis(2500));
        assert_eq!(timeout_from_secs(6e19), Duration::MAX);
        assert_eq!(timeout_from_secs(f64::INFINITY), Duration::MAX);
        assert_eq!(timeout_from_secs(0.0), Duration::ZERO);
        assert_eq!(timeout_from_secs(-1.0), Duration::ZERO);
        assert_eq!(timeout_from_secs(f64::NAN), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decode_error() {
        let outcome = engine()
            .run_target("printf 'ok\\377\\376'", "", Duration::from_secs(10))
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::DecodeError);
        assert_eq!(outcome.stdout, "");
        assert!(outcome.diagnostic.unwrap().contains("initialization"));
    }

    #[tokio::test]
    async fn test_setup_success() {
        let outcome = engine().run_setup("echo building").await;

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.stdout, "building\n");
    }

    #[tokio::test]
    async fn test_empty_setup_is_noop() {
        let outcome = engine().run_setup("   ").await;
        assert_eq!(outcome.failure_kind, FailureKind::None);
    }

    #[tokio::test]
    async fn test_setup_failure_merges_streams() {
        let outcome = engine()
            .run_setup("echo compiling; echo 'main.c:3: error' >&2; exit 1")
            .await;

        assert_eq!(outcome.failure_kind, FailureKind::BuildFailed);
        assert!(outcome.stdout.contains("compiling"));
        assert!(outcome.stdout.contains("main.c:3: error"));
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_setup_timeout_is_build_failure() {
        let engine = LocalEngine::new(Duration::from_millis(300));
        let outcome = engine.run_setup("sleep 30").await;

        assert_eq!(outcome.failure_kind, FailureKind::BuildFailed);
        assert!(outcome.diagnostic.unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_echo_hello_end_to_end() {
        let test = make_test_case("echo hello", "hello\n", 10.0);
        let result = evaluate_case(&test, &engine()).await;

        assert_eq!(result.awarded_points, 10.0);
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_warning_on_stderr_halves_credit() {
        let test = make_test_case("echo hello; echo 'warning: leak' >&2", "hello\n", 10.0);
        let result = evaluate_case(&test, &engine()).await;

        assert_eq!(result.awarded_points, 5.0);
        assert!(!result.passed);
        assert_eq!(result.failure_kind, FailureKind::RuntimeError);
    }

    #[tokio::test]
    async fn test_build_failure_skips_run() {
        let mut test = make_test_case("echo hello", "hello\n", 10.0);
        test.setup_command = "echo broken >&2; exit 2".to_string();
        let result = evaluate_case(&test, &engine()).await;

        assert_eq!(result.awarded_points, 0.0);
        assert_eq!(result.failure_kind, FailureKind::BuildFailed);
        assert!(result.rendered_feedback.contains("broken"));
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_expire_immediately() {
        // 1e18 minutes, as declared in a test list
        let mut test = make_test_case("sleep 0.2; echo hello", "hello\n", 10.0);
        test.timeout_seconds = 6e19;

        let result = evaluate_case(&test, &engine()).await;

        assert_eq!(result.failure_kind, FailureKind::None);
        assert_eq!(result.awarded_points, 10.0);
    }

    #[tokio::test]
    async fn test_timed_out_case_earns_halved_partial() {
        let mut test = make_test_case("echo first; sleep 30", "first\nsecond\n", 4.0);
        test.timeout_seconds = 0.5;
        test.partial_fragments = vec!["first".to_string(), "second".to_string()];

        let result = evaluate_case(&test, &engine()).await;

        assert_eq!(result.failure_kind, FailureKind::TimedOut);
        assert_eq!(result.awarded_points, 1.0);
    }
}
