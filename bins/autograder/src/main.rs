mod aggregator;
mod clock;
mod comparator;
mod config;
mod engine;
#[cfg(test)]
mod engine_tests;
mod evaluator;
mod executor;
mod report;

use aggregator::Report;
use anyhow::Context;
use clap::Parser;
use config::{Args, HarnessConfig};
use engine::LocalEngine;
use std::process::ExitCode;
use tracing::{error, info};

/// Exit code for errors that prevent any case from running
const EXIT_FATAL: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    exit_code(run(args).await)
}

/// Map the run's result to the process exit status. Fatal errors are reported
/// once, through the stderr log.
fn exit_code(result: anyhow::Result<Report>) -> ExitCode {
    match result {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Grading aborted");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // stdout is reserved for the grading report
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Args) -> anyhow::Result<Report> {
    let config = HarnessConfig::from_args(args)?;

    info!("Autograder booting...");

    let suite = autograder_common::suite::load(&config.tests_path)?;
    info!(
        path = %config.tests_path.display(),
        tests = suite.tests.len(),
        bonus_rules = suite.bonus.len(),
        "Loaded test list"
    );

    let reference = clock::reference_timestamp(&config.reference)
        .await
        .context("Failed to determine reference time")?;
    info!(reference = %reference, source = ?config.reference, "Reference time resolved");

    let engine = LocalEngine::new(config.setup_timeout);
    let results = executor::execute_suite(&suite, &engine).await;

    let report = aggregator::aggregate(&results, &suite.bonus, reference);

    println!();
    print!("{}", report::render_summary(&report));

    if let Some(path) = &config.score_file {
        report::write_score_file(path, &report)?;
        info!(path = %path.display(), score = %report.format_score(), "Score written");
    }

    Ok(report)
}
