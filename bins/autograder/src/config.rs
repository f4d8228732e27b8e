// Harness configuration: command-line flags with environment fallbacks
use crate::clock::ReferenceSource;
use anyhow::{bail, Result};
use autograder_common::suite::DEFAULT_TESTS_PATH;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "autograder")]
#[command(
    about = "Run declared test cases against a submission and score the results",
    long_about = None
)]
pub struct Args {
    /// Path to the declared test list
    #[arg(short, long, env = "AUTOGRADER_TESTS", default_value = DEFAULT_TESTS_PATH)]
    pub tests: PathBuf,

    /// Write the `awarded/available` score to this file
    #[arg(short, long, env = "AUTOGRADER_SCORE_FILE")]
    pub score_file: Option<PathBuf>,

    /// Use this commit's author time as the reference for bonus rules
    #[arg(long, env = "AUTOGRADER_COMMIT", conflicts_with = "at")]
    pub commit: Option<String>,

    /// Use this RFC 3339 instant as the reference for bonus rules
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,

    /// Maximum seconds a setup command may run
    #[arg(long, env = "AUTOGRADER_SETUP_TIMEOUT", default_value_t = 600.0)]
    pub setup_timeout: f64,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    pub log_json: bool,
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {}", e))
}

/// Validated settings for one grading run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub tests_path: PathBuf,
    pub score_file: Option<PathBuf>,
    pub reference: ReferenceSource,
    pub setup_timeout: Duration,
}

impl HarnessConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let setup_timeout = match Duration::try_from_secs_f64(args.setup_timeout) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => bail!(
                "Setup timeout must be a positive number of seconds, got {}",
                args.setup_timeout
            ),
        };

        let reference = match (args.at, args.commit) {
            (Some(instant), _) => ReferenceSource::At(instant),
            (None, Some(rev)) => ReferenceSource::Commit(rev),
            (None, None) => ReferenceSource::Now,
        };

        Ok(Self {
            tests_path: args.tests,
            score_file: args.score_file,
            reference,
            setup_timeout,
        })
    }
}
