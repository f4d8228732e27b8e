// Loader for the declared test list (tests/autograding.json)
use crate::types::{BonusRule, ComparisonMode, TestCase, TestSuite};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_TESTS_PATH: &str = "tests/autograding.json";

/// Timeouts in the declared list are given in minutes
const SECONDS_PER_TIMEOUT_UNIT: f64 = 60.0;

#[derive(Debug, Deserialize)]
struct SuiteJson {
    tests: Vec<TestJson>,
    #[serde(default)]
    bonus: Vec<BonusJson>,
}

#[derive(Debug, Deserialize)]
struct TestJson {
    name: String,
    #[serde(default)]
    setup: String,
    run: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    output: String,
    #[serde(default)]
    comparison: Option<String>,
    timeout: f64,
    #[serde(default)]
    points: Option<f64>,
    #[serde(default)]
    partial: Vec<String>,
    #[serde(default)]
    case: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BonusJson {
    date: String,
    points: f64,
}

/// Load and validate a test list from disk
pub fn load(path: &Path) -> Result<TestSuite> {
    if !path.exists() {
        bail!("Test list not found: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse and validate a test list from its JSON text
pub fn parse(content: &str) -> Result<TestSuite> {
    let suite: SuiteJson = serde_json::from_str(content).context("Malformed test list")?;

    let tests = suite
        .tests
        .into_iter()
        .map(into_test_case)
        .collect::<Result<Vec<_>>>()?;

    let bonus = suite
        .bonus
        .into_iter()
        .map(|b| {
            if !b.points.is_finite() || b.points < 0.0 {
                bail!("Bonus for {} has invalid points: {}", b.date, b.points);
            }
            Ok(BonusRule {
                threshold: parse_threshold(&b.date)?,
                points: b.points,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TestSuite { tests, bonus })
}

fn into_test_case(raw: TestJson) -> Result<TestCase> {
    let (comparison_mode, as_substring) = match raw.comparison.as_deref() {
        None | Some("exact") => (ComparisonMode::Exact, false),
        Some("included") => (ComparisonMode::Exact, true),
        Some("regex") => (ComparisonMode::Regex, false),
        Some(other) => bail!("Test '{}' has unknown comparison '{}'", raw.name, other),
    };

    if !raw.timeout.is_finite() || raw.timeout <= 0.0 {
        bail!("Test '{}' must have a positive timeout, got {}", raw.name, raw.timeout);
    }

    let points = raw.points.unwrap_or(0.0);
    if !points.is_finite() || points < 0.0 {
        bail!("Test '{}' has invalid points: {}", raw.name, points);
    }

    Ok(TestCase {
        name: raw.name,
        setup_command: raw.setup,
        run_command: raw.run,
        input: raw.input,
        timeout_seconds: raw.timeout * SECONDS_PER_TIMEOUT_UNIT,
        expected_output: raw.output,
        comparison_mode,
        as_substring,
        points,
        partial_fragments: raw.partial,
        display: raw.case,
    })
}

/// Accepts RFC 3339 instants or bare dates (midnight UTC)
pub fn parse_threshold(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid bonus date '{}'", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid bonus date '{}'", value))?;
    Ok(midnight.and_utc())
}
