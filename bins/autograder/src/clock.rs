// Reference timestamp used for bonus evaluation
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSource {
    /// Current wall-clock time
    Now,
    /// Explicit instant
    At(DateTime<Utc>),
    /// Author time of a git revision
    Commit(String),
}

pub async fn reference_timestamp(source: &ReferenceSource) -> Result<DateTime<Utc>> {
    match source {
        ReferenceSource::Now => Ok(Utc::now()),
        ReferenceSource::At(instant) => Ok(*instant),
        ReferenceSource::Commit(rev) => commit_author_time(rev).await,
    }
}

async fn commit_author_time(rev: &str) -> Result<DateTime<Utc>> {
    let output = Command::new("git")
        .args(["show", "-s", "--format=%aI", rev])
        .output()
        .await
        .context("Failed to run git")?;

    if !output.status.success() {
        bail!(
            "git could not resolve commit '{}': {}",
            rev,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8(output.stdout).context("git printed a non-UTF-8 date")?;
    let instant = parse_git_timestamp(&stdout)
        .with_context(|| format!("Unexpected author date for commit '{}'", rev))?;
    debug!(rev = rev, author_time = %instant, "Resolved commit time");
    Ok(instant)
}

/// Parse git's strict ISO 8601 (`%aI`) output
pub fn parse_git_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    let instant = DateTime::parse_from_rfc3339(trimmed)
        .with_context(|| format!("Not an ISO 8601 timestamp: '{}'", trimmed))?;
    Ok(instant.with_timezone(&Utc))
}
