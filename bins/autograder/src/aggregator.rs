/// Score Aggregator - Final Totals and Bonus
///
/// **Rules:**
/// - total_available = sum of every case's points, whatever the outcomes
/// - total_awarded = sum of awarded points, plus at most one bonus
/// - Bonus rules are checked in declared order; the first whose threshold is
///   strictly after the reference time applies and the rest are ignored
/// - Success iff total_awarded >= total_available (bonus included)
use crate::evaluator::CaseResult;
use autograder_common::types::BonusRule;
use chrono::{DateTime, Utc};
use tracing::info;

/// Terminal summary of one grading run
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub total_awarded: f64,
    pub total_available: f64,
    pub bonus_applied: Option<f64>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.total_awarded >= self.total_available
    }

    /// `awarded/available` with two decimals, as written to the score file
    pub fn format_score(&self) -> String {
        format!("{:.2}/{:.2}", self.total_awarded, self.total_available)
    }
}

/// Pick the first rule whose threshold is still in the future relative to `reference`
pub fn select_bonus(bonus_rules: &[BonusRule], reference: DateTime<Utc>) -> Option<&BonusRule> {
    bonus_rules.iter().find(|rule| reference < rule.threshold)
}

pub fn aggregate(
    results: &[CaseResult<'_>],
    bonus_rules: &[BonusRule],
    reference: DateTime<Utc>,
) -> Report {
    let awarded: f64 = results.iter().map(|r| r.awarded_points).sum();
    let total_available: f64 = results.iter().map(|r| r.test_case.points).sum();

    let bonus_applied = select_bonus(bonus_rules, reference).map(|rule| rule.points);
    let total_awarded = awarded + bonus_applied.unwrap_or(0.0);

    info!(
        cases = results.len(),
        awarded = total_awarded,
        available = total_available,
        bonus = ?bonus_applied,
        reference = %reference,
        "Aggregation complete"
    );

    Report {
        total_awarded,
        total_available,
        bonus_applied,
    }
}
