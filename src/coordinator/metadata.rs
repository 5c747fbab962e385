//! Session metadata derivation.
//!
//! Computed once when a session is created, from the classification and
//! the delegation. Only `actual_duration_seconds` changes afterwards.

use crate::models::count_f64;
use crate::models::plan::{Classification, Complexity, Delegation, Urgency};
use crate::models::session::{Priority, RiskAssessment, RiskLevel, SessionMetadata};

/// Base duration estimate per complexity tier.
fn base_duration_seconds(complexity: Complexity) -> u64 {
    match complexity {
        Complexity::Low => 300,
        Complexity::Moderate => 900,
        Complexity::High => 1800,
    }
}

/// Priority from weighted urgency (double weight) plus complexity.
fn priority_for(urgency: Urgency, complexity: Complexity) -> Priority {
    match urgency.score() * 2 + complexity.score() {
        9.. => Priority::Critical,
        7..=8 => Priority::High,
        5..=6 => Priority::Medium,
        _ => Priority::Low,
    }
}

/// Weighted risk score over complexity, team size, urgency, and
/// classifier confidence.
fn assess_risk(classification: &Classification, team_size: usize) -> RiskAssessment {
    let confidence = classification.confidence.clamp(0.0, 1.0);
    let complexity_factor = f64::from(classification.complexity.score()) / 3.0;
    let team_factor = (count_f64(team_size) / 5.0).min(1.0);
    let urgency_factor = f64::from(classification.urgency.score()) / 4.0;

    let score = 0.3 * complexity_factor
        + 0.2 * team_factor
        + 0.2 * urgency_factor
        + 0.3 * (1.0 - confidence);

    let level = if score >= 0.7 {
        RiskLevel::High
    } else if score >= 0.4 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    let mut factors = Vec::new();
    if classification.complexity == Complexity::High {
        factors.push("high complexity".to_owned());
    }
    if team_size > 3 {
        factors.push("large team".to_owned());
    }
    if classification.urgency >= Urgency::High {
        factors.push("elevated urgency".to_owned());
    }
    if confidence < 0.5 {
        factors.push("low classifier confidence".to_owned());
    }

    RiskAssessment {
        score,
        level,
        factors,
    }
}

/// Derive the full metadata block for a new session.
///
/// `ceiling` is the configured concurrent-session limit; resource
/// utilization is the team size over that ceiling, clamped to 1.0.
#[must_use]
pub fn compute(
    classification: &Classification,
    delegation: &Delegation,
    ceiling: usize,
) -> SessionMetadata {
    let team_size = delegation.team.len().max(1);

    // +20% estimated duration per worker beyond the first, in integer
    // arithmetic to keep the estimate exact.
    let extra_workers = u64::try_from(team_size - 1).unwrap_or(0);
    let estimated_duration_seconds =
        base_duration_seconds(classification.complexity) * (10 + 2 * extra_workers) / 10;

    let resource_utilization =
        (count_f64(team_size) / count_f64(ceiling.max(1))).min(1.0);

    let mut complexity_factors = vec![format!(
        "{} fragments",
        delegation.task_breakdown.len()
    )];
    if delegation.execution_plan.iter().any(|s| s.parallel) {
        complexity_factors.push("parallel execution".to_owned());
    }
    complexity_factors.push(format!("{team_size}-worker team"));

    SessionMetadata {
        priority: priority_for(classification.urgency, classification.complexity),
        estimated_duration_seconds,
        actual_duration_seconds: None,
        resource_utilization,
        complexity_factors,
        risk_assessment: assess_risk(classification, team_size),
    }
}
