//! Unit tests for session metadata derivation.

use fleet_foreman::coordinator::metadata;
use fleet_foreman::models::plan::{
    Classification, Complexity, Delegation, ExecutionStep, TaskFragment, Urgency,
};
use fleet_foreman::models::session::{Priority, RiskLevel};

fn classification(urgency: Urgency, complexity: Complexity, confidence: f64) -> Classification {
    Classification {
        category: "analysis".to_owned(),
        urgency,
        complexity,
        confidence,
    }
}

fn delegation(team: &[&str], parallel_steps: bool) -> Delegation {
    let fragments: Vec<TaskFragment> = team
        .iter()
        .enumerate()
        .map(|(i, worker)| TaskFragment {
            id: format!("f{i}"),
            description: format!("step {i}"),
            assigned_worker: (*worker).to_owned(),
            dependencies: vec![],
        })
        .collect();
    let steps: Vec<ExecutionStep> = fragments
        .iter()
        .map(|f| ExecutionStep {
            worker: f.assigned_worker.clone(),
            action: f.description.clone(),
            dependencies: vec![],
            parallel: parallel_steps,
        })
        .collect();
    Delegation {
        team: team.iter().map(|w| (*w).to_owned()).collect(),
        task_breakdown: fragments,
        execution_plan: steps,
    }
}

#[test]
fn low_urgency_low_complexity_is_low_priority() {
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Low, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    assert_eq!(meta.priority, Priority::Low);
}

#[test]
fn critical_urgency_is_critical_priority() {
    let meta = metadata::compute(
        &classification(Urgency::Critical, Complexity::Low, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    assert_eq!(meta.priority, Priority::Critical);
}

#[test]
fn medium_urgency_moderate_complexity_is_medium_priority() {
    let meta = metadata::compute(
        &classification(Urgency::Medium, Complexity::Moderate, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    assert_eq!(meta.priority, Priority::Medium);
}

#[test]
fn high_urgency_weighs_double() {
    // urgency 3 * 2 + complexity 1 = 7 -> High.
    let meta = metadata::compute(
        &classification(Urgency::High, Complexity::Low, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    assert_eq!(meta.priority, Priority::High);
}

#[test]
fn duration_scales_with_complexity_tier() {
    let low = metadata::compute(
        &classification(Urgency::Low, Complexity::Low, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    let high = metadata::compute(
        &classification(Urgency::Low, Complexity::High, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    assert_eq!(low.estimated_duration_seconds, 300);
    assert_eq!(high.estimated_duration_seconds, 1800);
}

#[test]
fn duration_scales_with_team_size() {
    // Moderate base 900s, 3 workers -> 900 * 1.4 = 1260.
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Moderate, 0.9),
        &delegation(&["alpha", "beta", "gamma"], false),
        10,
    );
    assert_eq!(meta.estimated_duration_seconds, 1260);
}

#[test]
fn resource_utilization_is_team_over_ceiling() {
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Low, 0.9),
        &delegation(&["alpha", "beta"], false),
        10,
    );
    assert!((meta.resource_utilization - 0.2).abs() < f64::EPSILON);
}

#[test]
fn resource_utilization_clamps_at_one() {
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Low, 0.9),
        &delegation(&["a", "b", "c", "d"], false),
        2,
    );
    assert!((meta.resource_utilization - 1.0).abs() < f64::EPSILON);
}

#[test]
fn risk_is_low_for_easy_confident_task() {
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Low, 0.95),
        &delegation(&["alpha"], false),
        10,
    );
    assert_eq!(meta.risk_assessment.level, RiskLevel::Low);
    assert!(meta.risk_assessment.score < 0.4);
}

#[test]
fn risk_is_high_for_complex_urgent_uncertain_task() {
    let meta = metadata::compute(
        &classification(Urgency::Critical, Complexity::High, 0.2),
        &delegation(&["a", "b", "c", "d", "e"], false),
        10,
    );
    assert_eq!(meta.risk_assessment.level, RiskLevel::High);
    assert!(meta.risk_assessment.score >= 0.7);
    assert!(meta.risk_assessment.score <= 1.0);
    assert!(meta
        .risk_assessment
        .factors
        .contains(&"high complexity".to_owned()));
    assert!(meta
        .risk_assessment
        .factors
        .contains(&"low classifier confidence".to_owned()));
}

#[test]
fn complexity_factors_name_fragments_and_parallelism() {
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Moderate, 0.9),
        &delegation(&["alpha", "beta"], true),
        10,
    );
    assert!(meta
        .complexity_factors
        .contains(&"2 fragments".to_owned()));
    assert!(meta
        .complexity_factors
        .contains(&"parallel execution".to_owned()));
    assert!(meta
        .complexity_factors
        .contains(&"2-worker team".to_owned()));
}

#[test]
fn actual_duration_starts_empty() {
    let meta = metadata::compute(
        &classification(Urgency::Low, Complexity::Low, 0.9),
        &delegation(&["alpha"], false),
        10,
    );
    assert!(meta.actual_duration_seconds.is_none());
}
