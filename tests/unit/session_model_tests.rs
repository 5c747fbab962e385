//! Unit tests for the session state machine and progress accounting.

use fleet_foreman::models::plan::{
    Classification, Complexity, Delegation, StepOutcome, TaskFragment, Urgency,
};
use fleet_foreman::models::session::{
    AgentResult, CoordinationSession, FragmentStatus, Priority, RiskAssessment, RiskLevel,
    SessionMetadata, SessionState,
};

fn metadata() -> SessionMetadata {
    SessionMetadata {
        priority: Priority::Medium,
        estimated_duration_seconds: 900,
        actual_duration_seconds: None,
        resource_utilization: 0.2,
        complexity_factors: vec![],
        risk_assessment: RiskAssessment {
            score: 0.3,
            level: RiskLevel::Low,
            factors: vec![],
        },
    }
}

fn fragment(id: &str) -> TaskFragment {
    TaskFragment {
        id: id.to_owned(),
        description: format!("work on {id}"),
        assigned_worker: "alpha".to_owned(),
        dependencies: vec![],
    }
}

fn session_with(fragments: Vec<TaskFragment>) -> CoordinationSession {
    let classification = Classification {
        category: "analysis".to_owned(),
        urgency: Urgency::Medium,
        complexity: Complexity::Moderate,
        confidence: 0.9,
    };
    let delegation = Delegation {
        team: vec!["alpha".to_owned()],
        task_breakdown: fragments,
        execution_plan: vec![],
    };
    CoordinationSession::new("task".to_owned(), classification, delegation, metadata())
}

// ── State machine ────────────────────────────────────────────

#[test]
fn happy_path_transitions_are_legal() {
    use SessionState::{
        Completed, Coordinating, Executing, Initializing, Integrating, Paused, Planning,
    };

    assert!(Initializing.can_transition_to(Planning));
    assert!(Planning.can_transition_to(Executing));
    assert!(Executing.can_transition_to(Paused));
    assert!(Paused.can_transition_to(Executing));
    assert!(Executing.can_transition_to(Coordinating));
    assert!(Coordinating.can_transition_to(Integrating));
    assert!(Integrating.can_transition_to(Completed));
}

#[test]
fn failed_is_reachable_from_every_active_state() {
    use SessionState::{Coordinating, Executing, Failed, Initializing, Integrating, Paused, Planning};

    for state in [Initializing, Planning, Executing, Paused, Coordinating, Integrating] {
        assert!(state.can_transition_to(Failed), "{state} -> failed");
    }
}

#[test]
fn terminal_states_admit_nothing() {
    use SessionState::{Completed, Executing, Failed};

    for next in [Executing, Completed, Failed] {
        assert!(!Completed.can_transition_to(next));
        assert!(!Failed.can_transition_to(next));
    }
    assert!(Completed.is_terminal());
    assert!(Failed.is_terminal());
}

#[test]
fn pause_is_only_reachable_from_executing() {
    use SessionState::{Coordinating, Initializing, Integrating, Paused, Planning};

    for state in [Initializing, Planning, Coordinating, Integrating] {
        assert!(!state.can_transition_to(Paused), "{state} -> paused");
    }
}

#[test]
fn advance_rejects_illegal_transition() {
    let mut session = session_with(vec![fragment("f1")]);
    let err = session
        .advance(SessionState::Completed)
        .expect_err("initializing cannot complete");
    assert!(err.to_string().contains("cannot move"));
    assert_eq!(session.state, SessionState::Initializing);
}

#[test]
fn advance_updates_last_update() {
    let mut session = session_with(vec![fragment("f1")]);
    let before = session.last_update;
    session.advance(SessionState::Planning).expect("advance");
    assert!(session.last_update >= before);
    assert_eq!(session.state, SessionState::Planning);
}

// ── Results and progress ─────────────────────────────────────

#[test]
fn new_session_has_pending_result_per_fragment() {
    let session = session_with(vec![fragment("f1"), fragment("f2")]);
    assert_eq!(session.results.len(), 2);
    assert!(session
        .results
        .values()
        .all(|r| r.status == FragmentStatus::Pending));
    assert_eq!(session.results["f1"].worker, "alpha");
}

#[test]
fn progress_counts_half_credit_for_in_progress() {
    let mut session = session_with(vec![fragment("f1"), fragment("f2")]);
    if let Some(r) = session.results.get_mut("f1") {
        r.status = FragmentStatus::Completed;
    }
    if let Some(r) = session.results.get_mut("f2") {
        r.status = FragmentStatus::InProgress;
    }

    let progress = session.progress();
    assert!((progress - 0.75).abs() < f64::EPSILON);
}

#[test]
fn progress_of_empty_session_is_one() {
    let session = session_with(vec![]);
    assert!((session.progress() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn failed_fragments_earn_no_progress() {
    let mut session = session_with(vec![fragment("f1"), fragment("f2")]);
    if let Some(r) = session.results.get_mut("f1") {
        r.status = FragmentStatus::Failed;
    }

    assert!((session.progress() - 0.0).abs() < f64::EPSILON);
    assert!(session.any_fragment_failed());
    assert!(!session.all_fragments_terminal());
}

#[test]
fn complete_records_outcome_fields() {
    let mut result = AgentResult::pending(&fragment("f1"));
    result.complete(StepOutcome {
        output: "findings".to_owned(),
        confidence: 0.8,
        follow_up_tasks: vec!["verify".to_owned()],
    });

    assert_eq!(result.status, FragmentStatus::Completed);
    assert_eq!(result.output, "findings");
    assert!((result.confidence - 0.8).abs() < f64::EPSILON);
    assert_eq!(result.follow_up_tasks, vec!["verify".to_owned()]);
    assert!(result.finished_at.is_some());
}

#[test]
fn fail_records_reason_as_output() {
    let mut result = AgentResult::pending(&fragment("f1"));
    result.fail("executor unavailable".to_owned());

    assert_eq!(result.status, FragmentStatus::Failed);
    assert_eq!(result.output, "executor unavailable");
    assert!(result.finished_at.is_some());
}

#[test]
fn record_actual_duration_fills_metadata() {
    let mut session = session_with(vec![fragment("f1")]);
    assert!(session.metadata.actual_duration_seconds.is_none());
    session.record_actual_duration();
    assert!(session.metadata.actual_duration_seconds.is_some());
}
