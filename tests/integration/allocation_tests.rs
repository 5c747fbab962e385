//! Integration tests for the cross-session summary and workload
//! allocation advisories.

use std::sync::Arc;
use std::time::Duration;

use fleet_foreman::config::CoordinatorConfig;

use super::test_helpers::{
    coordinator_with, delegation, fragment, step, RecordingExecutor,
};

#[tokio::test]
async fn active_summary_counts_sessions_and_states() {
    let plan = delegation(
        &["alpha"],
        vec![fragment("f1", "alpha", "slow work", &[])],
        vec![step("alpha", "slow work", &[], false)],
    );
    let executor = Arc::new(RecordingExecutor::new(Duration::from_secs(3)));
    let coordinator = coordinator_with(CoordinatorConfig::default(), plan, executor);

    let a = coordinator.coordinate("task A").await.expect("a");
    let b = coordinator.coordinate("task B").await.expect("b");

    let summary = coordinator.get_active_summary().await;
    assert_eq!(summary.total_active, 2);
    assert_eq!(summary.by_state.get("executing"), Some(&2));
    assert!(summary.average_resource_utilization > 0.0);
    assert!(summary.average_progress < 1.0);

    coordinator.cancel(&a.id).await.expect("cancel a");
    coordinator.cancel(&b.id).await.expect("cancel b");

    let summary = coordinator.get_active_summary().await;
    assert_eq!(summary.total_active, 0);
    assert!(summary.by_state.is_empty());
}

#[tokio::test]
async fn lopsided_worker_load_is_flagged_as_overutilized() {
    // Four open fragments on alpha against one on beta: alpha's load is
    // well past 1.5x the mean of 2.5.
    let plan = delegation(
        &["alpha", "beta"],
        vec![
            fragment("a1", "alpha", "one", &[]),
            fragment("a2", "alpha", "two", &["a1"]),
            fragment("a3", "alpha", "three", &["a2"]),
            fragment("a4", "alpha", "four", &["a3"]),
            fragment("b1", "beta", "lone", &[]),
        ],
        vec![
            step("alpha", "one", &[], false),
            step("alpha", "two", &["a1"], false),
            step("alpha", "three", &["a2"], false),
            step("alpha", "four", &["a3"], false),
            step("beta", "lone", &[], false),
        ],
    );
    let executor = Arc::new(RecordingExecutor::new(Duration::from_secs(2)));
    let coordinator = coordinator_with(CoordinatorConfig::default(), plan, executor);

    let session = coordinator.coordinate("lopsided").await.expect("coordinate");

    let report = coordinator.optimize_allocation().await;
    assert!(report
        .overutilized_workers
        .contains(&"alpha".to_owned()));
    assert!(!report.overutilized_workers.contains(&"beta".to_owned()));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("alpha")));

    coordinator.cancel(&session.id).await.expect("cancel");
}

#[tokio::test]
async fn stagnant_session_is_flagged_after_the_threshold() {
    let plan = delegation(
        &["alpha"],
        vec![fragment("f1", "alpha", "slow work", &[])],
        vec![step("alpha", "slow work", &[], false)],
    );
    let config = CoordinatorConfig {
        stale_after_seconds: 1,
        ..CoordinatorConfig::default()
    };
    let executor = Arc::new(RecordingExecutor::new(Duration::from_secs(10)));
    let coordinator = coordinator_with(config, plan, executor);

    let session = coordinator.coordinate("stuck").await.expect("coordinate");

    // Fresh session: not stagnant yet.
    let report = coordinator.optimize_allocation().await;
    assert!(report.stagnant_sessions.is_empty());

    // The only step stays in flight with no updates past the threshold.
    tokio::time::sleep(Duration::from_millis(1400)).await;
    let report = coordinator.optimize_allocation().await;
    assert!(report.stagnant_sessions.contains(&session.id));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("no progress")));

    coordinator.cancel(&session.id).await.expect("cancel");
}

#[tokio::test]
async fn efficiency_score_is_mean_progress() {
    let plan = delegation(
        &["alpha"],
        vec![fragment("f1", "alpha", "slow work", &[])],
        vec![step("alpha", "slow work", &[], false)],
    );
    let executor = Arc::new(RecordingExecutor::new(Duration::from_secs(3)));
    let coordinator = coordinator_with(CoordinatorConfig::default(), plan, executor);

    // No active sessions: score degrades to zero.
    let report = coordinator.optimize_allocation().await;
    assert!((report.efficiency_score - 0.0).abs() < f64::EPSILON);

    // One session with its only fragment in flight: progress 0.5.
    let session = coordinator.coordinate("half way").await.expect("coordinate");
    tokio::time::sleep(Duration::from_millis(150)).await;
    let report = coordinator.optimize_allocation().await;
    assert!((report.efficiency_score - 0.5).abs() < f64::EPSILON);

    coordinator.cancel(&session.id).await.expect("cancel");
}
