//! Step dispatch engine.
//!
//! One driver task per session runs an explicit loop: select eligible
//! steps, dispatch the parallel group concurrently, then sequential
//! steps in plan order, and re-evaluate. A step blocked on a dependency
//! becomes eligible in the round after that dependency completes.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collaborators::StepExecutor;
use super::{archive, CoordinatorInner};
use crate::models::session::{CoordinationSession, FragmentStatus, SessionState};

/// Everything a session driver task needs, detached from the
/// coordinator so the task owns no `&self`.
pub(crate) struct DriverContext {
    pub(crate) inner: Arc<Mutex<CoordinatorInner>>,
    pub(crate) executor: Arc<dyn StepExecutor>,
    pub(crate) session_id: String,
    pub(crate) history_capacity: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) resume: Arc<Notify>,
}

/// One selected step, resolved to its fragment.
struct PlannedStep {
    fragment_id: String,
    worker: String,
    action: String,
}

enum Round {
    /// Session is paused; wait for resume.
    Paused,
    /// Steps to dispatch this round.
    Dispatch {
        parallel: Vec<PlannedStep>,
        sequential: Vec<PlannedStep>,
    },
    /// Nothing eligible and nothing in flight; decide the terminal state.
    Settle,
}

/// Drive one session to a terminal state.
pub(crate) async fn drive_session(ctx: DriverContext) {
    loop {
        if ctx.cancel.is_cancelled() {
            return;
        }

        let round = {
            let inner = ctx.inner.lock().await;
            let Some(cell) = inner.active.get(&ctx.session_id) else {
                // Cancelled and archived between rounds.
                return;
            };
            match cell.session.state {
                SessionState::Paused => Round::Paused,
                SessionState::Executing => select_round(&cell.session),
                _ => return,
            }
        };

        match round {
            Round::Paused => {
                tokio::select! {
                    () = ctx.cancel.cancelled() => return,
                    () = ctx.resume.notified() => {}
                }
            }
            Round::Settle => {
                settle(&ctx).await;
                return;
            }
            Round::Dispatch {
                parallel,
                sequential,
            } => {
                // Dropping the batch on cancellation abandons in-flight
                // executor futures; their results are never recorded.
                let batch = run_batch(&ctx, parallel, sequential);
                tokio::select! {
                    () = ctx.cancel.cancelled() => return,
                    () = batch => {}
                }
            }
        }
    }
}

/// Select every step whose fragment is still pending and whose
/// dependencies (step-listed and fragment-listed) are all completed,
/// partitioned into parallel and sequential groups in plan order.
fn select_round(session: &CoordinationSession) -> Round {
    let mut parallel = Vec::new();
    let mut sequential = Vec::new();

    for step in &session.delegation.execution_plan {
        let Some(fragment) = session.delegation.paired_fragment(step) else {
            continue;
        };
        let Some(result) = session.results.get(&fragment.id) else {
            continue;
        };
        if result.status != FragmentStatus::Pending {
            continue;
        }
        let deps_met = step
            .dependencies
            .iter()
            .chain(fragment.dependencies.iter())
            .all(|dep| {
                session
                    .results
                    .get(dep)
                    .is_some_and(|r| r.status == FragmentStatus::Completed)
            });
        if !deps_met {
            continue;
        }

        let planned = PlannedStep {
            fragment_id: fragment.id.clone(),
            worker: step.worker.clone(),
            action: step.action.clone(),
        };
        if step.parallel {
            parallel.push(planned);
        } else {
            sequential.push(planned);
        }
    }

    if parallel.is_empty() && sequential.is_empty() {
        Round::Settle
    } else {
        Round::Dispatch {
            parallel,
            sequential,
        }
    }
}

/// Dispatch the parallel group concurrently, then sequential steps one
/// at a time in plan order.
async fn run_batch(ctx: &DriverContext, parallel: Vec<PlannedStep>, sequential: Vec<PlannedStep>) {
    if !parallel.is_empty() {
        join_all(parallel.into_iter().map(|step| dispatch_step(ctx, step))).await;
    }
    for step in sequential {
        dispatch_step(ctx, step).await;
    }
}

/// Dispatch one step: mark the fragment in-progress, invoke the
/// executor, record the outcome. The outcome is discarded when the
/// session was cancelled while the step was in flight.
async fn dispatch_step(ctx: &DriverContext, step: PlannedStep) {
    {
        let mut inner = ctx.inner.lock().await;
        let Some(cell) = inner.active.get_mut(&ctx.session_id) else {
            return;
        };
        let session = &mut cell.session;
        let Some(result) = session.results.get_mut(&step.fragment_id) else {
            return;
        };
        result.status = FragmentStatus::InProgress;
        result.started_at = Some(Utc::now());
        session.current_step = Some(format!("{}: {}", step.worker, step.action));
        session.last_update = Utc::now();
    }
    debug!(fragment = %step.fragment_id, worker = %step.worker, "dispatching step");

    let outcome = ctx.executor.execute(&step.worker, &step.action).await;

    let mut inner = ctx.inner.lock().await;
    let Some(cell) = inner.active.get_mut(&ctx.session_id) else {
        debug!(fragment = %step.fragment_id, "session archived mid-flight, result discarded");
        return;
    };
    let session = &mut cell.session;
    let Some(result) = session.results.get_mut(&step.fragment_id) else {
        return;
    };
    match outcome {
        Ok(outcome) => {
            result.complete(outcome);
            debug!(fragment = %step.fragment_id, "step completed");
        }
        Err(err) => {
            result.fail(err.to_string());
            warn!(fragment = %step.fragment_id, %err, "step failed");
        }
    }
    session.last_update = Utc::now();
}

/// No step is eligible and none is in flight: close the session out.
///
/// With cycles rejected at creation, a non-terminal fragment here can
/// only be blocked by a failed dependency; it is marked failed so a
/// terminal session never holds non-terminal fragments.
async fn settle(ctx: &DriverContext) {
    let mut inner = ctx.inner.lock().await;
    let Some(mut cell) = inner.active.remove(&ctx.session_id) else {
        return;
    };
    let session = &mut cell.session;

    let blocked: Vec<String> = session
        .results
        .values()
        .filter(|r| !r.status.is_terminal())
        .map(|r| r.fragment_id.clone())
        .collect();
    for fragment_id in &blocked {
        // A culprit is a dependency that failed outright or is itself
        // blocked (and about to be failed in this same pass).
        let culprits = blocking_dependencies(session, fragment_id, &blocked);
        if let Some(result) = session.results.get_mut(fragment_id) {
            warn!(fragment = %fragment_id, "fragment blocked by failed dependency");
            result.fail(format!(
                "blocked by failed dependency: {}",
                culprits.join(", ")
            ));
        }
    }

    if session.any_fragment_failed() {
        if let Err(err) = session.advance(SessionState::Failed) {
            warn!(session_id = %session.id, %err, "forcing terminal state at settle");
            session.state = SessionState::Failed;
        }
        warn!(session_id = %session.id, "session failed");
    } else {
        let completed = transition_chain(
            session,
            &[
                SessionState::Coordinating,
                SessionState::Integrating,
                SessionState::Completed,
            ],
        );
        if completed {
            session.current_step = Some(format!(
                "integrated {} fragment results",
                session.results.len()
            ));
            info!(session_id = %session.id, "session completed");
        }
    }

    session.record_actual_duration();
    let capacity = ctx.history_capacity;
    archive(&mut inner, cell.session, capacity);
}

/// Advance through a chain of states, logging (and stopping) on an
/// illegal hop.
fn transition_chain(session: &mut CoordinationSession, states: &[SessionState]) -> bool {
    for state in states {
        if let Err(err) = session.advance(*state) {
            warn!(session_id = %session.id, %err, "unexpected transition failure");
            return false;
        }
    }
    true
}

/// The dependencies of one fragment that prevented it from running:
/// failed outright, or blocked alongside it.
fn blocking_dependencies(
    session: &CoordinationSession,
    fragment_id: &str,
    blocked: &[String],
) -> Vec<String> {
    let Some(result) = session.results.get(fragment_id) else {
        return Vec::new();
    };
    result
        .dependencies
        .iter()
        .filter(|dep| {
            blocked.contains(*dep)
                || session
                    .results
                    .get(dep.as_str())
                    .is_some_and(|r| r.status == FragmentStatus::Failed)
        })
        .cloned()
        .collect()
}
