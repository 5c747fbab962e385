//! Coordination session manager.
//!
//! Owns every active [`CoordinationSession`] and the bounded history of
//! terminal ones. Session creation enforces the concurrency ceiling and
//! validates the delegation's dependency graph; execution is handed to a
//! per-session driver task in [`dispatch`].

pub mod collaborators;
pub mod dispatch;
pub mod metadata;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::CoordinatorConfig;
use crate::models::session::{CoordinationSession, FragmentStatus, SessionState};
use crate::models::{count_f64, ratio};
use crate::{AppError, Result};

use self::collaborators::{Classifier, Planner, StepExecutor};

/// Load factor over the mean above which a worker is flagged as
/// overutilized.
const OVERUTILIZATION_FACTOR: f64 = 1.5;

pub(crate) struct SessionCell {
    pub(crate) session: CoordinationSession,
    pub(crate) cancel: CancellationToken,
    pub(crate) resume: Arc<Notify>,
}

pub(crate) struct CoordinatorInner {
    pub(crate) active: HashMap<String, SessionCell>,
    pub(crate) history: VecDeque<CoordinationSession>,
}

/// Archive a terminal session into the bounded history ring buffer.
pub(crate) fn archive(inner: &mut CoordinatorInner, session: CoordinationSession, capacity: usize) {
    inner.history.push_back(session);
    while inner.history.len() > capacity {
        inner.history.pop_front();
    }
}

/// Aggregate view over all active sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ActiveSummary {
    /// Number of active sessions.
    pub total_active: usize,
    /// Session count per lifecycle state.
    pub by_state: BTreeMap<String, usize>,
    /// Mean fractional progress across active sessions.
    pub average_progress: f64,
    /// Mean resource utilization across active sessions.
    pub average_resource_utilization: f64,
}

/// Advisory output of [`SessionCoordinator::optimize_allocation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AllocationReport {
    /// Human-readable redistribution advice.
    pub recommendations: Vec<String>,
    /// Workers carrying more than 1.5x the mean fragment load.
    pub overutilized_workers: Vec<String>,
    /// Sessions with no progress past the staleness threshold.
    pub stagnant_sessions: Vec<String>,
    /// Mean fractional progress across active sessions.
    pub efficiency_score: f64,
}

/// Turns planner output into executing, resumable, cancellable sessions
/// bounded by a concurrency ceiling.
pub struct SessionCoordinator {
    config: CoordinatorConfig,
    classifier: Arc<dyn Classifier>,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    inner: Arc<Mutex<CoordinatorInner>>,
}

impl SessionCoordinator {
    /// Construct a coordinator with its external collaborators injected.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        classifier: Arc<dyn Classifier>,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        Self {
            config,
            classifier,
            planner,
            executor,
            inner: Arc::new(Mutex::new(CoordinatorInner {
                active: HashMap::new(),
                history: VecDeque::new(),
            })),
        }
    }

    /// Create a session for a task description and begin executing it.
    ///
    /// Classification and delegation are obtained from the external
    /// collaborators; the delegation's dependency graph is validated
    /// (cycles and unknown references are rejected here rather than
    /// stalling the session later). The returned snapshot is already
    /// `Executing`; dispatch proceeds asynchronously in a driver task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Capacity` at the session ceiling (the active
    /// set is left untouched), `AppError::Executor` if a collaborator
    /// fails, or `AppError::Plan` for an invalid dependency graph.
    pub async fn coordinate(&self, description: &str) -> Result<CoordinationSession> {
        self.ensure_capacity().await?;

        let classification = self.classifier.classify(description).await?;
        let delegation = self
            .planner
            .delegate(description, &classification)
            .await?;
        delegation.validate()?;

        let meta = metadata::compute(
            &classification,
            &delegation,
            self.config.max_concurrent_sessions,
        );
        let mut session =
            CoordinationSession::new(description.to_owned(), classification, delegation, meta);
        session.advance(SessionState::Planning)?;
        session.advance(SessionState::Executing)?;

        let cancel = CancellationToken::new();
        let resume = Arc::new(Notify::new());
        {
            // Re-check under the lock: the collaborator awaits above may
            // have admitted other sessions in the meantime.
            let mut inner = self.inner.lock().await;
            if inner.active.len() >= self.config.max_concurrent_sessions {
                return Err(AppError::Capacity(format!(
                    "concurrent session limit reached ({}/{})",
                    inner.active.len(),
                    self.config.max_concurrent_sessions
                )));
            }
            inner.active.insert(
                session.id.clone(),
                SessionCell {
                    session: session.clone(),
                    cancel: cancel.clone(),
                    resume: Arc::clone(&resume),
                },
            );
        }

        info!(
            session_id = %session.id,
            fragments = session.results.len(),
            team = session.delegation.team.len(),
            "session registered"
        );

        let ctx = dispatch::DriverContext {
            inner: Arc::clone(&self.inner),
            executor: Arc::clone(&self.executor),
            session_id: session.id.clone(),
            history_capacity: self.config.history_capacity,
            cancel,
            resume,
        };
        let span = info_span!("session_driver", session_id = %session.id);
        tokio::spawn(dispatch::drive_session(ctx).instrument(span));

        Ok(session)
    }

    /// Current snapshot of an active session. Unknown or archived ids
    /// yield `None`, never an error.
    pub async fn get_status(&self, id: &str) -> Option<CoordinationSession> {
        let inner = self.inner.lock().await;
        inner.active.get(id).map(|cell| cell.session.clone())
    }

    /// Pause a session; legal only from `Executing`. In-flight dispatches
    /// run to completion — pausing only prevents new dispatch rounds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session or
    /// `AppError::Transition` if the session is not executing.
    pub async fn pause(&self, id: &str) -> Result<CoordinationSession> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .active
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        cell.session.advance(SessionState::Paused)?;
        info!(session_id = %id, "session paused");
        Ok(cell.session.clone())
    }

    /// Resume a paused session and wake its driver.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session or
    /// `AppError::Transition` if the session is not paused.
    pub async fn resume(&self, id: &str) -> Result<CoordinationSession> {
        let mut inner = self.inner.lock().await;
        let cell = inner
            .active
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        cell.session.advance(SessionState::Executing)?;
        cell.resume.notify_one();
        info!(session_id = %id, "session resumed");
        Ok(cell.session.clone())
    }

    /// Cancel a session from any active state: immediate, unconditional.
    ///
    /// The session is marked `Failed` and archived before this call
    /// returns; results produced by still-in-flight dispatches are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is not active.
    pub async fn cancel(&self, id: &str) -> Result<CoordinationSession> {
        let mut inner = self.inner.lock().await;
        let Some(mut cell) = inner.active.remove(id) else {
            return Err(AppError::NotFound(format!("session {id} not found")));
        };
        cell.cancel.cancel();

        let previous = cell.session.state;
        if let Err(err) = cell.session.advance(SessionState::Failed) {
            warn!(session_id = %id, %err, "forcing terminal state on cancel");
            cell.session.state = SessionState::Failed;
        }
        cell.session.current_step = Some("cancelled".to_owned());
        cell.session.record_actual_duration();

        let snapshot = cell.session.clone();
        archive(&mut inner, cell.session, self.config.history_capacity);
        info!(session_id = %id, %previous, "session cancelled");
        Ok(snapshot)
    }

    /// Aggregate counts and averages over all active sessions.
    pub async fn get_active_summary(&self) -> ActiveSummary {
        let inner = self.inner.lock().await;
        let total = inner.active.len();
        let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
        let mut progress_sum = 0.0;
        let mut utilization_sum = 0.0;
        for cell in inner.active.values() {
            *by_state
                .entry(cell.session.state.to_string())
                .or_default() += 1;
            progress_sum += cell.session.progress();
            utilization_sum += cell.session.metadata.resource_utilization;
        }
        ActiveSummary {
            total_active: total,
            by_state,
            average_progress: ratio(progress_sum, total),
            average_resource_utilization: ratio(utilization_sum, total),
        }
    }

    /// Advisory workload analysis across active sessions.
    ///
    /// Flags workers whose open-fragment load exceeds 1.5x the mean and
    /// sessions with no update past the staleness threshold. Never
    /// mutates anything — remediation is the operator's call.
    pub async fn optimize_allocation(&self) -> AllocationReport {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let stale_after =
            chrono::Duration::seconds(i64::try_from(self.config.stale_after_seconds).unwrap_or(i64::MAX));

        let mut load: BTreeMap<String, usize> = BTreeMap::new();
        let mut stagnant_sessions = Vec::new();
        let mut recommendations = Vec::new();
        let mut progress_sum = 0.0;

        for cell in inner.active.values() {
            let session = &cell.session;
            progress_sum += session.progress();
            for result in session.results.values() {
                if !result.status.is_terminal() {
                    *load.entry(result.worker.clone()).or_default() += 1;
                }
            }
            if now - session.last_update > stale_after {
                stagnant_sessions.push(session.id.clone());
                recommendations.push(format!(
                    "session {} has made no progress for over {} seconds; consider cancelling or re-planning",
                    session.id, self.config.stale_after_seconds
                ));
            }
        }

        let mut overutilized_workers = Vec::new();
        if !load.is_empty() {
            let total: usize = load.values().sum();
            let mean = ratio(count_f64(total), load.len());
            for (worker, count) in &load {
                if count_f64(*count) > mean * OVERUTILIZATION_FACTOR {
                    overutilized_workers.push(worker.clone());
                    recommendations.push(format!(
                        "worker {worker} carries {count} open fragments, over 1.5x the mean; redistribute pending work"
                    ));
                }
            }
        }

        AllocationReport {
            recommendations,
            overutilized_workers,
            stagnant_sessions,
            efficiency_score: ratio(progress_sum, inner.active.len()),
        }
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.active.len()
    }

    /// Snapshot of the archived (terminal) sessions, oldest first.
    pub async fn history_snapshot(&self) -> Vec<CoordinationSession> {
        let inner = self.inner.lock().await;
        inner.history.iter().cloned().collect()
    }

    /// Fragment-status counts for one active session, for operational
    /// introspection.
    pub async fn fragment_counts(&self, id: &str) -> Option<BTreeMap<String, usize>> {
        let inner = self.inner.lock().await;
        let cell = inner.active.get(id)?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for result in cell.session.results.values() {
            let label = match result.status {
                FragmentStatus::Pending => "pending",
                FragmentStatus::InProgress => "in_progress",
                FragmentStatus::Completed => "completed",
                FragmentStatus::Failed => "failed",
            };
            *counts.entry(label.to_owned()).or_default() += 1;
        }
        Some(counts)
    }

    async fn ensure_capacity(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.active.len() >= self.config.max_concurrent_sessions {
            return Err(AppError::Capacity(format!(
                "concurrent session limit reached ({}/{})",
                inner.active.len(),
                self.config.max_concurrent_sessions
            )));
        }
        Ok(())
    }
}
