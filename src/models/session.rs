//! Coordination session model and lifecycle helpers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::{Classification, Delegation, StepOutcome};
use crate::{AppError, Result};

/// Lifecycle state for a coordination session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session object being assembled.
    Initializing,
    /// Classification and delegation in progress.
    Planning,
    /// Dispatch rounds running.
    Executing,
    /// Dispatch suspended by operator; resumable.
    Paused,
    /// All fragments terminal; aggregating results.
    Coordinating,
    /// Synthesizing the final output.
    Integrating,
    /// Terminal success.
    Completed,
    /// Terminal failure (fragment failure or cancellation).
    Failed,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Failed` is reachable from every non-terminal state because
    /// cancellation is unconditional.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::Planning)
                | (Self::Planning, Self::Executing)
                | (Self::Executing, Self::Paused | Self::Coordinating)
                | (Self::Paused, Self::Executing)
                | (Self::Coordinating, Self::Integrating)
                | (Self::Integrating, Self::Completed)
                | (
                    Self::Initializing
                        | Self::Planning
                        | Self::Executing
                        | Self::Paused
                        | Self::Coordinating
                        | Self::Integrating,
                    Self::Failed
                )
        )
    }

    /// Whether the session has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Initializing => "initializing",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Paused => "paused",
            Self::Coordinating => "coordinating",
            Self::Integrating => "integrating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Per-fragment dispatch status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FragmentStatus {
    /// Not yet dispatched.
    Pending,
    /// Dispatched to the executor.
    InProgress,
    /// Executor returned an output.
    Completed,
    /// Executor threw, or a dependency failed.
    Failed,
}

impl FragmentStatus {
    /// Whether the fragment has reached a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One fragment's dispatch record. Created `Pending` at session
/// initialization, mutated only by the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentResult {
    /// Worker the fragment is assigned to.
    pub worker: String,
    /// Fragment this result tracks.
    pub fragment_id: String,
    /// Executor output, or the error/blocked reason on failure.
    pub output: String,
    /// Current dispatch status.
    pub status: FragmentStatus,
    /// Dispatch timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion/failure timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// Executor confidence, zero until completed.
    pub confidence: f64,
    /// Fragment ids this fragment depends on.
    pub dependencies: Vec<String>,
    /// Follow-up actions suggested by the executor.
    pub follow_up_tasks: Vec<String>,
}

impl AgentResult {
    /// Initial `Pending` record for a fragment.
    #[must_use]
    pub fn pending(fragment: &super::plan::TaskFragment) -> Self {
        Self {
            worker: fragment.assigned_worker.clone(),
            fragment_id: fragment.id.clone(),
            output: String::new(),
            status: FragmentStatus::Pending,
            started_at: None,
            finished_at: None,
            confidence: 0.0,
            dependencies: fragment.dependencies.clone(),
            follow_up_tasks: Vec::new(),
        }
    }

    /// Record a successful dispatch outcome.
    pub fn complete(&mut self, outcome: StepOutcome) {
        self.output = outcome.output;
        self.confidence = outcome.confidence;
        self.follow_up_tasks = outcome.follow_up_tasks;
        self.status = FragmentStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Record a failed dispatch with the error text as output.
    pub fn fail(&mut self, reason: String) {
        self.output = reason;
        self.status = FragmentStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// Priority tier computed from urgency and complexity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Routine work.
    Low,
    /// Default tier.
    Medium,
    /// Expedited.
    High,
    /// Preempts everything else.
    Critical,
}

/// Risk tier derived from the weighted risk score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Score below 0.4.
    Low,
    /// Score in `[0.4, 0.7)`.
    Moderate,
    /// Score at or above 0.7.
    High,
}

/// Weighted risk score with contributing factors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RiskAssessment {
    /// Weighted score in `[0, 1]`.
    pub score: f64,
    /// Tier derived from the score.
    pub level: RiskLevel,
    /// Named contributors to the score.
    pub factors: Vec<String>,
}

/// Derived per-session scheduling metadata. Computed once at creation;
/// only `actual_duration_seconds` is filled in later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionMetadata {
    /// Priority tier from urgency and complexity.
    pub priority: Priority,
    /// Estimate from the complexity tier and team size.
    pub estimated_duration_seconds: u64,
    /// Wall-clock duration, filled at completion.
    pub actual_duration_seconds: Option<u64>,
    /// Team size over the session ceiling, clamped to 1.0.
    pub resource_utilization: f64,
    /// Human-readable complexity contributors.
    pub complexity_factors: Vec<String>,
    /// Weighted risk assessment.
    pub risk_assessment: RiskAssessment,
}

/// One complete, stateful execution of a decomposed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CoordinationSession {
    /// Unique session identifier.
    pub id: String,
    /// The raw task description handed to `coordinate`.
    pub task_description: String,
    /// Classifier output.
    pub classification: Classification,
    /// Planner output (team, breakdown, plan).
    pub delegation: Delegation,
    /// Human-readable description of the step currently in flight.
    pub current_step: Option<String>,
    /// Lifecycle state.
    pub state: SessionState,
    /// One dispatch record per fragment, keyed by fragment id.
    pub results: HashMap<String, AgentResult>,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub last_update: DateTime<Utc>,
    /// Derived scheduling metadata.
    pub metadata: SessionMetadata,
}

impl CoordinationSession {
    /// Construct a new session in `Initializing` with a `Pending` result
    /// for every fragment.
    #[must_use]
    pub fn new(
        task_description: String,
        classification: Classification,
        delegation: Delegation,
        metadata: SessionMetadata,
    ) -> Self {
        let now = Utc::now();
        let results = delegation
            .task_breakdown
            .iter()
            .map(|fragment| (fragment.id.clone(), AgentResult::pending(fragment)))
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            task_description,
            classification,
            delegation,
            current_step: None,
            state: SessionState::Initializing,
            results,
            started_at: now,
            last_update: now,
            metadata,
        }
    }

    /// Advance the state machine, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transition` if the transition is not permitted.
    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::Transition(format!(
                "session {} cannot move {} -> {next}",
                self.id, self.state
            )));
        }
        self.state = next;
        self.last_update = Utc::now();
        Ok(())
    }

    /// Fractional progress: completed fragments plus half credit for
    /// in-progress ones, over the total. A session with no fragments is
    /// fully progressed.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.results.is_empty() {
            return 1.0;
        }
        let mut credit = 0.0;
        for result in self.results.values() {
            match result.status {
                FragmentStatus::Completed => credit += 1.0,
                FragmentStatus::InProgress => credit += 0.5,
                FragmentStatus::Pending | FragmentStatus::Failed => {}
            }
        }
        super::ratio(credit, self.results.len())
    }

    /// Whether every fragment has reached a terminal status.
    #[must_use]
    pub fn all_fragments_terminal(&self) -> bool {
        self.results.values().all(|r| r.status.is_terminal())
    }

    /// Whether any fragment failed.
    #[must_use]
    pub fn any_fragment_failed(&self) -> bool {
        self.results
            .values()
            .any(|r| r.status == FragmentStatus::Failed)
    }

    /// Record the wall-clock duration at terminal transition.
    pub fn record_actual_duration(&mut self) {
        let elapsed = u64::try_from((Utc::now() - self.started_at).num_seconds()).unwrap_or(0);
        self.metadata.actual_duration_seconds = Some(elapsed);
    }
}
