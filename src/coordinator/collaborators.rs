//! External collaborator seams.
//!
//! The coordinator never classifies task text, chooses a team, or
//! computes a step's result itself — those capabilities are injected
//! through these traits. Implementations live outside the core; tests
//! use scripted fakes.

use std::future::Future;
use std::pin::Pin;

use crate::models::plan::{Classification, Delegation, StepOutcome};
use crate::Result;

/// Boxed future returned by collaborator trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Classifies raw task text into a category with urgency, complexity,
/// and confidence.
pub trait Classifier: Send + Sync {
    /// Classify a task description.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Executor`](crate::AppError::Executor) if the
    /// classifier is unavailable or rejects the input.
    fn classify(&self, description: &str) -> BoxFuture<'_, Result<Classification>>;
}

/// Chooses a team of workers and produces the task breakdown plus the
/// execution plan for a classified task.
pub trait Planner: Send + Sync {
    /// Delegate a classified task to a team.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Executor`](crate::AppError::Executor) if the
    /// planner cannot produce a delegation.
    fn delegate(
        &self,
        description: &str,
        classification: &Classification,
    ) -> BoxFuture<'_, Result<Delegation>>;
}

/// Computes one step's result: an output, a confidence score, and zero
/// or more follow-up actions. May fail; the dispatch engine records the
/// failure on the fragment.
pub trait StepExecutor: Send + Sync {
    /// Execute one action on the named worker.
    ///
    /// # Errors
    ///
    /// Returns any error the underlying executor raises; the error text
    /// becomes the fragment's output.
    fn execute(&self, worker: &str, action: &str) -> BoxFuture<'_, Result<StepOutcome>>;
}
