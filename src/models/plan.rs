//! Planner-facing input contracts: classification, task breakdown, and
//! execution plan.
//!
//! All types here are produced by the external classifier/planner and are
//! immutable inputs to a coordination session.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Urgency tier assigned by the external classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// No time pressure.
    Low,
    /// Normal scheduling.
    Medium,
    /// Should preempt routine work.
    High,
    /// Drop everything.
    Critical,
}

impl Urgency {
    /// Numeric weight used in priority and risk scoring.
    #[must_use]
    pub fn score(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

/// Complexity tier assigned by the external classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Single-step or trivial work.
    Low,
    /// Multi-step work within one domain.
    Moderate,
    /// Cross-domain, multi-worker work.
    High,
}

impl Complexity {
    /// Numeric weight used in priority and risk scoring.
    #[must_use]
    pub fn score(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Moderate => 2,
            Self::High => 3,
        }
    }
}

/// Output of the external task classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Classification {
    /// Task category label (opaque to the core).
    pub category: String,
    /// Urgency tier.
    pub urgency: Urgency,
    /// Complexity tier.
    pub complexity: Complexity,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Smallest unit of tracked work within a session, owned by one worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskFragment {
    /// Unique fragment id within the breakdown.
    pub id: String,
    /// What the fragment does; pairs the fragment with its execution step.
    pub description: String,
    /// Worker this fragment is assigned to.
    pub assigned_worker: String,
    /// Fragment ids that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Execution-plan entry pairing a worker with an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionStep {
    /// Worker the step dispatches to.
    pub worker: String,
    /// Action description; matches the paired fragment's description.
    pub action: String,
    /// Fragment ids that must complete before this step is eligible.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Parallel-group member; non-parallel steps run one at a time in
    /// plan order.
    #[serde(default)]
    pub parallel: bool,
}

/// Output of the external planner: a team, a task breakdown, and an
/// execution plan over that breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Delegation {
    /// Worker identifiers chosen for this task.
    pub team: Vec<String>,
    /// Dependency-carrying fragments.
    pub task_breakdown: Vec<TaskFragment>,
    /// Steps marked parallel/sequential.
    pub execution_plan: Vec<ExecutionStep>,
}

impl Delegation {
    /// The fragment an execution step is paired with, matched by
    /// `(worker, action)`.
    #[must_use]
    pub fn paired_fragment(&self, step: &ExecutionStep) -> Option<&TaskFragment> {
        self.task_breakdown
            .iter()
            .find(|f| f.assigned_worker == step.worker && f.description == step.action)
    }

    /// Validate the breakdown and plan before a session is created.
    ///
    /// Rejects duplicate fragment ids, dependency references to unknown
    /// fragments, execution steps that pair with no fragment, and cyclic
    /// dependency graphs. A cyclic plan would otherwise stall a session
    /// forever, so it is an input error, not a runtime state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Plan` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for fragment in &self.task_breakdown {
            if !ids.insert(fragment.id.as_str()) {
                return Err(AppError::Plan(format!(
                    "duplicate fragment id: {}",
                    fragment.id
                )));
            }
        }

        for fragment in &self.task_breakdown {
            for dep in &fragment.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(AppError::Plan(format!(
                        "fragment {} depends on unknown fragment {dep}",
                        fragment.id
                    )));
                }
            }
        }

        let mut covered: HashMap<&str, usize> = HashMap::new();
        for step in &self.execution_plan {
            let Some(fragment) = self.paired_fragment(step) else {
                return Err(AppError::Plan(format!(
                    "step ({}, {}) pairs with no fragment",
                    step.worker, step.action
                )));
            };
            *covered.entry(fragment.id.as_str()).or_default() += 1;
            for dep in &step.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(AppError::Plan(format!(
                        "step for fragment {} depends on unknown fragment {dep}",
                        fragment.id
                    )));
                }
            }
        }

        for fragment in &self.task_breakdown {
            match covered.get(fragment.id.as_str()) {
                None => {
                    return Err(AppError::Plan(format!(
                        "fragment {} has no execution step",
                        fragment.id
                    )));
                }
                Some(1) => {}
                Some(n) => {
                    return Err(AppError::Plan(format!(
                        "fragment {} is paired with {n} execution steps",
                        fragment.id
                    )));
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(AppError::Plan(format!(
                "cyclic dependency: {}",
                cycle.join(" -> ")
            )));
        }

        Ok(())
    }

    /// Union of a fragment's own dependencies and its paired step's
    /// dependencies.
    fn dependency_edges(&self) -> HashMap<&str, Vec<&str>> {
        let mut edges: HashMap<&str, Vec<&str>> = self
            .task_breakdown
            .iter()
            .map(|f| {
                (
                    f.id.as_str(),
                    f.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        for step in &self.execution_plan {
            if let Some(fragment) = self.paired_fragment(step) {
                if let Some(deps) = edges.get_mut(fragment.id.as_str()) {
                    for dep in &step.dependencies {
                        if !deps.contains(&dep.as_str()) {
                            deps.push(dep.as_str());
                        }
                    }
                }
            }
        }
        edges
    }

    /// Depth-first cycle search over the fragment dependency graph.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let edges = self.dependency_edges();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            visited: &mut HashSet<&'a str>,
            stack: &mut Vec<&'a str>,
        ) -> bool {
            if stack.contains(&node) {
                stack.push(node);
                return true;
            }
            if !visited.insert(node) {
                return false;
            }
            stack.push(node);
            if let Some(deps) = edges.get(node) {
                for dep in deps {
                    if visit(dep, edges, visited, stack) {
                        return true;
                    }
                }
            }
            stack.pop();
            false
        }

        for fragment in &self.task_breakdown {
            stack.clear();
            if visit(fragment.id.as_str(), &edges, &mut visited, &mut stack) {
                // Trim the prefix before the repeated node.
                let repeated = stack.last().copied().unwrap_or_default();
                let start = stack.iter().position(|n| *n == repeated).unwrap_or(0);
                return Some(stack[start..].iter().map(ToString::to_string).collect());
            }
        }
        None
    }
}

/// Output of one step dispatch to the external executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StepOutcome {
    /// Produced output text.
    pub output: String,
    /// Executor confidence in `[0, 1]`.
    pub confidence: f64,
    /// Follow-up actions suggested by the executor.
    #[serde(default)]
    pub follow_up_tasks: Vec<String>,
}
