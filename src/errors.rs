//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Worker process never became ready within the attempt budget.
    Startup(String),
    /// Session creation rejected at the concurrency ceiling.
    Capacity(String),
    /// Task breakdown rejected at session creation (cycle, unknown
    /// dependency, or unpaired execution step).
    Plan(String),
    /// Illegal session state transition (e.g. resuming a session that
    /// is not paused).
    Transition(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// External collaborator (classifier, planner, step executor) failure.
    Executor(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
            Self::Capacity(msg) => write!(f, "capacity: {msg}"),
            Self::Plan(msg) => write!(f, "plan: {msg}"),
            Self::Transition(msg) => write!(f, "transition: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Executor(msg) => write!(f, "executor: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
