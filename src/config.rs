//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

fn default_health_interval_seconds() -> u64 {
    30
}

fn default_ready_poll_interval_ms() -> u64 {
    1000
}

fn default_ready_max_attempts() -> u32 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_stop_grace_seconds() -> u64 {
    5
}

fn default_max_concurrent_sessions() -> usize {
    10
}

fn default_history_capacity() -> usize {
    100
}

fn default_stale_after_seconds() -> u64 {
    1800
}

fn default_http_port() -> u16 {
    3000
}

/// Static declaration of one supervised worker process.
///
/// Declared in the `[[workers]]` table of the TOML config; immutable for
/// the lifetime of the supervisor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Human-readable worker name.
    pub name: String,
    /// Unique worker kind; the registry key.
    #[serde(rename = "type")]
    pub kind: String,
    /// Executable to spawn for this worker.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Port the worker's health endpoint listens on; injected into the
    /// child environment as `WORKER_PORT`.
    pub port: u16,
    /// Disabled workers are skipped by `start_all`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Timing knobs for process supervision and health probing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Interval between health-check rounds.
    #[serde(default = "default_health_interval_seconds")]
    pub health_interval_seconds: u64,
    /// Delay between readiness poll attempts after spawning a worker.
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    /// Readiness poll attempt budget before a start is failed.
    #[serde(default = "default_ready_max_attempts")]
    pub ready_max_attempts: u32,
    /// Per-probe HTTP timeout.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Grace period between the termination signal and a forced kill.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_interval_seconds: default_health_interval_seconds(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            ready_max_attempts: default_ready_max_attempts(),
            probe_timeout_ms: default_probe_timeout_ms(),
            stop_grace_seconds: default_stop_grace_seconds(),
        }
    }
}

impl SupervisorConfig {
    /// Interval between health-check rounds.
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_seconds)
    }

    /// Delay between readiness poll attempts.
    #[must_use]
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    /// Per-probe HTTP timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Grace period before a forced kill.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

/// Limits and thresholds for the coordination session manager.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    /// Concurrency ceiling for active sessions.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    /// Ring-buffer capacity for archived (terminal) sessions.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// A session with no progress for longer than this is flagged as
    /// stagnant by `optimize_allocation`.
    #[serde(default = "default_stale_after_seconds")]
    pub stale_after_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_concurrent_sessions(),
            history_capacity: default_history_capacity(),
            stale_after_seconds: default_stale_after_seconds(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Registry of supervised worker processes.
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    /// Process supervision timing.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Session manager limits.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// HTTP port for the status endpoint.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            workers: Vec::new(),
            supervisor: SupervisorConfig::default(),
            coordinator: CoordinatorConfig::default(),
            http_port: default_http_port(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.coordinator.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "max_concurrent_sessions must be greater than zero".into(),
            ));
        }

        if self.coordinator.history_capacity == 0 {
            return Err(AppError::Config(
                "history_capacity must be greater than zero".into(),
            ));
        }

        if self.supervisor.ready_max_attempts == 0 {
            return Err(AppError::Config(
                "ready_max_attempts must be greater than zero".into(),
            ));
        }

        for (i, worker) in self.workers.iter().enumerate() {
            if worker.kind.is_empty() {
                return Err(AppError::Config(format!(
                    "worker #{i} has an empty type"
                )));
            }
            if worker.command.is_empty() {
                return Err(AppError::Config(format!(
                    "worker {} has an empty command",
                    worker.kind
                )));
            }
            if self.workers[..i].iter().any(|w| w.kind == worker.kind) {
                return Err(AppError::Config(format!(
                    "duplicate worker type: {}",
                    worker.kind
                )));
            }
        }

        Ok(())
    }
}
