//! Worker runtime model and status-endpoint projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;

/// Lifecycle status of a supervised worker process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Process spawned, readiness not yet confirmed.
    Starting,
    /// Health endpoint answered the most recent probe.
    Running,
    /// Previously running, now failing health probes.
    #[serde(rename = "not responding")]
    NotResponding,
    /// Process exited or was terminated.
    Stopped,
    /// Process never became ready within the attempt budget.
    Error,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::NotResponding => "not responding",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Mutable runtime record for one registered worker.
///
/// Created on `start`; the entry is retained (status [`WorkerStatus::Stopped`])
/// until the supervisor shuts down. The child process handle lives beside
/// this record in the supervisor registry, not in it, so snapshots stay
/// cheaply cloneable.
#[derive(Debug, Clone)]
pub struct WorkerRuntime {
    /// The static declaration this runtime was started from.
    pub config: WorkerConfig,
    /// Current lifecycle status.
    pub status: WorkerStatus,
    /// Spawn timestamp.
    pub started_at: DateTime<Utc>,
    /// OS process id, if the spawn reported one.
    pub pid: Option<u32>,
}

impl WorkerRuntime {
    /// Runtime record for a freshly spawned worker.
    #[must_use]
    pub fn starting(config: WorkerConfig, pid: Option<u32>) -> Self {
        Self {
            config,
            status: WorkerStatus::Starting,
            started_at: Utc::now(),
            pid,
        }
    }

    /// Seconds since the worker was spawned.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_seconds()).unwrap_or(0)
    }
}

/// Per-worker slice of the full status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerSnapshot {
    /// Human-readable worker name.
    pub name: String,
    /// Unique worker kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Health endpoint port.
    pub port: u16,
    /// Current lifecycle status.
    pub status: WorkerStatus,
    /// Seconds since spawn.
    pub uptime_seconds: u64,
    /// OS process id, if known.
    pub pid: Option<u32>,
}

impl From<&WorkerRuntime> for WorkerSnapshot {
    fn from(runtime: &WorkerRuntime) -> Self {
        Self {
            name: runtime.config.name.clone(),
            kind: runtime.config.kind.clone(),
            port: runtime.config.port,
            status: runtime.status,
            uptime_seconds: runtime.uptime_seconds(),
            pid: runtime.pid,
        }
    }
}

/// Per-worker slice of the worker-list query (no uptime).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerListing {
    /// Human-readable worker name.
    pub name: String,
    /// Unique worker kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Health endpoint port.
    pub port: u16,
    /// Current lifecycle status.
    pub status: WorkerStatus,
    /// OS process id, if known.
    pub pid: Option<u32>,
}

impl From<&WorkerRuntime> for WorkerListing {
    fn from(runtime: &WorkerRuntime) -> Self {
        Self {
            name: runtime.config.name.clone(),
            kind: runtime.config.kind.clone(),
            port: runtime.config.port,
            status: runtime.status,
            pid: runtime.pid,
        }
    }
}

/// Host-level metrics included in the full status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostMetrics {
    /// Host name as reported by the OS.
    pub hostname: String,
    /// Logical CPU count.
    pub cpus: usize,
    /// Seconds since the supervisor process started.
    pub process_uptime_seconds: u64,
}

impl HostMetrics {
    /// Collect current host metrics.
    #[must_use]
    pub fn collect(supervisor_started_at: DateTime<Utc>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into());
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let process_uptime_seconds =
            u64::try_from((Utc::now() - supervisor_started_at).num_seconds()).unwrap_or(0);
        Self {
            hostname,
            cpus,
            process_uptime_seconds,
        }
    }
}

/// Point-in-time snapshot of the whole fleet. Derived on every query,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AggregateStatus {
    /// Snapshot timestamp.
    pub timestamp: DateTime<Utc>,
    /// Host-level metrics.
    pub system: HostMetrics,
    /// One entry per registered worker.
    pub servers: Vec<WorkerSnapshot>,
}
