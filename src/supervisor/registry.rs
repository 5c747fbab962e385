//! Worker process registry: spawn, readiness polling, termination.
//!
//! The supervisor owns every [`WorkerRuntime`] and the child process
//! handles beside them. All mutation goes through supervisor methods;
//! the status endpoint only reads snapshots. Entries are retained with
//! status `Stopped` until the supervisor shuts down.

use std::collections::HashMap;
use std::process::Stdio;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{SupervisorConfig, WorkerConfig};
use crate::models::worker::{
    AggregateStatus, HostMetrics, WorkerListing, WorkerRuntime, WorkerSnapshot, WorkerStatus,
};
use crate::{AppError, Result};

struct WorkerEntry {
    runtime: WorkerRuntime,
    child: Option<Child>,
}

/// Owns the worker registry and drives every process lifecycle change.
pub struct ProcessSupervisor {
    settings: SupervisorConfig,
    workers: Mutex<HashMap<String, WorkerEntry>>,
    http: reqwest::Client,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

impl ProcessSupervisor {
    /// Construct a supervisor with an empty registry.
    #[must_use]
    pub fn new(settings: SupervisorConfig) -> Self {
        Self {
            settings,
            workers: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Supervision timing settings.
    #[must_use]
    pub fn settings(&self) -> &SupervisorConfig {
        &self.settings
    }

    /// Cancellation token shared by the supervisor's background loops
    /// and the status listener; fired by [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start one worker and poll its health endpoint until ready.
    ///
    /// Starting an already-running worker is a no-op with a warning.
    /// The spawned process gets `WORKER_PORT` in its environment and its
    /// output streams are forwarded into the log, tagged with the worker
    /// type.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Startup` if the process cannot be spawned or
    /// never becomes ready within the attempt budget; the registry entry
    /// is left with status `Error` in the latter case.
    pub async fn start(&self, config: &WorkerConfig) -> Result<()> {
        {
            let mut workers = self.workers.lock().await;
            if let Some(entry) = workers.get(&config.kind) {
                if entry.runtime.status == WorkerStatus::Running {
                    warn!(worker = %config.kind, "worker already running, start ignored");
                    return Ok(());
                }
            }

            let mut cmd = Command::new(&config.command);
            cmd.args(&config.args)
                .env("WORKER_PORT", config.port.to_string())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|err| {
                AppError::Startup(format!("failed to spawn worker {}: {err}", config.kind))
            })?;
            let pid = child.id();

            forward_output(&config.kind, &mut child);

            info!(
                worker = %config.kind,
                pid = pid.unwrap_or(0),
                port = config.port,
                "worker process spawned"
            );

            workers.insert(
                config.kind.clone(),
                WorkerEntry {
                    runtime: WorkerRuntime::starting(config.clone(), pid),
                    child: Some(child),
                },
            );
        }

        match self.await_ready(config).await {
            Ok(()) => {
                self.set_status(&config.kind, WorkerStatus::Running).await;
                info!(worker = %config.kind, "worker ready");
                Ok(())
            }
            Err(err) => {
                // The exit monitor may already have reaped a dead child;
                // don't overwrite `Stopped` with `Error`.
                self.set_status_if(&config.kind, WorkerStatus::Starting, WorkerStatus::Error)
                    .await;
                error!(worker = %config.kind, %err, "worker failed to become ready");
                Err(err)
            }
        }
    }

    /// Start every enabled worker; per-worker failures are logged and do
    /// not abort the remaining starts.
    pub async fn start_all(&self, configs: &[WorkerConfig]) {
        for config in configs {
            if !config.enabled {
                debug!(worker = %config.kind, "worker disabled, skipping");
                continue;
            }
            if let Err(err) = self.start(config).await {
                error!(worker = %config.kind, %err, "worker start failed");
            }
        }
    }

    /// Stop one worker: graceful termination signal, bounded grace
    /// period, then a forced kill. Always resolves once the process is
    /// confirmed gone; stopping an unknown or already-stopped worker is
    /// a no-op.
    pub async fn stop(&self, kind: &str) {
        let child = {
            let mut workers = self.workers.lock().await;
            let Some(entry) = workers.get_mut(kind) else {
                debug!(worker = kind, "stop requested for unknown worker, ignoring");
                return;
            };
            if entry.runtime.status == WorkerStatus::Stopped {
                debug!(worker = kind, "worker already stopped");
                return;
            }
            entry.child.take()
        };

        if let Some(mut child) = child {
            terminate_gracefully(kind, &mut child, self.settings.stop_grace()).await;
        }

        self.set_status(kind, WorkerStatus::Stopped).await;
        info!(worker = kind, "worker stopped");
    }

    /// Stop every registered worker concurrently and wait for all.
    pub async fn stop_all(&self) {
        let kinds: Vec<String> = {
            let workers = self.workers.lock().await;
            workers.keys().cloned().collect()
        };
        join_all(kinds.iter().map(|kind| self.stop(kind))).await;
    }

    /// Cancel the background loops, stop every worker, and release the
    /// status listener (which shares the cancellation token).
    pub async fn shutdown(&self) {
        info!("supervisor shutting down");
        self.cancel.cancel();
        self.stop_all().await;
        info!("supervisor shutdown complete");
    }

    /// Full point-in-time snapshot: host metrics plus every worker.
    pub async fn aggregate_status(&self) -> AggregateStatus {
        let workers = self.workers.lock().await;
        let mut servers: Vec<WorkerSnapshot> =
            workers.values().map(|e| (&e.runtime).into()).collect();
        servers.sort_by(|a, b| a.kind.cmp(&b.kind));
        AggregateStatus {
            timestamp: Utc::now(),
            system: HostMetrics::collect(self.started_at),
            servers,
        }
    }

    /// Lightweight worker list (no uptime, no host metrics).
    pub async fn worker_list(&self) -> Vec<WorkerListing> {
        let workers = self.workers.lock().await;
        let mut listings: Vec<WorkerListing> =
            workers.values().map(|e| (&e.runtime).into()).collect();
        listings.sort_by(|a, b| a.kind.cmp(&b.kind));
        listings
    }

    /// Current status of one worker, if registered.
    pub async fn worker_status(&self, kind: &str) -> Option<WorkerStatus> {
        let workers = self.workers.lock().await;
        workers.get(kind).map(|e| e.runtime.status)
    }

    /// One probe round over every non-stopped worker, all probes
    /// concurrent. HTTP 200 marks the worker `Running`; a failed probe
    /// on a previously-running worker marks it `NotResponding`. No
    /// remediation happens here — detection only.
    pub async fn probe_round(&self) {
        let targets: Vec<(String, u16, WorkerStatus)> = {
            let workers = self.workers.lock().await;
            workers
                .values()
                .filter(|e| e.runtime.status != WorkerStatus::Stopped)
                .map(|e| {
                    (
                        e.runtime.config.kind.clone(),
                        e.runtime.config.port,
                        e.runtime.status,
                    )
                })
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let probes = targets.into_iter().map(|(kind, port, previous)| async move {
            let healthy = self.probe(port).await;
            (kind, previous, healthy)
        });
        let outcomes = join_all(probes).await;

        let mut workers = self.workers.lock().await;
        for (kind, previous, healthy) in outcomes {
            let Some(entry) = workers.get_mut(&kind) else {
                continue;
            };
            // A worker stopped while the probe was in flight keeps its
            // terminal status.
            if entry.runtime.status == WorkerStatus::Stopped {
                continue;
            }
            if healthy {
                if previous == WorkerStatus::NotResponding {
                    info!(worker = %kind, "worker recovered");
                }
                entry.runtime.status = WorkerStatus::Running;
            } else if previous == WorkerStatus::Running {
                warn!(worker = %kind, "health probe failed, marking not responding");
                entry.runtime.status = WorkerStatus::NotResponding;
            }
        }
    }

    /// Sweep the registry for exited children. An exited child marks its
    /// worker `Stopped`; non-zero exit codes are logged as errors.
    pub async fn reap_exited(&self) {
        let mut workers = self.workers.lock().await;
        for (kind, entry) in workers.iter_mut() {
            let Some(child) = entry.child.as_mut() else {
                continue;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        info!(worker = %kind, "worker process exited");
                    } else {
                        error!(
                            worker = %kind,
                            code = status.code().unwrap_or(-1),
                            "worker process exited with non-zero status"
                        );
                    }
                    entry.runtime.status = WorkerStatus::Stopped;
                    entry.child = None;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(worker = %kind, %err, "failed to poll worker process, treating as exited");
                    entry.runtime.status = WorkerStatus::Stopped;
                    entry.child = None;
                }
            }
        }
    }

    /// Poll the worker's health endpoint until it answers or the attempt
    /// budget runs out.
    async fn await_ready(&self, config: &WorkerConfig) -> Result<()> {
        for attempt in 1..=self.settings.ready_max_attempts {
            if self.probe(config.port).await {
                debug!(worker = %config.kind, attempt, "readiness probe succeeded");
                return Ok(());
            }
            tokio::time::sleep(self.settings.ready_poll_interval()).await;
        }
        Err(AppError::Startup(format!(
            "worker {} failed to become ready after {} attempts",
            config.kind, self.settings.ready_max_attempts
        )))
    }

    /// Single bounded-timeout health probe. Any non-2xx answer or
    /// connection failure counts as unhealthy.
    async fn probe(&self, port: u16) -> bool {
        let url = format!("http://127.0.0.1:{port}/health");
        match self
            .http
            .get(&url)
            .timeout(self.settings.probe_timeout())
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn set_status(&self, kind: &str, status: WorkerStatus) {
        let mut workers = self.workers.lock().await;
        if let Some(entry) = workers.get_mut(kind) {
            entry.runtime.status = status;
        }
    }

    async fn set_status_if(&self, kind: &str, expected: WorkerStatus, status: WorkerStatus) {
        let mut workers = self.workers.lock().await;
        if let Some(entry) = workers.get_mut(kind) {
            if entry.runtime.status == expected {
                entry.runtime.status = status;
            }
        }
    }
}

/// Forward the child's stdout/stderr line streams into the log, tagged
/// with the worker type.
fn forward_output(kind: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let kind = kind.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(worker = %kind, "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let kind = kind.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(worker = %kind, "{line}");
            }
        });
    }
}

/// Graceful-then-forced termination. Sends the termination signal, waits
/// out the grace period, and escalates to a kill if the process is still
/// alive. Never fails.
async fn terminate_gracefully(kind: &str, child: &mut Child, grace: std::time::Duration) {
    send_term_signal(kind, child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(worker = kind, ?status, "worker exited within grace period");
        }
        Ok(Err(err)) => {
            warn!(worker = kind, %err, "error waiting for worker process");
        }
        Err(_) => {
            warn!(
                worker = kind,
                "worker ignored termination signal, forcing kill"
            );
            if let Err(err) = child.kill().await {
                warn!(worker = kind, %err, "failed to force-kill worker process");
            }
        }
    }
}

#[cfg(unix)]
fn send_term_signal(kind: &str, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(worker = kind, %err, "failed to deliver SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_term_signal(kind: &str, child: &mut Child) {
    // No graceful signal on this platform; the grace period still gives
    // the process a chance to exit on its own before the kill.
    let _ = kind;
    let _ = child;
}
