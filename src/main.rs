#![forbid(unsafe_code)]

//! `fleet-foreman` — worker-fleet supervisor binary.
//!
//! Bootstraps configuration, starts every enabled worker, runs the
//! health-check and exit-monitor loops, and serves the read-only status
//! endpoint until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use fleet_foreman::config::GlobalConfig;
use fleet_foreman::supervisor::{exit_monitor, health, ProcessSupervisor};
use fleet_foreman::{status, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fleet-foreman", about = "Worker-fleet process supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("fleet-foreman bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(workers = config.workers.len(), "configuration loaded");

    // ── Build the supervisor ────────────────────────────
    let supervisor = Arc::new(ProcessSupervisor::new(config.supervisor.clone()));
    let ct = supervisor.cancel_token().clone();

    // ── Start enabled workers ───────────────────────────
    supervisor.start_all(&config.workers).await;

    // ── Background loops ────────────────────────────────
    let health_handle = health::spawn_health_monitor(Arc::clone(&supervisor), ct.clone());
    let exit_handle = exit_monitor::spawn_exit_monitor(Arc::clone(&supervisor), ct.clone());

    // ── Status endpoint ─────────────────────────────────
    let status_supervisor = Arc::clone(&supervisor);
    let status_ct = ct.clone();
    let status_handle = tokio::spawn(async move {
        if let Err(err) = status::bind_and_serve(status_supervisor, config.http_port, status_ct).await
        {
            error!(%err, "status endpoint failed");
        }
    });

    info!("fleet-foreman ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    supervisor.shutdown().await;

    let _ = tokio::join!(health_handle, exit_handle, status_handle);
    info!("fleet-foreman shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
