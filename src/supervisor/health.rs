//! Recurring health-check loop.
//!
//! Each tick probes every non-stopped worker once. The round is awaited
//! inline before the next sleep starts, so rounds are single-flight: a
//! slow probe round delays the next tick instead of overlapping it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::ProcessSupervisor;

/// Spawn the background health-check loop.
///
/// The task runs one probe round per `health_interval` until the
/// `CancellationToken` fires.
#[must_use]
pub fn spawn_health_monitor(
    supervisor: Arc<ProcessSupervisor>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = supervisor.settings().health_interval();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("health monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            debug!("health check round");
            supervisor.probe_round().await;
        }
    })
}
