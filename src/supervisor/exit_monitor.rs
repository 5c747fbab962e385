//! Worker exit monitor — detects worker processes that exited on their
//! own, outside a `stop` call.
//!
//! Periodically sweeps the registry with `try_wait`. An exited worker is
//! marked `Stopped` and its non-zero exit code is logged as an error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::registry::ProcessSupervisor;

/// Interval between sweeps for exited worker processes.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the background exit-monitor loop.
///
/// The task polls at [`POLL_INTERVAL`] until the `CancellationToken`
/// fires.
#[must_use]
pub fn spawn_exit_monitor(
    supervisor: Arc<ProcessSupervisor>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("exit monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            supervisor.reap_exited().await;
        }
    })
}
