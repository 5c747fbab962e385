//! Read-only status endpoint over the supervisor's in-memory state.
//!
//! Two query operations — full status and worker list — plus an accepted
//! start stub. Every response is a pure projection computed on demand;
//! nothing is cached and queries never fail. CORS is permissive for all
//! routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::worker::{AggregateStatus, WorkerListing};
use crate::supervisor::ProcessSupervisor;
use crate::{AppError, Result};

/// Handler for `GET /status` — host metrics plus every worker's status,
/// uptime, and pid.
async fn full_status(State(supervisor): State<Arc<ProcessSupervisor>>) -> Json<AggregateStatus> {
    Json(supervisor.aggregate_status().await)
}

/// Handler for `GET /servers` — name/type/port/status/pid per worker.
async fn worker_list(State(supervisor): State<Arc<ProcessSupervisor>>) -> Json<Vec<WorkerListing>> {
    Json(supervisor.worker_list().await)
}

/// Handler for `POST /servers/start` — accepted stub; workers are
/// started by the supervisor's own lifecycle, not through this surface.
async fn start_stub() -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": true })),
    )
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

/// Append permissive CORS headers to every response.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Build the status router over a shared supervisor.
#[must_use]
pub fn router(supervisor: Arc<ProcessSupervisor>) -> Router {
    Router::new()
        .route("/status", get(full_status))
        .route("/servers", get(worker_list))
        .route("/servers/start", post(start_stub))
        .fallback(not_found)
        .layer(middleware::from_fn(cors))
        .with_state(supervisor)
}

/// Serve the status endpoint on an already-bound listener until the
/// `CancellationToken` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails.
pub async fn serve(
    supervisor: Arc<ProcessSupervisor>,
    listener: TcpListener,
    ct: CancellationToken,
) -> Result<()> {
    let app = router(supervisor);
    info!("starting status endpoint");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Config(format!("status endpoint error: {err}")))?;

    info!("status endpoint shut down");
    Ok(())
}

/// Bind the loopback status listener on `port` and serve it.
///
/// # Errors
///
/// Returns `AppError::Config` if the bind fails or the server errors.
pub async fn bind_and_serve(
    supervisor: Arc<ProcessSupervisor>,
    port: u16,
    ct: CancellationToken,
) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind status endpoint on {bind}: {err}")))?;
    info!(%bind, "status endpoint bound");
    serve(supervisor, listener, ct).await
}
