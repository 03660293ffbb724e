//! # modelship-server
//!
//! HTTP surface of the deployment publisher.
//!
//! - `POST /api/deploy`: multipart upload of a model archive, published as
//!   one commit to a fresh repository.
//! - `GET /api/status?job_id=`: pass-through to the inference backend's job
//!   status endpoint.
//! - `GET /health`: liveness.
//!
//! Handlers only translate between HTTP and the publish crate; every error
//! leaves through [`AppError`].

pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    routes::router()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the state's shutdown token fires. Deployments still running
/// observe the same token and stop before their next remote call.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    tracing::info!(addr = ?listener.local_addr().ok(), "modelship server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
