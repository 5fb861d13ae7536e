//! HTTP status endpoint over the engine's published snapshots.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;

use tidescale_core::EngineStatus;

#[derive(Clone)]
pub struct StatusState {
    pub status: watch::Receiver<EngineStatus>,
}

/// Build the status router (`/healthz`, `/status`, `/metrics`).
pub fn build_status_router(status: watch::Receiver<EngineStatus>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(engine_status))
        .route("/metrics", get(prometheus_metrics))
        .with_state(StatusState { status })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn engine_status(State(state): State<StatusState>) -> Json<EngineStatus> {
    Json(state.status.borrow().clone())
}

async fn prometheus_metrics(State(state): State<StatusState>) -> impl IntoResponse {
    let body = tidescale_metrics::render_prometheus(&state.status.borrow());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
