//! WebAPI - Control Surface
//!
//! ## Responsibilities
//!
//! - HTTP API routes (counters, reset, detection ingestion, alerts)
//! - WebSocket observer endpoint
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: if state.dispatcher.is_running() {
            "ok".to_string()
        } else {
            "shutting_down".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        observers: state.broadcaster.observer_count(),
        queue_depth: state.dispatcher.depth(),
        remote_sink_enabled: state.config.remote_ingest_url.is_some(),
    };

    Json(response)
}
