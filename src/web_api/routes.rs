//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

use crate::alert_dispatcher::sinks::IMAGE_URL_PREFIX;
use crate::alert_gate::{GateDecision, InboundAlertEnvelope};
use crate::confirmation_tracker::InboundFrame;
use crate::detection_pipeline::IngestOutcome;
use crate::error::{Error, Result};
use crate::models::{ApiResponse, DetectionClass, DetectionKind};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let images = ServeDir::new(&state.config.images_dir);

    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Dashboard (legacy shapes)
        .route("/counters", get(get_counters))
        .route("/reset", post(reset_detections))
        .route("/api/detection/data", get(detection_data))
        .route("/api/detection/update", post(update_detection))
        // Inference stage
        .route("/api/frames", post(ingest_frame))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/rearm", post(rearm_alert))
        .route("/api/dispatch/stats", get(dispatch_stats))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .nest_service(IMAGE_URL_PREFIX, images)
        .with_state(state)
}

// ========================================
// Counter Handlers
// ========================================

async fn get_counters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.counters().await)
}

async fn reset_detections(State(state): State<AppState>) -> impl IntoResponse {
    let counters = state.pipeline.reset().await;
    Json(json!({
        "success": true,
        "message": "Detections reset successfully",
        "counters": counters,
    }))
}

/// Dashboard summary: counters, per-species totals, recent alerts
async fn detection_data(State(state): State<AppState>) -> impl IntoResponse {
    let counters = state.pipeline.counters().await;
    let recent = state.event_log.latest(state.event_log.count().await).await;

    let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
    let active_alerts = recent.iter().filter(|r| r.recorded_at > an_hour_ago).count();

    let mut species: BTreeMap<String, u64> = BTreeMap::new();
    for record in &recent {
        *species.entry(record.species.clone()).or_default() += 1;
    }
    let species_data: Vec<_> = species
        .into_iter()
        .map(|(name, count)| json!({ "name": name, "count": count }))
        .collect();

    Json(json!({
        "summary": {
            "totalDetections": counters.total_detections(),
            "animalsDetected": counters.animals_detected,
            "personsDetected": counters.hunters_detected,
            "wildfiresDetected": counters.wildfires_detected,
            "activeAlerts": active_alerts,
        },
        "speciesData": species_data,
        "detections": recent.iter().take(20).collect::<Vec<_>>(),
    }))
}

/// Externally confirmed detection (`{"newDetection": {...}}` or bare)
async fn update_detection(
    State(state): State<AppState>,
    Json(body): Json<InboundAlertEnvelope>,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let event = body.into_inner().into_event(&state.config.camera_id, now)?;
    let event_id = event.event_id;
    let key = event.kind.to_string();

    tracing::info!(event_id = %event_id, key = %key, "Detection update received");

    let outcome = state.pipeline.ingest_confirmed(event, now);
    let message = match outcome {
        IngestOutcome::Queued => "Detection updated successfully",
        IngestOutcome::Suppressed(GateDecision::SuppressedCooldown) => {
            "Detection suppressed: cooldown active"
        }
        IngestOutcome::Suppressed(_) => "Detection suppressed: already alerted",
        IngestOutcome::Dropped => {
            return Err(Error::QueueFull(format!("alert {} dropped", event_id)));
        }
    };

    Ok(Json(json!({
        "success": true,
        "admitted": outcome.is_queued(),
        "message": message,
        "event_id": event_id,
        "key": key,
    })))
}

// ========================================
// Frame Ingestion
// ========================================

async fn ingest_frame(
    State(state): State<AppState>,
    Json(body): Json<InboundFrame>,
) -> impl IntoResponse {
    let frame = body.into_frame(&state.config.camera_id);
    let outcome = state.pipeline.process_frame(&frame);

    if outcome.confirmed > 0 {
        tracing::debug!(
            camera = %frame.source_id,
            confirmed = outcome.confirmed,
            admitted = outcome.admitted,
            dropped = outcome.dropped,
            "Frame processed"
        );
    }

    Json(ApiResponse::success(outcome))
}

// ========================================
// Alert Handlers
// ========================================

#[derive(Deserialize)]
struct AlertQuery {
    limit: Option<usize>,
    class: Option<String>,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(100);

    let alerts = match query.class.as_deref() {
        Some(label) => {
            let class = DetectionClass::parse(label)
                .ok_or_else(|| Error::Validation(format!("Unknown detection class: {}", label)))?;
            state.event_log.by_class(class, limit).await
        }
        None => state.event_log.latest(limit).await,
    };

    Ok(Json(ApiResponse::success(alerts)))
}

#[derive(Deserialize)]
struct RearmRequest {
    #[serde(rename = "type")]
    kind: String,
    species: Option<String>,
}

/// Clear the one-shot flag for a key; its cooldown still applies
async fn rearm_alert(
    State(state): State<AppState>,
    Json(req): Json<RearmRequest>,
) -> Result<impl IntoResponse> {
    let class = DetectionClass::parse(&req.kind)
        .ok_or_else(|| Error::Validation(format!("Unknown detection type: {}", req.kind)))?;
    let key = DetectionKind::from_class(class, req.species.as_deref());

    state.pipeline.gate().clear_one_shot(&key);

    Ok(Json(ApiResponse::success(json!({ "key": key.to_string() }))))
}

async fn dispatch_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(json!({
        "stats": state.dispatcher.stats(),
        "sinks": state.dispatcher.sink_names(),
        "queue_capacity": state.dispatcher.config().queue_capacity,
        "workers": state.dispatcher.config().worker_count,
    })))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Registers and queues the current counters as the first message
    let (conn_id, mut rx) = state.broadcaster.subscribe().await;

    tracing::info!(connection_id = %conn_id, "WebSocket observer connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let broadcaster = state.broadcaster.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) if text.trim() == "request_counters" => {
                    broadcaster.send_snapshot(&conn_id).await;
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket observer disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    run_until_either(send_task, recv_task).await;
    state.broadcaster.unsubscribe(&conn_id).await;
}

/// Wait for the first task to finish and abort the other
async fn run_until_either(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}
