//! End-to-end tests through the public library API

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wildguard_server::alert_dispatcher::sinks::{EventLogSink, RealtimeSink, RemoteIngestSink};
use wildguard_server::alert_dispatcher::{AlertDispatcher, AlertSink, DispatcherConfig, RetryPolicy};
use wildguard_server::alert_gate::{AlertGate, GateConfig};
use wildguard_server::confirmation_tracker::{ConfirmationTracker, TrackerConfig};
use wildguard_server::counter_broadcaster::CounterBroadcaster;
use wildguard_server::detection_pipeline::DetectionPipeline;
use wildguard_server::event_log_service::EventLogService;
use wildguard_server::models::{ConfirmedEvent, DetectionKind, FrameDetections, RawDetection};
use wildguard_server::realtime_hub::RealtimeHub;
use wildguard_server::state::{AppConfig, AppState};
use wildguard_server::web_api;

type Captured = Arc<Mutex<Vec<Value>>>;

fn dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        queue_capacity: 10,
        worker_count: 4,
        sink_timeout: Duration::from_secs(2),
    }
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("wildguard-{}-{}", tag, uuid::Uuid::new_v4()))
}

/// Local stand-in for the remote ingestion endpoint
async fn spawn_ingest_server(status: StatusCode) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route(
            "/api/detection/update",
            post(
                move |State(seen): State<Captured>, Json(body): Json<Value>| async move {
                    seen.lock().push(body);
                    status
                },
            ),
        )
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api/detection/update", addr), captured)
}

#[tokio::test]
async fn person_streak_confirms_once_with_averaged_confidence() {
    let hub = Arc::new(RealtimeHub::new());
    let broadcaster = Arc::new(CounterBroadcaster::new(hub));
    let event_log = Arc::new(EventLogService::new(50));
    let dispatcher = AlertDispatcher::start(
        dispatcher_config(),
        vec![
            Arc::new(RealtimeSink::new(broadcaster.clone())) as Arc<dyn AlertSink>,
            Arc::new(EventLogSink::new(event_log.clone())),
        ],
    );
    let pipeline = DetectionPipeline::new(
        Arc::new(ConfirmationTracker::new(TrackerConfig::default())),
        Arc::new(AlertGate::new(GateConfig::default())),
        dispatcher.clone(),
        broadcaster.clone(),
        event_log.clone(),
    );

    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap();
    let confidences = [0.6, 0.7, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8];
    let mut confirmed_at = Vec::new();
    for (i, c) in confidences.iter().enumerate() {
        let frame = FrameDetections::new(
            "Cam-01",
            vec![RawDetection::new(DetectionKind::Person, *c, 1500)],
        )
        .at(t0 + ChronoDuration::milliseconds(200 * i as i64));
        if pipeline.process_frame(&frame).confirmed > 0 {
            confirmed_at.push(i + 1);
        }
    }
    assert_eq!(confirmed_at, vec![3]);

    dispatcher.shutdown().await;

    let records = event_log.latest(10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, DetectionKind::Person);
    assert_eq!(records[0].confidence, 70);
    assert_eq!(broadcaster.snapshot().await.hunters_detected, 1);
}

#[tokio::test]
async fn remote_sink_posts_new_detection_envelope() {
    let (url, captured) = spawn_ingest_server(StatusCode::OK).await;
    let remote = RemoteIngestSink::new(url, Duration::from_secs(2))
        .unwrap()
        .with_blindspot("No");
    let dispatcher = AlertDispatcher::start(
        dispatcher_config(),
        vec![Arc::new(remote) as Arc<dyn AlertSink>],
    );

    let ts = Utc.with_ymd_and_hms(2025, 6, 1, 6, 30, 0).unwrap();
    assert!(dispatcher.submit(ConfirmedEvent::new(DetectionKind::Fire, 88, ts, "Cam-02")));
    dispatcher.shutdown().await;

    assert_eq!(dispatcher.stats().sink_failures, 0);
    let bodies = captured.lock();
    assert_eq!(bodies.len(), 1);
    let d = &bodies[0]["newDetection"];
    assert_eq!(d["type"], "fire");
    assert_eq!(d["species"], "Fire");
    assert_eq!(d["confidence"], 88);
    assert_eq!(d["camera"], "Cam-02");
    assert_eq!(d["blindspot"], "No");
    assert_eq!(d["timestamp"], "2025-06-01 06:30:00");
}

#[tokio::test]
async fn remote_sink_failure_is_retried_and_isolated() {
    let (url, captured) = spawn_ingest_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let remote = RemoteIngestSink::new(url, Duration::from_secs(2))
        .unwrap()
        .with_retry(RetryPolicy::exponential(
            2,
            Duration::from_millis(10),
            Duration::from_millis(50),
        ));

    let broadcaster = Arc::new(CounterBroadcaster::new(Arc::new(RealtimeHub::new())));
    let dispatcher = AlertDispatcher::start(
        dispatcher_config(),
        vec![
            Arc::new(remote) as Arc<dyn AlertSink>,
            Arc::new(RealtimeSink::new(broadcaster.clone())),
        ],
    );

    assert!(dispatcher.submit(ConfirmedEvent::new(
        DetectionKind::animal("Elephant"),
        76,
        Utc::now(),
        "Cam-01",
    )));
    dispatcher.shutdown().await;

    assert_eq!(captured.lock().len(), 2);
    assert_eq!(dispatcher.stats().sink_failures, 1);
    assert_eq!(broadcaster.snapshot().await.animals_detected, 1);
}

#[tokio::test]
async fn observer_after_reset_sees_zeroed_counters() {
    let broadcaster = Arc::new(CounterBroadcaster::new(Arc::new(RealtimeHub::new())));
    let dispatcher = AlertDispatcher::start(
        dispatcher_config(),
        vec![Arc::new(RealtimeSink::new(broadcaster.clone())) as Arc<dyn AlertSink>],
    );
    let pipeline = DetectionPipeline::new(
        Arc::new(ConfirmationTracker::default()),
        Arc::new(AlertGate::default()),
        dispatcher.clone(),
        broadcaster.clone(),
        Arc::new(EventLogService::default()),
    );

    let now = Utc::now();
    for kind in [DetectionKind::Person, DetectionKind::Fire, DetectionKind::animal("deer")] {
        let event = ConfirmedEvent::new(kind, 80, now, "Cam-01");
        assert!(pipeline.ingest_confirmed(event, now).is_queued());
    }
    while dispatcher.stats().processed < 3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(pipeline.counters().await.total_detections(), 3);

    pipeline.reset().await;

    let (_id, mut rx) = broadcaster.subscribe().await;
    let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(first["type"], "counters_update");
    assert_eq!(first["data"]["hunters_detected"], 0);
    assert_eq!(first["data"]["animals_detected"], 0);
    assert_eq!(first["data"]["wildfires_detected"], 0);

    dispatcher.shutdown().await;
}

fn test_config(images_dir: PathBuf) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        images_dir,
        static_dir: None,
        camera_id: "Cam-01".to_string(),
        camera_blindspot: "No".to_string(),
        remote_ingest_url: None,
        remote_max_attempts: 1,
        confirm_frames: 3,
        min_box_area: 1500,
        tracker_idle_frames: 150,
        min_conf_person: 0.6,
        min_conf_fire: 0.6,
        min_conf_animal: 0.5,
        cooldown: Duration::from_secs(10),
        one_shot_alerts: true,
        dispatch_queue_capacity: 10,
        dispatch_workers: 2,
        sink_timeout: Duration::from_secs(2),
        event_log_capacity: 100,
    }
}

#[tokio::test]
async fn http_surface_update_counters_and_reset() {
    let images_dir = temp_dir("http");
    let state = AppState::build(test_config(images_dir.clone())).await.unwrap();
    let app = web_api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/api/detection/update", base))
        .json(&serde_json::json!({
            "newDetection": {
                "id": 1,
                "type": "person",
                "species": "Human",
                "confidence": 91,
                "camera": "Cam-01",
                "blindspot": "No",
                "timestamp": "2025-06-01 06:00:00"
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["admitted"], true);

    // one-shot: the same key is suppressed
    let body: Value = client
        .post(format!("{}/api/detection/update", base))
        .json(&serde_json::json!({ "type": "person", "confidence": 95 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["admitted"], false);

    let mut counters = Value::Null;
    for _ in 0..100 {
        counters = client
            .get(format!("{}/counters", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if counters["hunters_detected"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(counters["hunters_detected"], 1);

    let bad = client
        .post(format!("{}/api/detection/update", base))
        .json(&serde_json::json!({ "newDetection": { "type": "spaceship" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);

    let reset: Value = client
        .post(format!("{}/reset", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["success"], true);
    assert_eq!(reset["counters"]["hunters_detected"], 0);

    let data: Value = client
        .get(format!("{}/api/detection/data", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(data["summary"]["totalDetections"], 0);

    state.dispatcher.shutdown().await;
    let _ = tokio::fs::remove_dir_all(&images_dir).await;
}

#[tokio::test]
async fn http_frames_confirm_after_three_frames() {
    let images_dir = temp_dir("frames");
    let state = AppState::build(test_config(images_dir.clone())).await.unwrap();
    let app = web_api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let mut confirmed = Vec::new();
    for _ in 0..4 {
        let body: Value = client
            .post(format!("{}/api/frames", base))
            .json(&serde_json::json!({
                "camera": "Cam-03",
                "detections": [
                    { "type": "animal", "species": "Tiger", "confidence": 0.9, "boxArea": 5000 },
                    { "type": "animal", "species": "Deer", "confidence": 0.9, "boxArea": 200 }
                ]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
        confirmed.push(body["data"]["confirmed"].as_u64().unwrap());
    }
    assert_eq!(confirmed, vec![0, 0, 1, 0]);

    state.dispatcher.shutdown().await;
    let alerts = state.event_log.latest(10).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, DetectionKind::animal("tiger"));
    assert_eq!(alerts[0].camera, "Cam-03");

    let _ = tokio::fs::remove_dir_all(&images_dir).await;
}

#[tokio::test]
async fn http_frames_survive_malformed_entries() {
    let images_dir = temp_dir("malformed");
    let state = AppState::build(test_config(images_dir.clone())).await.unwrap();
    let app = web_api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let mut confirmed = Vec::new();
    for second in 0..3 {
        let response = client
            .post(format!("{}/api/frames", base))
            .json(&serde_json::json!({
                "captured_at": format!("2025-06-01 12:00:0{}", second),
                "detections": [
                    { "type": "fire", "confidence": 0.9, "boxArea": 4000 },
                    { "type": "animal", "species": "deer", "confidence": 0.9, "boxArea": 1600.5 },
                    { "type": "animal", "species": "boar", "confidence": 0.9, "boxArea": -3 },
                    null
                ]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        confirmed.push(body["data"]["confirmed"].as_u64().unwrap());
    }
    // fire and deer confirm; the boar's clamped area is below the floor
    assert_eq!(confirmed, vec![0, 0, 2]);

    state.dispatcher.shutdown().await;
    let alerts = state.event_log.latest(10).await;
    assert_eq!(alerts.len(), 2);
    let fire = alerts
        .iter()
        .find(|a| a.kind == DetectionKind::Fire)
        .unwrap();
    assert_eq!(
        fire.detected_at,
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 2).unwrap()
    );

    let _ = tokio::fs::remove_dir_all(&images_dir).await;
}
