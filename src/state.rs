//! Application state
//!
//! Holds all shared components and state

use crate::alert_dispatcher::sinks::{
    ConsoleSink, EventLogSink, ImageStoreSink, RealtimeSink, RemoteIngestSink,
};
use crate::alert_dispatcher::{AlertDispatcher, AlertSink, DispatcherConfig, RetryPolicy};
use crate::alert_gate::{AlertGate, GateConfig, GatePolicy};
use crate::confirmation_tracker::{ConfirmationTracker, TrackerConfig};
use crate::counter_broadcaster::CounterBroadcaster;
use crate::detection_pipeline::DetectionPipeline;
use crate::error::Result;
use crate::event_log_service::EventLogService;
use crate::models::DetectionClass;
use crate::realtime_hub::RealtimeHub;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Where alert snapshots are written (served under /images)
    pub images_dir: PathBuf,
    /// Optional dashboard bundle served as the fallback route
    pub static_dir: Option<PathBuf>,
    /// Default camera id for frames and alerts that carry none
    pub camera_id: String,
    /// Blindspot label sent to the ingestion endpoint
    pub camera_blindspot: String,
    /// Remote ingestion endpoint (None = sink disabled)
    pub remote_ingest_url: Option<String>,
    /// Total attempts for the remote sink (1 = no retry)
    pub remote_max_attempts: u32,
    pub confirm_frames: usize,
    pub min_box_area: u32,
    pub tracker_idle_frames: u64,
    /// Per-class confidence floors in [0, 1] (0 = accept everything)
    pub min_conf_person: f64,
    pub min_conf_fire: f64,
    pub min_conf_animal: f64,
    pub cooldown: Duration,
    pub one_shot_alerts: bool,
    pub dispatch_queue_capacity: usize,
    pub dispatch_workers: usize,
    pub sink_timeout: Duration,
    pub event_log_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 5000),
            images_dir: std::env::var("IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./images")),
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
            camera_id: std::env::var("CAMERA_ID").unwrap_or_else(|_| "Cam-01".to_string()),
            camera_blindspot: std::env::var("CAMERA_BLINDSPOT")
                .unwrap_or_else(|_| "No".to_string()),
            remote_ingest_url: std::env::var("REMOTE_INGEST_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            remote_max_attempts: env_or("REMOTE_MAX_ATTEMPTS", 1),
            confirm_frames: env_or("CONFIRM_FRAMES", 3),
            min_box_area: env_or("MIN_BOX_AREA", 1500),
            tracker_idle_frames: env_or("TRACKER_IDLE_FRAMES", 150),
            min_conf_person: env_or("MIN_CONF_PERSON", 0.0),
            min_conf_fire: env_or("MIN_CONF_FIRE", 0.0),
            min_conf_animal: env_or("MIN_CONF_ANIMAL", 0.0),
            cooldown: Duration::from_secs(env_or("COOLDOWN_SECS", 10)),
            one_shot_alerts: env_flag("ONE_SHOT_ALERTS", true),
            dispatch_queue_capacity: env_or("DISPATCH_QUEUE_CAPACITY", 10),
            dispatch_workers: env_or("DISPATCH_WORKERS", 4),
            sink_timeout: Duration::from_millis(env_or("SINK_TIMEOUT_MS", 2000)),
            event_log_capacity: env_or("EVENT_LOG_CAPACITY", 500),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        let min_confidence = [
            (DetectionClass::Person, self.min_conf_person),
            (DetectionClass::Fire, self.min_conf_fire),
            (DetectionClass::Animal, self.min_conf_animal),
        ]
        .into_iter()
        .filter(|(_, floor)| floor.is_finite() && *floor > 0.0)
        .map(|(class, floor)| (class, floor.min(1.0)))
        .collect();

        TrackerConfig {
            confirm_frames: self.confirm_frames,
            min_box_area: self.min_box_area,
            idle_frames: self.tracker_idle_frames,
            min_confidence,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            default: GatePolicy {
                one_shot: self.one_shot_alerts,
                cooldown: self.cooldown,
            },
            ..Default::default()
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            queue_capacity: self.dispatch_queue_capacity,
            worker_count: self.dispatch_workers,
            sink_timeout: self.sink_timeout,
        }
    }

    pub fn remote_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.remote_max_attempts,
            Duration::from_millis(500),
            Duration::from_secs(5),
        )
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// DetectionPipeline (tracker -> gate -> dispatcher)
    pub pipeline: Arc<DetectionPipeline>,
    /// AlertDispatcher (bounded queue + workers)
    pub dispatcher: Arc<AlertDispatcher>,
    /// CounterBroadcaster (counters + observers)
    pub broadcaster: Arc<CounterBroadcaster>,
    /// EventLogService (recent alerts ring buffer)
    pub event_log: Arc<EventLogService>,
    pub started_at: Instant,
}

impl AppState {
    /// Build every component and start the dispatch workers.
    /// Must be called within a tokio runtime.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let hub = Arc::new(RealtimeHub::new());
        let broadcaster = Arc::new(CounterBroadcaster::new(hub));
        let event_log = Arc::new(EventLogService::new(config.event_log_capacity));

        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![
            Arc::new(ImageStoreSink::new(config.images_dir.clone()).await?),
            Arc::new(ConsoleSink),
            Arc::new(RealtimeSink::new(broadcaster.clone())),
            Arc::new(EventLogSink::new(event_log.clone())),
        ];

        if let Some(url) = &config.remote_ingest_url {
            let remote = RemoteIngestSink::new(url.clone(), config.sink_timeout)?
                .with_blindspot(config.camera_blindspot.clone())
                .with_retry(config.remote_retry_policy());
            tracing::info!(url = %url, "Remote ingest sink enabled");
            sinks.push(Arc::new(remote));
        }

        let dispatcher = AlertDispatcher::start(config.dispatcher_config(), sinks);

        let pipeline = Arc::new(DetectionPipeline::new(
            Arc::new(ConfirmationTracker::new(config.tracker_config())),
            Arc::new(AlertGate::new(config.gate_config())),
            dispatcher.clone(),
            broadcaster.clone(),
            event_log.clone(),
        ));

        Ok(Self {
            config,
            pipeline,
            dispatcher,
            broadcaster,
            event_log,
            started_at: Instant::now(),
        })
    }
}
