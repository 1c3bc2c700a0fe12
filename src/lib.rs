//! WildGuard Alert Server Library
//!
//! Detection confirmation and alert dispatch for wildlife-protection cameras
//!
//! ## Architecture (8 Components)
//!
//! 1. ConfirmationTracker - Per-key streaks and confidence windows
//! 2. AlertGate - One-shot dedup and cooldown
//! 3. AlertDispatcher - Bounded queue, worker lanes, sink fan-out
//! 4. CounterBroadcaster - Detection counters published to observers
//! 5. RealtimeHub - WebSocket distribution
//! 6. EventLogService - Recent alerts (ring buffer)
//! 7. DetectionPipeline - Frame -> tracker -> gate -> dispatcher
//! 8. WebAPI - Control surface and ingestion endpoints
//!
//! ## Design Principles
//!
//! - The detection loop never waits on sink I/O
//! - One lock per shared structure; every read-modify-write happens under it
//! - Tracking keys are typed (`DetectionKind`), never parsed from strings

pub mod alert_dispatcher;
pub mod alert_gate;
pub mod confirmation_tracker;
pub mod counter_broadcaster;
pub mod detection_pipeline;
pub mod event_log_service;
pub mod realtime_hub;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
