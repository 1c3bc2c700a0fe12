//! DetectionPipeline - Frame to Alert
//!
//! ## Responsibilities
//!
//! - Run each frame through the tracker and gate on the caller's thread
//! - Hand admitted events to the dispatcher without blocking
//! - Accept events already confirmed upstream (dashboard ingestion path)
//! - Reset counters, dedup state and tracking state together

use crate::alert_dispatcher::AlertDispatcher;
use crate::alert_gate::{AlertGate, GateDecision};
use crate::confirmation_tracker::ConfirmationTracker;
use crate::counter_broadcaster::{CounterBroadcaster, CounterState};
use crate::event_log_service::EventLogService;
use crate::models::{ConfirmedEvent, FrameDetections};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// What happened to one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameOutcome {
    /// Events confirmed by the tracker on this frame
    pub confirmed: usize,
    /// Events the gate let through and the dispatcher accepted
    pub admitted: usize,
    /// Admitted events dropped because the dispatch queue was full
    pub dropped: usize,
}

/// What happened to one confirmed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Admitted by the gate and accepted by the dispatcher
    Queued,
    /// Held back by the gate
    Suppressed(GateDecision),
    /// Admitted, but the dispatch queue was full
    Dropped,
}

impl IngestOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, IngestOutcome::Queued)
    }
}

/// DetectionPipeline instance
pub struct DetectionPipeline {
    tracker: Arc<ConfirmationTracker>,
    gate: Arc<AlertGate>,
    dispatcher: Arc<AlertDispatcher>,
    broadcaster: Arc<CounterBroadcaster>,
    event_log: Arc<EventLogService>,
}

impl DetectionPipeline {
    /// Create new DetectionPipeline
    pub fn new(
        tracker: Arc<ConfirmationTracker>,
        gate: Arc<AlertGate>,
        dispatcher: Arc<AlertDispatcher>,
        broadcaster: Arc<CounterBroadcaster>,
        event_log: Arc<EventLogService>,
    ) -> Self {
        Self {
            tracker,
            gate,
            dispatcher,
            broadcaster,
            event_log,
        }
    }

    pub fn tracker(&self) -> &Arc<ConfirmationTracker> {
        &self.tracker
    }

    pub fn gate(&self) -> &Arc<AlertGate> {
        &self.gate
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    pub fn broadcaster(&self) -> &Arc<CounterBroadcaster> {
        &self.broadcaster
    }

    pub fn event_log(&self) -> &Arc<EventLogService> {
        &self.event_log
    }

    /// Process one frame. Never waits on sink I/O.
    pub fn process_frame(&self, frame: &FrameDetections) -> FrameOutcome {
        let confirmed = self.tracker.observe(frame);
        let mut outcome = FrameOutcome {
            confirmed: confirmed.len(),
            ..Default::default()
        };

        for event in confirmed {
            match self.offer(event, frame.captured_at) {
                IngestOutcome::Queued => outcome.admitted += 1,
                IngestOutcome::Dropped => outcome.dropped += 1,
                IngestOutcome::Suppressed(_) => {}
            }
        }
        outcome
    }

    /// Gate and dispatch an event confirmed outside the tracker
    pub fn ingest_confirmed(&self, event: ConfirmedEvent, now: DateTime<Utc>) -> IngestOutcome {
        self.offer(event, now)
    }

    fn offer(&self, event: ConfirmedEvent, now: DateTime<Utc>) -> IngestOutcome {
        let decision = self.gate.evaluate(&event, now);
        if decision != GateDecision::Admitted {
            tracing::debug!(
                key = %event.kind,
                decision = ?decision,
                "Confirmed event suppressed"
            );
            return IngestOutcome::Suppressed(decision);
        }

        tracing::info!(
            event_id = %event.event_id,
            key = %event.kind,
            confidence = event.confidence,
            camera = %event.source_id,
            "Alert admitted"
        );
        if self.dispatcher.submit(event) {
            IngestOutcome::Queued
        } else {
            IngestOutcome::Dropped
        }
    }

    /// Current counters
    pub async fn counters(&self) -> CounterState {
        self.broadcaster.snapshot().await
    }

    /// Zero counters and forget all alerted, cooldown and streak state
    ///
    /// Counters are zeroed before the gate is cleared, so an event admitted
    /// after the gate reset is always counted. Jobs already queued in the
    /// dispatcher are not recalled and still count once delivered.
    pub async fn reset(&self) -> CounterState {
        let counters = self.broadcaster.reset().await;
        self.gate.reset();
        self.tracker.reset();
        tracing::info!("Detections reset");
        counters
    }
}
