//! CounterBroadcaster - Detection Counters + Observer Publishing
//!
//! ## Responsibilities
//!
//! - Running totals per category (hunters, animals, wildfires)
//! - Atomic increment / reset, each returning an immutable snapshot
//! - Publishing every mutation to all observers before returning
//! - Greeting new observers with the current snapshot
//!
//! The counter lock is held while publishing, so observers see snapshots in
//! mutation order and a newly connected observer never sees a value older
//! than the last completed mutation.

use crate::models::{DetectionClass, DetectionKind};
use crate::realtime_hub::{
    DetectionAlertMessage, HubMessage, RealtimeHub, ResetSignalMessage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Counter category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterCategory {
    Hunters,
    Animals,
    Wildfires,
}

impl From<DetectionClass> for CounterCategory {
    fn from(class: DetectionClass) -> Self {
        match class {
            DetectionClass::Person => CounterCategory::Hunters,
            DetectionClass::Animal => CounterCategory::Animals,
            DetectionClass::Fire => CounterCategory::Wildfires,
        }
    }
}

impl From<&DetectionKind> for CounterCategory {
    fn from(kind: &DetectionKind) -> Self {
        kind.class().into()
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub hunters_detected: u64,
    pub animals_detected: u64,
    pub wildfires_detected: u64,
}

impl CounterState {
    pub fn total_detections(&self) -> u64 {
        self.hunters_detected + self.animals_detected + self.wildfires_detected
    }

    pub fn get(&self, category: CounterCategory) -> u64 {
        match category {
            CounterCategory::Hunters => self.hunters_detected,
            CounterCategory::Animals => self.animals_detected,
            CounterCategory::Wildfires => self.wildfires_detected,
        }
    }

    fn bump(&mut self, category: CounterCategory) {
        let slot = match category {
            CounterCategory::Hunters => &mut self.hunters_detected,
            CounterCategory::Animals => &mut self.animals_detected,
            CounterCategory::Wildfires => &mut self.wildfires_detected,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Alert fields published alongside the incremented counters
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub event_id: Uuid,
    pub kind: DetectionKind,
    pub confidence: u8,
    pub camera: String,
    pub timestamp: String,
    pub image: Option<String>,
}

/// CounterBroadcaster instance
pub struct CounterBroadcaster {
    counters: Mutex<CounterState>,
    hub: Arc<RealtimeHub>,
}

impl CounterBroadcaster {
    /// Create new CounterBroadcaster
    pub fn new(hub: Arc<RealtimeHub>) -> Self {
        Self {
            counters: Mutex::new(CounterState::default()),
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> CounterState {
        *self.counters.lock().await
    }

    /// Bump one counter and publish the new snapshot
    pub async fn increment(&self, category: CounterCategory) -> CounterState {
        let mut counters = self.counters.lock().await;
        counters.bump(category);
        let snapshot = *counters;
        self.hub.broadcast(HubMessage::CountersUpdate(snapshot)).await;
        snapshot
    }

    /// Bump the alert's counter and publish the alert with the new snapshot
    pub async fn record_alert(&self, notice: AlertNotice) -> CounterState {
        let presentation = crate::models::AlertPresentation::for_kind(&notice.kind);

        let mut counters = self.counters.lock().await;
        counters.bump(CounterCategory::from(&notice.kind));
        let snapshot = *counters;

        self.hub
            .broadcast(HubMessage::DetectionAlert(DetectionAlertMessage {
                alert_type: presentation.dashboard_type.to_string(),
                name: presentation.name,
                image: notice.image,
                timestamp: notice.timestamp,
                counters: snapshot,
                event_id: notice.event_id,
                species: notice.kind.species_label(),
                confidence: notice.confidence,
                camera: notice.camera,
            }))
            .await;
        self.hub.broadcast(HubMessage::CountersUpdate(snapshot)).await;

        tracing::info!(
            event_id = %notice.event_id,
            key = %notice.kind,
            hunters = snapshot.hunters_detected,
            animals = snapshot.animals_detected,
            wildfires = snapshot.wildfires_detected,
            "Alert recorded"
        );

        snapshot
    }

    /// Zero all counters and publish the reset
    pub async fn reset(&self) -> CounterState {
        let mut counters = self.counters.lock().await;
        *counters = CounterState::default();
        let snapshot = *counters;
        self.hub
            .broadcast(HubMessage::ResetSignal(ResetSignalMessage::new(snapshot)))
            .await;
        self.hub.broadcast(HubMessage::CountersUpdate(snapshot)).await;
        tracing::info!("Counters reset");
        snapshot
    }

    /// Register an observer; it receives the current snapshot first
    pub async fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let counters = self.counters.lock().await;
        let (id, rx) = self.hub.register().await;
        self.hub
            .send_to(&id, HubMessage::CountersUpdate(*counters))
            .await;
        (id, rx)
    }

    /// Push the current snapshot to one observer
    pub async fn send_snapshot(&self, id: &Uuid) {
        let counters = self.counters.lock().await;
        self.hub
            .send_to(id, HubMessage::CountersUpdate(*counters))
            .await;
    }

    pub async fn unsubscribe(&self, id: &Uuid) {
        self.hub.unregister(id).await;
    }

    pub fn observer_count(&self) -> u64 {
        self.hub.connection_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> Arc<CounterBroadcaster> {
        Arc::new(CounterBroadcaster::new(Arc::new(RealtimeHub::new())))
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
        serde_json::from_str(&rx.try_recv().expect("message pending")).unwrap()
    }

    #[tokio::test]
    async fn test_increment_returns_snapshot() {
        let b = broadcaster();
        let s = b.increment(CounterCategory::Hunters).await;
        assert_eq!(s.hunters_detected, 1);
        let s = b.increment(CounterCategory::Wildfires).await;
        assert_eq!(s.wildfires_detected, 1);
        assert_eq!(s.total_detections(), 2);
        assert_eq!(b.snapshot().await, s);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_exact() {
        let b = broadcaster();
        let mut handles = Vec::new();
        for i in 0..200 {
            let b = b.clone();
            let category = if i % 2 == 0 {
                CounterCategory::Hunters
            } else {
                CounterCategory::Animals
            };
            handles.push(tokio::spawn(async move { b.increment(category).await }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let s = b.snapshot().await;
        assert_eq!(s.hunters_detected, 100);
        assert_eq!(s.animals_detected, 100);
        assert_eq!(s.wildfires_detected, 0);
    }

    #[tokio::test]
    async fn test_subscriber_greeted_with_latest() {
        let b = broadcaster();
        b.increment(CounterCategory::Animals).await;

        let (_id, mut rx) = b.subscribe().await;
        let msg = next(&mut rx);
        assert_eq!(msg["type"], "counters_update");
        assert_eq!(msg["data"]["animals_detected"], 1);
    }

    #[tokio::test]
    async fn test_reset_is_visible_immediately() {
        let b = broadcaster();
        b.increment(CounterCategory::Hunters).await;
        let (_id, mut rx) = b.subscribe().await;
        let _greeting = next(&mut rx);

        let s = b.reset().await;
        assert_eq!(s, CounterState::default());
        assert_eq!(b.snapshot().await, CounterState::default());

        let reset = next(&mut rx);
        assert_eq!(reset["type"], "reset_signal");
        assert_eq!(reset["data"]["counters"]["hunters_detected"], 0);

        let (_late, mut late_rx) = b.subscribe().await;
        let greeting = next(&mut late_rx);
        assert_eq!(greeting["data"]["hunters_detected"], 0);
    }

    #[tokio::test]
    async fn test_record_alert_publishes_alert_with_counters() {
        let b = broadcaster();
        let (_id, mut rx) = b.subscribe().await;
        let _greeting = next(&mut rx);

        b.record_alert(AlertNotice {
            event_id: Uuid::new_v4(),
            kind: DetectionKind::animal("tiger"),
            confidence: 88,
            camera: "Cam-01".to_string(),
            timestamp: "2025-06-01 12:00:00".to_string(),
            image: None,
        })
        .await;

        let alert = next(&mut rx);
        assert_eq!(alert["type"], "detection_alert");
        assert_eq!(alert["data"]["type"], "animal");
        assert_eq!(alert["data"]["name"], "Tiger Detected");
        assert!(alert["data"]["image"].is_null());
        assert_eq!(alert["data"]["counters"]["animals_detected"], 1);

        let counters = next(&mut rx);
        assert_eq!(counters["type"], "counters_update");
    }
}
