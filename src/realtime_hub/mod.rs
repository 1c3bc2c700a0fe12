//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - Observer connection management
//! - Detection alert broadcasting (dashboard alert feed)
//! - Counter snapshot distribution
//! - Reset signal distribution
//!
//! Note: Only image REFERENCES are sent (e.g. `/images/hunter_20250601_120000.jpg`).
//! Image bytes are fetched via HTTP GET.

use crate::counter_broadcaster::CounterState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// Current counters (sent on connect and after every mutation)
    CountersUpdate(CounterState),
    /// A confirmed, admitted detection
    DetectionAlert(DetectionAlertMessage),
    /// Counters were zeroed
    ResetSignal(ResetSignalMessage),
}

impl HubMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            HubMessage::CountersUpdate(_) => "counters_update",
            HubMessage::DetectionAlert(_) => "detection_alert",
            HubMessage::ResetSignal(_) => "reset_signal",
        }
    }
}

/// Detection alert message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionAlertMessage {
    /// Dashboard type: hunter / animal / fire
    #[serde(rename = "type")]
    pub alert_type: String,
    pub name: String,
    /// Stored image reference, null when no snapshot was stored
    pub image: Option<String>,
    pub timestamp: String,
    pub counters: CounterState,
    pub event_id: Uuid,
    pub species: String,
    pub confidence: u8,
    pub camera: String,
}

/// Reset signal message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetSignalMessage {
    /// Always "reset"
    #[serde(rename = "type")]
    pub signal_type: String,
    pub message: String,
    pub counters: CounterState,
}

impl ResetSignalMessage {
    pub fn new(counters: CounterState) -> Self {
        Self {
            signal_type: "reset".to_string(),
            message: "Detections reset successfully".to_string(),
            counters,
        }
    }
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        tracing::debug!(message_type = %message.message_type(), "Broadcasting message to clients");

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        tracing::trace!(client_count = connections.len(), "Sending to connected clients");

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Send message to one client
    pub async fn send_to(&self, id: &Uuid, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(id) {
            if let Err(e) = conn.tx.send(json) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_clients() {
        let hub = RealtimeHub::new();
        let (_a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;

        hub.broadcast(HubMessage::CountersUpdate(CounterState::default()))
            .await;

        for rx in [&mut rx_a, &mut rx_b] {
            let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(msg["type"], "counters_update");
            assert_eq!(msg["data"]["hunters_detected"], 0);
        }
    }

    #[tokio::test]
    async fn test_send_to_single_client() {
        let hub = RealtimeHub::new();
        let (a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;

        hub.send_to(&a, HubMessage::ResetSignal(ResetSignalMessage::new(CounterState::default())))
            .await;

        let msg: serde_json::Value = serde_json::from_str(&rx_a.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "reset_signal");
        assert_eq!(msg["data"]["type"], "reset");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_updates_count() {
        let hub = RealtimeHub::new();
        let (a, _rx) = hub.register().await;
        assert_eq!(hub.connection_count(), 1);
        hub.unregister(&a).await;
        hub.unregister(&a).await;
        assert_eq!(hub.connection_count(), 0);
    }
}
