//! AlertGate types

use crate::error::{Error, Result};
use crate::models::{lenient, parse_timestamp, ConfirmedEvent, DetectionClass, DetectionKind};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Suppression policy for one class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// Alert once per key until explicitly cleared
    pub one_shot: bool,
    /// Minimum time between two admitted alerts for a key
    pub cooldown: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            one_shot: true,
            cooldown: Duration::from_secs(10),
        }
    }
}

impl GatePolicy {
    /// Cooldown as a chrono delta; out-of-range values saturate to a century
    pub fn cooldown_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cooldown)
            .unwrap_or_else(|_| chrono::Duration::days(36_500))
    }
}

/// Gate configuration
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    pub default: GatePolicy,
    pub overrides: HashMap<DetectionClass, GatePolicy>,
}

impl GateConfig {
    pub fn policy_for(&self, class: DetectionClass) -> GatePolicy {
        self.overrides.get(&class).copied().unwrap_or(self.default)
    }
}

/// Per-key suppression state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateEntry {
    pub alerted: bool,
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admitted,
    /// Key already alerted and one-shot is on
    SuppressedOneShot,
    /// Key alerted within the cooldown window
    SuppressedCooldown,
}

impl GateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, GateDecision::Admitted)
    }
}

/// Externally confirmed detection (POST /api/detection/update)
///
/// Accepts both the bare object and the `{"newDetection": {...}}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundAlert {
    /// Kept as the event id when it is a UUID
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub species: Option<String>,
    /// 0-100
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub camera: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub blindspot: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundAlertEnvelope {
    Wrapped {
        #[serde(rename = "newDetection")]
        new_detection: InboundAlert,
    },
    Bare(InboundAlert),
}

impl InboundAlertEnvelope {
    pub fn into_inner(self) -> InboundAlert {
        match self {
            InboundAlertEnvelope::Wrapped { new_detection } => new_detection,
            InboundAlertEnvelope::Bare(alert) => alert,
        }
    }
}

impl InboundAlert {
    /// Convert into a confirmed event
    ///
    /// `type` is required; species, confidence, camera and timestamp fall back
    /// to defaults. A UUID `id` and a `blindspot` label are carried through to
    /// the sinks.
    pub fn into_event(self, default_source: &str, now: DateTime<Utc>) -> Result<ConfirmedEvent> {
        let label = self
            .kind
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Validation("No detection data provided".to_string()))?;
        let class = DetectionClass::parse(label)
            .ok_or_else(|| Error::Validation(format!("Unknown detection type: {}", label)))?;

        let kind = DetectionKind::from_class(class, self.species.as_deref());
        let confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let source = self
            .camera
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_source.to_string());

        let mut event =
            ConfirmedEvent::new(kind, confidence, timestamp, source).with_blindspot(self.blindspot);
        if let Some(id) = self.id.as_deref().and_then(|id| Uuid::parse_str(id.trim()).ok()) {
            event = event.with_event_id(id);
        }
        Ok(event)
    }
}
