//! Shared models and types
//!
//! Types used by the tracker, gate, dispatcher and web API live here
//! to avoid circular dependencies between components.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub observers: u64,
    pub queue_depth: usize,
    pub remote_sink_enabled: bool,
}

/// Detection class, without species
///
/// Policies (gate cooldowns, confidence floors) and counters are keyed by class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionClass {
    Person,
    Fire,
    Animal,
}

impl DetectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::Person => "person",
            DetectionClass::Fire => "fire",
            DetectionClass::Animal => "animal",
        }
    }

    /// Parse an inference-stage label ("person", "fire", "animal", "hunter", "wildfire")
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "person" | "hunter" | "human" => Some(DetectionClass::Person),
            "fire" | "wildfire" => Some(DetectionClass::Fire),
            "animal" => Some(DetectionClass::Animal),
            _ => None,
        }
    }
}

impl fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Species used when an animal detection carries none
pub const UNKNOWN_SPECIES: &str = "unknown";

/// What was detected
///
/// Also serves as the tracking key: Person and Fire are tracked per class,
/// animals per species, so a tiger and a deer confirm independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectionKind {
    Person,
    Fire,
    Animal { species: String },
}

/// Identity scoping confirmation, dedup and cooldown state
pub type TrackingKey = DetectionKind;

impl DetectionKind {
    /// Animal kind with a normalized species name
    pub fn animal(species: impl AsRef<str>) -> Self {
        let species = species.as_ref().trim().to_lowercase();
        DetectionKind::Animal {
            species: if species.is_empty() {
                UNKNOWN_SPECIES.to_string()
            } else {
                species
            },
        }
    }

    /// Build a kind from class + optional species label
    pub fn from_class(class: DetectionClass, species: Option<&str>) -> Self {
        match class {
            DetectionClass::Person => DetectionKind::Person,
            DetectionClass::Fire => DetectionKind::Fire,
            DetectionClass::Animal => DetectionKind::animal(species.unwrap_or(UNKNOWN_SPECIES)),
        }
    }

    pub fn class(&self) -> DetectionClass {
        match self {
            DetectionKind::Person => DetectionClass::Person,
            DetectionKind::Fire => DetectionClass::Fire,
            DetectionKind::Animal { .. } => DetectionClass::Animal,
        }
    }

    /// Human-readable species ("Human", "Fire", "Tiger")
    pub fn species_label(&self) -> String {
        match self {
            DetectionKind::Person => "Human".to_string(),
            DetectionKind::Fire => "Fire".to_string(),
            DetectionKind::Animal { species } => capitalize(species),
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionKind::Person => f.write_str("person"),
            DetectionKind::Fire => f.write_str("fire"),
            DetectionKind::Animal { species } => write!(f, "animal:{}", species),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One raw candidate detection from the inference stage
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub kind: DetectionKind,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Bounding box area in pixels
    pub box_area: u32,
}

impl RawDetection {
    pub fn new(kind: DetectionKind, confidence: f64, box_area: u32) -> Self {
        Self {
            kind,
            confidence,
            box_area,
        }
    }
}

/// Encoded frame image (JPEG), opaque to the core
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot(Arc<Vec<u8>>);

impl Snapshot {
    pub fn new(data: Vec<u8>) -> Self {
        Self(Arc::new(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({} bytes)", self.0.len())
    }
}

/// All detections for a single processed frame
#[derive(Debug, Clone)]
pub struct FrameDetections {
    pub source_id: String,
    pub captured_at: DateTime<Utc>,
    pub detections: Vec<RawDetection>,
    pub snapshot: Option<Snapshot>,
}

impl FrameDetections {
    pub fn new(source_id: impl Into<String>, detections: Vec<RawDetection>) -> Self {
        Self {
            source_id: source_id.into(),
            captured_at: Utc::now(),
            detections,
            snapshot: None,
        }
    }

    pub fn at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// A detection that survived the confirmation window
#[derive(Debug, Clone)]
pub struct ConfirmedEvent {
    pub event_id: Uuid,
    pub kind: DetectionKind,
    /// Rounded mean confidence of the window, 0-100
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    /// Blindspot label reported upstream; sinks fall back to their own
    pub blindspot: Option<String>,
    pub snapshot: Option<Snapshot>,
}

impl ConfirmedEvent {
    pub fn new(
        kind: DetectionKind,
        confidence: u8,
        timestamp: DateTime<Utc>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            confidence: confidence.min(100),
            timestamp,
            source_id: source_id.into(),
            blindspot: None,
            snapshot: None,
        }
    }

    /// Keep an id assigned upstream
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_blindspot(mut self, blindspot: Option<String>) -> Self {
        self.blindspot = blindspot.filter(|b| !b.trim().is_empty());
        self
    }

    pub fn with_snapshot(mut self, snapshot: Option<Snapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn presentation(&self) -> AlertPresentation {
        AlertPresentation::for_kind(&self.kind)
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    High,
    Critical,
}

/// How an alert is titled and labelled for humans and the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPresentation {
    /// Dashboard type: hunter / animal / fire
    pub dashboard_type: &'static str,
    /// Dashboard display name
    pub name: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
}

impl AlertPresentation {
    pub fn for_kind(kind: &DetectionKind) -> Self {
        match kind {
            DetectionKind::Person => Self {
                dashboard_type: "hunter",
                name: "Hunter Detected".to_string(),
                title: "HUNTER DETECTED".to_string(),
                message: "Illegal hunting activity detected in protected area!".to_string(),
                severity: AlertSeverity::Critical,
            },
            DetectionKind::Fire => Self {
                dashboard_type: "fire",
                name: "Wildfire Detected".to_string(),
                title: "WILDFIRE DETECTED".to_string(),
                message: "Fire detected in protected area - IMMEDIATE ACTION REQUIRED!"
                    .to_string(),
                severity: AlertSeverity::Critical,
            },
            DetectionKind::Animal { species } => {
                let label = kind.species_label();
                Self {
                    dashboard_type: "animal",
                    name: format!("{} Detected", label),
                    title: format!("{} DETECTED", species.to_uppercase()),
                    message: format!("{} spotted in monitored area", label),
                    severity: AlertSeverity::High,
                }
            }
        }
    }
}

/// RFC 3339, or the "%Y-%m-%d %H:%M:%S" form the detectors send (taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Field deserializers for inbound payloads
///
/// A value of the wrong shape becomes `None` instead of failing the whole body.
pub(crate) mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn value<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Value>, D::Error> {
        Option::<Value>::deserialize(d)
    }

    fn as_number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.filter(|n| n.is_finite())
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
        Ok(match value(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
        Ok(value(d)?.as_ref().and_then(as_number))
    }

    /// Pixel area: fractions truncated, negatives clamped to 0
    pub fn area<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u32>, D::Error> {
        Ok(value(d)?
            .as_ref()
            .and_then(as_number)
            .map(|n| n.trunc().clamp(0.0, u32::MAX as f64) as u32))
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match value(d)? {
            Some(Value::String(s)) => super::parse_timestamp(&s),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animal_species_normalized() {
        assert_eq!(
            DetectionKind::animal("  Tiger "),
            DetectionKind::Animal {
                species: "tiger".to_string()
            }
        );
        assert_eq!(
            DetectionKind::animal(""),
            DetectionKind::Animal {
                species: UNKNOWN_SPECIES.to_string()
            }
        );
    }

    #[test]
    fn test_kind_display_and_class() {
        assert_eq!(DetectionKind::Person.to_string(), "person");
        assert_eq!(DetectionKind::animal("deer").to_string(), "animal:deer");
        assert_eq!(DetectionKind::animal("deer").class(), DetectionClass::Animal);
        assert_eq!(DetectionKind::animal("deer").species_label(), "Deer");
    }

    #[test]
    fn test_class_parse_aliases() {
        assert_eq!(DetectionClass::parse("Person"), Some(DetectionClass::Person));
        assert_eq!(DetectionClass::parse("hunter"), Some(DetectionClass::Person));
        assert_eq!(DetectionClass::parse("wildfire"), Some(DetectionClass::Fire));
        assert_eq!(DetectionClass::parse("vehicle"), None);
    }

    #[test]
    fn test_presentation() {
        let p = AlertPresentation::for_kind(&DetectionKind::Person);
        assert_eq!(p.dashboard_type, "hunter");
        assert_eq!(p.severity, AlertSeverity::Critical);

        let p = AlertPresentation::for_kind(&DetectionKind::animal("elephant"));
        assert_eq!(p.name, "Elephant Detected");
        assert_eq!(p.title, "ELEPHANT DETECTED");
        assert_eq!(p.severity, AlertSeverity::High);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-06-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-06-01 12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_confirmed_event_confidence_capped() {
        let ev = ConfirmedEvent::new(DetectionKind::Fire, 250, Utc::now(), "Cam-01");
        assert_eq!(ev.confidence, 100);
    }
}
