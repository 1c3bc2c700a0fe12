//! ConfirmationTracker types

use crate::error::{Error, Result};
use crate::models::{
    lenient, DetectionClass, DetectionKind, FrameDetections, RawDetection, Snapshot,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Consecutive frames required to confirm (N)
    pub confirm_frames: usize,
    /// Boxes smaller than this count as not present
    pub min_box_area: u32,
    /// Frames of absence after which a key's state is dropped
    pub idle_frames: u64,
    /// Per-class confidence floor (missing = accept everything)
    pub min_confidence: HashMap<DetectionClass, f64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirm_frames: 3,
            min_box_area: 1500,
            idle_frames: 150,
            min_confidence: HashMap::new(),
        }
    }
}

impl TrackerConfig {
    pub fn min_confidence_for(&self, class: DetectionClass) -> f64 {
        self.min_confidence.get(&class).copied().unwrap_or(0.0)
    }
}

/// Per-key confirmation state
#[derive(Debug, Clone)]
pub struct ClassTrackState {
    /// Consecutive frames present
    pub present_streak: u32,
    /// Last N confidences, oldest first
    pub confidence_window: VecDeque<f64>,
    /// Cleared once the streak confirms, set again on absence
    pub armed: bool,
    /// Frame index the key was last seen on
    pub last_seen_frame: u64,
}

impl ClassTrackState {
    pub fn new(capacity: usize, frame: u64) -> Self {
        Self {
            present_streak: 0,
            confidence_window: VecDeque::with_capacity(capacity),
            armed: true,
            last_seen_frame: frame,
        }
    }

    /// Key missing from a frame: streak broken, window cleared, re-armed
    pub fn mark_absent(&mut self) {
        self.present_streak = 0;
        self.confidence_window.clear();
        self.armed = true;
    }

    /// Mean of the window scaled to 0-100
    pub fn window_confidence(&self) -> u8 {
        if self.confidence_window.is_empty() {
            return 0;
        }
        let mean =
            self.confidence_window.iter().sum::<f64>() / self.confidence_window.len() as f64;
        (mean * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Inbound detection as posted by the inference stage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundDetection {
    #[serde(rename = "type", alias = "label", default, deserialize_with = "lenient::string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub species: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(
        default,
        alias = "boxArea",
        alias = "area",
        deserialize_with = "lenient::area"
    )]
    pub box_area: Option<u32>,
}

impl InboundDetection {
    /// Convert into a raw detection, substituting defaults for non-critical fields
    pub fn normalize(&self) -> Result<RawDetection> {
        let label = self
            .kind
            .as_deref()
            .ok_or_else(|| Error::Validation("detection type is required".to_string()))?;
        let class = DetectionClass::parse(label)
            .ok_or_else(|| Error::Validation(format!("unknown detection type: {}", label)))?;

        let confidence = self.confidence.unwrap_or(0.0);
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(RawDetection::new(
            DetectionKind::from_class(class, self.species.as_deref()),
            confidence,
            self.box_area.unwrap_or(0),
        ))
    }
}

/// Inbound frame (POST /api/frames)
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(default, alias = "camera", deserialize_with = "lenient::string")]
    pub source_id: Option<String>,
    /// Missing or unparseable = time of receipt
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub captured_at: Option<DateTime<Utc>>,
    /// Kept raw so one entry of the wrong shape only loses that entry
    #[serde(default)]
    pub detections: Vec<serde_json::Value>,
    /// Base64 JPEG
    #[serde(default, deserialize_with = "lenient::string")]
    pub snapshot: Option<String>,
}

impl InboundFrame {
    /// Build frame detections; malformed entries are skipped, never fatal
    pub fn into_frame(self, default_source: &str) -> FrameDetections {
        let mut detections = Vec::with_capacity(self.detections.len());
        for entry in self.detections {
            let parsed = serde_json::from_value::<InboundDetection>(entry)
                .map_err(|e| Error::Validation(format!("detection entry: {}", e)));
            match parsed.and_then(|inbound| inbound.normalize()) {
                Ok(d) => detections.push(d),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed detection");
                }
            }
        }

        let snapshot = self.snapshot.as_deref().and_then(|encoded| {
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) if !bytes.is_empty() => Some(Snapshot::new(bytes)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring undecodable snapshot");
                    None
                }
            }
        });

        FrameDetections {
            source_id: self
                .source_id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default_source.to_string()),
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
            detections,
            snapshot,
        }
    }
}
