//! ConfirmationTracker - Frame-to-Event Smoothing
//!
//! ## Responsibilities
//!
//! - Track consecutive presence per tracking key (class, or species for animals)
//! - Keep a rolling confidence window of the last N frames
//! - Emit one ConfirmedEvent per streak once N consecutive frames are seen
//! - Drop state for keys idle longer than the configured frame budget
//!
//! A key re-arms only after it is observed absent, so a detection that stays
//! in view confirms exactly once.

mod types;

pub use types::*;

use crate::models::{ConfirmedEvent, FrameDetections, TrackingKey};
use parking_lot::Mutex;
use std::collections::HashMap;

struct TrackerTable {
    states: HashMap<TrackingKey, ClassTrackState>,
    frame_index: u64,
}

/// ConfirmationTracker instance
pub struct ConfirmationTracker {
    config: TrackerConfig,
    table: Mutex<TrackerTable>,
}

impl ConfirmationTracker {
    /// Create new ConfirmationTracker
    pub fn new(config: TrackerConfig) -> Self {
        let config = TrackerConfig {
            confirm_frames: config.confirm_frames.max(1),
            ..config
        };
        Self {
            config,
            table: Mutex::new(TrackerTable {
                states: HashMap::new(),
                frame_index: 0,
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Feed one frame's detections; returns events confirmed on this frame
    pub fn observe(&self, frame: &FrameDetections) -> Vec<ConfirmedEvent> {
        let capacity = self.config.confirm_frames;

        // One sample per key per frame: the strongest qualifying instance
        let mut present: HashMap<TrackingKey, f64> = HashMap::new();
        for detection in &frame.detections {
            if detection.box_area < self.config.min_box_area {
                continue;
            }
            if detection.confidence < self.config.min_confidence_for(detection.kind.class()) {
                continue;
            }
            let slot = present.entry(detection.kind.clone()).or_insert(detection.confidence);
            if detection.confidence > *slot {
                *slot = detection.confidence;
            }
        }

        let mut confirmed = Vec::new();
        let mut table = self.table.lock();
        table.frame_index += 1;
        let frame_index = table.frame_index;

        for (key, confidence) in present {
            let state = table
                .states
                .entry(key.clone())
                .or_insert_with(|| ClassTrackState::new(capacity, frame_index));

            state.confidence_window.push_back(confidence);
            while state.confidence_window.len() > capacity {
                state.confidence_window.pop_front();
            }
            debug_assert!(state.confidence_window.len() <= capacity);
            state.present_streak = state.present_streak.saturating_add(1);
            state.last_seen_frame = frame_index;

            if state.armed && state.present_streak as usize >= capacity {
                let avg = state.window_confidence();
                state.confidence_window.clear();
                state.armed = false;

                tracing::info!(
                    key = %key,
                    confidence = avg,
                    streak = state.present_streak,
                    source_id = %frame.source_id,
                    "Detection confirmed"
                );

                confirmed.push(
                    ConfirmedEvent::new(key, avg, frame.captured_at, frame.source_id.clone())
                        .with_snapshot(frame.snapshot.clone()),
                );
            }
        }

        let idle_frames = self.config.idle_frames;
        table.states.retain(|key, state| {
            if state.last_seen_frame == frame_index {
                return true;
            }
            state.mark_absent();
            let idle = frame_index - state.last_seen_frame;
            if idle > idle_frames {
                tracing::debug!(key = %key, idle_frames = idle, "Dropping idle tracking state");
                false
            } else {
                true
            }
        });

        confirmed
    }

    /// Current state for a key (diagnostics/tests)
    pub fn state(&self, key: &TrackingKey) -> Option<ClassTrackState> {
        self.table.lock().states.get(key).cloned()
    }

    /// Keys with live state
    pub fn tracked_keys(&self) -> Vec<TrackingKey> {
        self.table.lock().states.keys().cloned().collect()
    }

    /// Drop all per-key state
    pub fn reset(&self) {
        let mut table = self.table.lock();
        let dropped = table.states.len();
        table.states.clear();
        tracing::info!(dropped = dropped, "Confirmation tracker reset");
    }
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
