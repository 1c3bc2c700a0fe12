//! AlertGate - Dedup and Cooldown
//!
//! ## Responsibilities
//!
//! - One-shot dedup: a key that has alerted stays suppressed until cleared
//! - Cooldown: a key may not alert again until the cooldown has elapsed
//! - Both policies are configured per class and checked under one lock
//!
//! ## Design
//!
//! A one-shot policy is a cooldown with an explicit clear. Clearing the
//! one-shot flag keeps `last_alert_at`, so the cooldown still applies.

mod types;

pub use types::*;

use crate::models::{ConfirmedEvent, TrackingKey};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// AlertGate instance
pub struct AlertGate {
    config: GateConfig,
    entries: Mutex<HashMap<TrackingKey, GateEntry>>,
}

impl AlertGate {
    /// Create new AlertGate
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Whether the event may proceed to dispatch
    pub fn admit(&self, event: &ConfirmedEvent, now: DateTime<Utc>) -> bool {
        self.evaluate(event, now).is_admitted()
    }

    /// Decide and, on admission, record the alert in one locked step
    pub fn evaluate(&self, event: &ConfirmedEvent, now: DateTime<Utc>) -> GateDecision {
        let policy = self.config.policy_for(event.kind.class());
        let cooldown = policy.cooldown_delta();

        let mut entries = self.entries.lock();
        let entry = entries.entry(event.kind.clone()).or_default();

        let decision = if policy.one_shot && entry.alerted {
            GateDecision::SuppressedOneShot
        } else if entry
            .last_alert_at
            .map(|last| now - last <= cooldown)
            .unwrap_or(false)
        {
            GateDecision::SuppressedCooldown
        } else {
            entry.alerted = true;
            entry.last_alert_at = Some(now);
            GateDecision::Admitted
        };

        tracing::debug!(
            key = %event.kind,
            event_id = %event.event_id,
            decision = ?decision,
            "Gate evaluated"
        );

        decision
    }

    /// Clear the one-shot flag for a key; cooldown timing is kept
    pub fn clear_one_shot(&self, key: &TrackingKey) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.alerted = false;
            tracing::info!(key = %key, "One-shot flag cleared");
        }
    }

    /// Clear all alerted and cooldown state
    pub fn reset(&self) {
        let mut entries = self.entries.lock();
        let cleared = entries.len();
        entries.clear();
        tracing::info!(cleared = cleared, "Alert gate reset");
    }

    /// Drop entries that no longer suppress anything
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            let policy = self.config.policy_for(key.class());
            if policy.one_shot && entry.alerted {
                return true;
            }
            let cooldown = policy.cooldown_delta();
            entry
                .last_alert_at
                .map(|last| now - last <= cooldown)
                .unwrap_or(false)
        });
        before - entries.len()
    }

    pub fn entry(&self, key: &TrackingKey) -> Option<GateEntry> {
        self.entries.lock().get(key).cloned()
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
