//! EventLogService - Recent Alert Log (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Keep the most recent delivered alerts in memory
//! - Provide queries for the dashboard alert list

use crate::models::{AlertSeverity, DetectionClass, DetectionKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Delivered alert record
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    /// Sequence number assigned by the log
    pub seq: u64,
    pub event_id: Uuid,
    pub kind: DetectionKind,
    pub species: String,
    pub title: String,
    pub severity: AlertSeverity,
    pub confidence: u8,
    pub camera: String,
    pub image: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Ring buffer for alerts
struct AlertRingBuffer {
    records: VecDeque<AlertRecord>,
    capacity: usize,
    next_seq: u64,
}

impl AlertRingBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 1,
        }
    }

    fn push(&mut self, mut record: AlertRecord) -> u64 {
        record.seq = self.next_seq;
        self.next_seq += 1;

        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.next_seq - 1
    }

    fn latest(&self, count: usize) -> Vec<AlertRecord> {
        self.records.iter().rev().take(count).cloned().collect()
    }

    fn by_class(&self, class: DetectionClass, count: usize) -> Vec<AlertRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.kind.class() == class)
            .take(count)
            .cloned()
            .collect()
    }
}

/// EventLogService instance
pub struct EventLogService {
    buffer: RwLock<AlertRingBuffer>,
}

impl EventLogService {
    /// Create new EventLogService
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(AlertRingBuffer::new(capacity)),
        }
    }

    /// Add record
    pub async fn add(&self, record: AlertRecord) -> u64 {
        let mut buffer = self.buffer.write().await;
        let seq = buffer.push(record);
        tracing::debug!(seq = seq, "Alert added to ring buffer");
        seq
    }

    /// Get latest records, newest first
    pub async fn latest(&self, count: usize) -> Vec<AlertRecord> {
        self.buffer.read().await.latest(count)
    }

    /// Get latest records of one class
    pub async fn by_class(&self, class: DetectionClass, count: usize) -> Vec<AlertRecord> {
        self.buffer.read().await.by_class(class, count)
    }

    pub async fn count(&self) -> usize {
        self.buffer.read().await.records.len()
    }

    pub async fn clear(&self) {
        self.buffer.write().await.records.clear();
    }
}

impl Default for EventLogService {
    fn default() -> Self {
        Self::new(500)
    }
}
