//! AlertDispatcher types

use crate::models::ConfirmedEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Max jobs waiting across all lanes (K)
    pub queue_capacity: usize,
    /// Worker count; each worker owns one lane
    pub worker_count: usize,
    /// Per-attempt timeout unless the sink overrides it
    pub sink_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            worker_count: 4,
            sink_timeout: Duration::from_secs(2),
        }
    }
}

/// Sink delivery retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retry)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, fire-and-forget
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay before the attempt following `failed_attempt` (1-based)
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        calculate_retry_delay(self.base_delay, self.max_delay, failed_attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Exponential backoff: base * 2^retry_count, capped at max
pub fn calculate_retry_delay(base: Duration, max: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry_count.min(16));
    base.saturating_mul(factor).min(max)
}

/// When a sink runs within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkPhase {
    /// Runs first, sequentially; may attach an image reference to the job
    Enrich,
    /// Runs after enrichment, concurrently with other deliver sinks
    Deliver,
}

/// Successful sink result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    /// Stored the snapshot; reference is attached to the job
    Stored { reference: String },
    /// Nothing to do for this event
    Skipped,
}

/// Queued unit of work
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub event: ConfirmedEvent,
    /// Image reference produced by an enrich sink
    pub image: Option<String>,
    /// Attempts made per sink name
    pub attempts: HashMap<String, u32>,
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchJob {
    pub fn new(event: ConfirmedEvent) -> Self {
        Self {
            event,
            image: None,
            attempts: HashMap::new(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn attempts_for(&self, sink: &str) -> u32 {
        self.attempts.get(sink).copied().unwrap_or(0)
    }
}

/// Dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub dropped: u64,
    pub processed: u64,
    pub sink_failures: u64,
    pub depth: usize,
}
