//! Realtime broadcast sink
//!
//! Bumps the event's counter and publishes the alert to observers. Each job
//! reaches this sink once with no retry, so counters move exactly once per
//! admitted event.

use super::{display_timestamp, AlertSink};
use crate::alert_dispatcher::types::{DispatchJob, SinkOutcome};
use crate::counter_broadcaster::{AlertNotice, CounterBroadcaster};
use crate::error::Result;
use std::sync::Arc;

pub struct RealtimeSink {
    broadcaster: Arc<CounterBroadcaster>,
}

impl RealtimeSink {
    pub fn new(broadcaster: Arc<CounterBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait::async_trait]
impl AlertSink for RealtimeSink {
    fn name(&self) -> &str {
        "realtime"
    }

    async fn deliver(&self, job: &DispatchJob) -> Result<SinkOutcome> {
        let event = &job.event;
        self.broadcaster
            .record_alert(AlertNotice {
                event_id: event.event_id,
                kind: event.kind.clone(),
                confidence: event.confidence,
                camera: event.source_id.clone(),
                timestamp: display_timestamp(job),
                image: job.image.clone(),
            })
            .await;
        Ok(SinkOutcome::Delivered)
    }
}
