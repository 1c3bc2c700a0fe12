//! Recent-alert log sink

use super::AlertSink;
use crate::alert_dispatcher::types::{DispatchJob, SinkOutcome};
use crate::error::Result;
use crate::event_log_service::{AlertRecord, EventLogService};
use chrono::Utc;
use std::sync::Arc;

pub struct EventLogSink {
    log: Arc<EventLogService>,
}

impl EventLogSink {
    pub fn new(log: Arc<EventLogService>) -> Self {
        Self { log }
    }
}

#[async_trait::async_trait]
impl AlertSink for EventLogSink {
    fn name(&self) -> &str {
        "event_log"
    }

    async fn deliver(&self, job: &DispatchJob) -> Result<SinkOutcome> {
        let event = &job.event;
        let p = event.presentation();
        self.log
            .add(AlertRecord {
                seq: 0, // set by EventLogService
                event_id: event.event_id,
                kind: event.kind.clone(),
                species: event.kind.species_label(),
                title: p.title,
                severity: p.severity,
                confidence: event.confidence,
                camera: event.source_id.clone(),
                image: job.image.clone(),
                detected_at: event.timestamp,
                recorded_at: Utc::now(),
            })
            .await;
        Ok(SinkOutcome::Delivered)
    }
}
