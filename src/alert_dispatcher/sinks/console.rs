//! Console/log sink

use super::AlertSink;
use crate::alert_dispatcher::types::{DispatchJob, SinkOutcome};
use crate::error::Result;
use crate::models::AlertSeverity;

/// Logs an alert banner
pub struct ConsoleSink;

#[async_trait::async_trait]
impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, job: &DispatchJob) -> Result<SinkOutcome> {
        let event = &job.event;
        let p = event.presentation();
        let banner = "=".repeat(50);

        tracing::warn!("{}", banner);
        match p.severity {
            AlertSeverity::Critical => tracing::warn!("ALERT: {} (CRITICAL)", p.title),
            AlertSeverity::High => tracing::warn!("ALERT: {}", p.title),
        }
        tracing::warn!(
            event_id = %event.event_id,
            species = %event.kind.species_label(),
            confidence = event.confidence,
            camera = %event.source_id,
            image = ?job.image,
            "{}",
            p.message
        );
        tracing::warn!("{}", banner);

        Ok(SinkOutcome::Delivered)
    }
}
