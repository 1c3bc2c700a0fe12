//! Alert sinks
//!
//! A sink receives every dispatched job. Failures are logged by the
//! dispatcher and never affect other sinks.

mod console;
mod event_log;
mod image_store;
mod realtime;
mod remote;

pub use console::ConsoleSink;
pub use event_log::EventLogSink;
pub use image_store::{ImageStoreSink, IMAGE_URL_PREFIX};
pub use realtime::RealtimeSink;
pub use remote::{IngestDetection, IngestPayload, RemoteIngestSink};

use super::types::{DispatchJob, RetryPolicy, SinkOutcome, SinkPhase};
use crate::error::Result;
use std::time::Duration;

/// Downstream consumer of admitted events
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    /// Sink name (logs, attempt bookkeeping)
    fn name(&self) -> &str;

    fn phase(&self) -> SinkPhase {
        SinkPhase::Deliver
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Per-attempt timeout override
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Deliver one job
    async fn deliver(&self, job: &DispatchJob) -> Result<SinkOutcome>;
}

/// Timestamp format used by the dashboard and ingestion API
pub(crate) fn display_timestamp(job: &DispatchJob) -> String {
    job.event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}
