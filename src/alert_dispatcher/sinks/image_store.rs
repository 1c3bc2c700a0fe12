//! Image store sink
//!
//! Persists the event snapshot under the images directory and hands back
//! the URL path it is served from.

use super::AlertSink;
use crate::alert_dispatcher::types::{DispatchJob, SinkOutcome, SinkPhase};
use crate::error::Result;
use crate::models::ConfirmedEvent;
use std::path::{Path, PathBuf};
use tokio::fs;

/// URL prefix stored images are served under
pub const IMAGE_URL_PREFIX: &str = "/images";

pub struct ImageStoreSink {
    dir: PathBuf,
}

impl ImageStoreSink {
    /// Create the sink, ensuring the directory exists
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        tracing::info!(images_dir = %dir.display(), "Image store ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the event's snapshot; `None` when the event carries none
    pub async fn save(&self, event: &ConfirmedEvent) -> Result<Option<String>> {
        let Some(snapshot) = event.snapshot.as_ref().filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let prefix = event.presentation().dashboard_type;
        let id = event.event_id.simple().to_string();
        let filename = format!(
            "{}_{}_{}.jpg",
            prefix,
            event.timestamp.format("%Y%m%d_%H%M%S"),
            &id[..8]
        );

        fs::write(self.dir.join(&filename), snapshot.as_bytes()).await?;

        tracing::debug!(
            event_id = %event.event_id,
            filename = %filename,
            size_bytes = snapshot.len(),
            "Snapshot saved"
        );

        Ok(Some(format!("{}/{}", IMAGE_URL_PREFIX, filename)))
    }
}

#[async_trait::async_trait]
impl AlertSink for ImageStoreSink {
    fn name(&self) -> &str {
        "image_store"
    }

    fn phase(&self) -> SinkPhase {
        SinkPhase::Enrich
    }

    async fn deliver(&self, job: &DispatchJob) -> Result<SinkOutcome> {
        Ok(match self.save(&job.event).await? {
            Some(reference) => SinkOutcome::Stored { reference },
            None => SinkOutcome::Skipped,
        })
    }
}
