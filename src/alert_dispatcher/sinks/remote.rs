//! Remote ingestion sink
//!
//! Posts the alert to the dashboard ingestion endpoint as
//! `{"newDetection": {...}}`. Any 2xx response counts as delivered.

use super::{display_timestamp, AlertSink};
use crate::alert_dispatcher::types::{DispatchJob, RetryPolicy, SinkOutcome};
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Detection record sent to the ingestion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDetection {
    pub id: String,
    #[serde(rename = "type")]
    pub detection_type: String,
    pub species: String,
    pub confidence: u8,
    pub camera: String,
    pub blindspot: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Request body wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    #[serde(rename = "newDetection")]
    pub new_detection: IngestDetection,
}

impl IngestPayload {
    /// `blindspot` is used when the event carries none of its own
    pub fn from_job(job: &DispatchJob, blindspot: &str) -> Self {
        let event = &job.event;
        Self {
            new_detection: IngestDetection {
                id: event.event_id.to_string(),
                detection_type: event.kind.class().as_str().to_string(),
                species: event.kind.species_label(),
                confidence: event.confidence,
                camera: event.source_id.clone(),
                blindspot: event.blindspot.as_deref().unwrap_or(blindspot).to_string(),
                timestamp: display_timestamp(job),
                image: job.image.clone(),
            },
        }
    }
}

pub struct RemoteIngestSink {
    http: Client,
    url: String,
    blindspot: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl RemoteIngestSink {
    /// Create new RemoteIngestSink
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            blindspot: "No".to_string(),
            retry: RetryPolicy::none(),
            timeout,
        })
    }

    pub fn with_blindspot(mut self, blindspot: impl Into<String>) -> Self {
        self.blindspot = blindspot.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl AlertSink for RemoteIngestSink {
    fn name(&self) -> &str {
        "remote_ingest"
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn deliver(&self, job: &DispatchJob) -> Result<SinkOutcome> {
        let payload = IngestPayload::from_job(job, &self.blindspot);

        let response = self.http.post(&self.url).json(&payload).send().await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(
                event_id = %job.event.event_id,
                status = %status,
                "Remote ingest accepted"
            );
            return Ok(SinkOutcome::Delivered);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::sink(
            self.name(),
            format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfirmedEvent, DetectionKind};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_payload_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 5).unwrap();
        let mut job = DispatchJob::new(ConfirmedEvent::new(
            DetectionKind::animal("Tiger"),
            82,
            ts,
            "Cam-01",
        ));
        job.image = Some("/images/animal_20250601_123005_abcd1234.jpg".to_string());

        let value = serde_json::to_value(IngestPayload::from_job(&job, "No")).unwrap();
        let d = &value["newDetection"];
        assert_eq!(d["type"], "animal");
        assert_eq!(d["species"], "Tiger");
        assert_eq!(d["confidence"], 82);
        assert_eq!(d["camera"], "Cam-01");
        assert_eq!(d["blindspot"], "No");
        assert_eq!(d["timestamp"], "2025-06-01 12:30:05");
        assert_eq!(d["image"], "/images/animal_20250601_123005_abcd1234.jpg");
    }

    #[test]
    fn test_payload_omits_missing_image() {
        let job = DispatchJob::new(ConfirmedEvent::new(
            DetectionKind::Person,
            70,
            Utc::now(),
            "Cam-01",
        ));
        let value = serde_json::to_value(IngestPayload::from_job(&job, "No")).unwrap();
        assert_eq!(value["newDetection"]["type"], "person");
        assert!(value["newDetection"].get("image").is_none());
    }

    #[test]
    fn test_payload_prefers_event_blindspot() {
        let event = ConfirmedEvent::new(DetectionKind::Fire, 90, Utc::now(), "Cam-02")
            .with_blindspot(Some("Yes".to_string()));
        let event_id = event.event_id;
        let job = DispatchJob::new(event);

        let value = serde_json::to_value(IngestPayload::from_job(&job, "No")).unwrap();
        assert_eq!(value["newDetection"]["blindspot"], "Yes");
        assert_eq!(value["newDetection"]["id"], event_id.to_string());
    }
}
