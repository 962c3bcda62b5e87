use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

use super::response::{parse_response, TranscriptionResult};
use crate::audio::Payload;
use crate::config::TranscriptionConfig;
use crate::error::CaptureError;
use crate::intent::IntentMode;

/// Uploads a finalized recording and returns the validated result.
///
/// Failures are never retried here; retry is a user action.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn submit(&self, payload: &Payload) -> Result<TranscriptionResult, CaptureError>;
}

/// Transcription Service over HTTP: one multipart upload per payload
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    file_field: String,
    file_prefix: String,
}

impl HttpTranscriber {
    /// Build a client for `endpoint`. `timeout` of `None` keeps reqwest's default (no timeout).
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            file_field: "file".to_string(),
            file_prefix: "recording".to_string(),
        })
    }

    /// Client for the endpoint that serves `mode`
    pub fn for_mode(config: &TranscriptionConfig, mode: IntentMode) -> Result<Self> {
        let endpoint = config.endpoint_for(mode)?;
        let timeout = config.timeout_secs.map(Duration::from_secs);

        Ok(Self::new(endpoint, timeout)?
            .with_file_field(config.file_field.clone())
            .with_file_prefix(mode.file_prefix()))
    }

    pub fn with_file_field(mut self, field: impl Into<String>) -> Self {
        self.file_field = field.into();
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn submit(&self, payload: &Payload) -> Result<TranscriptionResult, CaptureError> {
        let file_name = payload.file_name(&self.file_prefix);

        info!(
            "Uploading {} ({} bytes, {}) to {}",
            file_name,
            payload.len(),
            payload.mime_type,
            self.endpoint
        );

        let part = reqwest::multipart::Part::bytes(payload.bytes.clone())
            .file_name(file_name)
            .mime_str(&payload.mime_type)
            .map_err(|e| CaptureError::NetworkError(format!("invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part(self.file_field.clone(), part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("Upload request failed: {}", e);
                if e.is_timeout() {
                    CaptureError::NetworkError("request timed out".into())
                } else {
                    CaptureError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                body
            };
            error!("Transcription service returned {}: {}", status, message);
            return Err(CaptureError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CaptureError::NetworkError(format!("failed to read response: {e}")))?;

        let result = parse_response(&body)?;

        info!(
            "Transcription received (page={:?}, fields={})",
            result.page,
            result.fields.present_count()
        );

        Ok(result)
    }
}
