use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{AudioStreamConfig, DEFAULT_ENCODING_PREFERENCES};
use crate::intent::IntentMode;
use crate::session::CapturePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub transcription: TranscriptionConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of the Transcription Service
    pub base_url: String,
    /// Path used in navigation mode
    pub navigate_path: String,
    /// Path used in field-extraction mode
    pub extract_path: String,
    /// Multipart field carrying the audio
    pub file_field: String,
    /// Request timeout; unset means no client-side timeout
    pub timeout_secs: Option<u64>,
}

impl TranscriptionConfig {
    pub fn endpoint_for(&self, mode: IntentMode) -> Result<String> {
        let base = self.base_url.trim();
        if !base.starts_with("http://") && !base.starts_with("https://") {
            anyhow::bail!(
                "Invalid transcription base_url: must start with http:// or https://\nGot: {}",
                base
            );
        }

        let path = match mode {
            IntentMode::Navigate => &self.navigate_path,
            IntentMode::ExtractFields => &self.extract_path,
        };

        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Seconds counted down before recording; 0 starts immediately
    pub countdown_secs: u32,
    pub countdown_tick_ms: u64,
    /// Microphone rate; WAV replay keeps the file's own rate
    pub sample_rate: u32,
    /// Wider input is downmixed to this many channels
    pub channels: u16,
    pub buffer_duration_ms: u64,
    /// Ordered encoding preferences; the first supported wins
    pub encodings: Vec<String>,
}

impl CaptureConfig {
    pub fn policy(&self) -> CapturePolicy {
        CapturePolicy {
            countdown_secs: self.countdown_secs,
            countdown_tick: Duration::from_millis(self.countdown_tick_ms.max(1)),
            encoding_preferences: self.encodings.clone(),
            stream: AudioStreamConfig {
                sample_rate: self.sample_rate,
                channels: self.channels,
                buffer_duration_ms: self.buffer_duration_ms,
            },
        }
    }
}

impl Config {
    /// Defaults, then the optional file at `path`, then `VOICE_INTENT__*` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let encodings: Vec<String> = DEFAULT_ENCODING_PREFERENCES
            .iter()
            .map(|e| e.to_string())
            .collect();

        let settings = config::Config::builder()
            .set_default("service.name", "voice-intent")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8088)?
            .set_default("transcription.base_url", "http://localhost:8000")?
            .set_default("transcription.navigate_path", "/transcribe/Findpage")?
            .set_default("transcription.extract_path", "/transcribe")?
            .set_default("transcription.file_field", "file")?
            .set_default("capture.countdown_secs", 3)?
            .set_default("capture.countdown_tick_ms", 1000)?
            .set_default("capture.sample_rate", 44100)?
            .set_default("capture.channels", 1)?
            .set_default("capture.buffer_duration_ms", 100)?
            .set_default("capture.encodings", encodings)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_INTENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {path}"))?;

        Ok(settings.try_deserialize()?)
    }
}
