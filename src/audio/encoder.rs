//! Encoding negotiation and the native WAV encoder.
//!
//! Codecs come from the platform; this module only decides which one to ask
//! for. The first supported entry of the preference list wins.

use std::io::Cursor;
use tracing::{debug, info};

use super::backend::AudioFrame;
use crate::error::CaptureError;

/// Default preference order: opus-in-webm first, broader containers as fallbacks
pub const DEFAULT_ENCODING_PREFERENCES: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
    "audio/mp4",
    "audio/wav",
];

/// Turns captured frames into encoded fragments
pub trait AudioEncoder: Send {
    /// MIME type of the bytes this encoder produces
    fn mime_type(&self) -> &str;

    /// Encode one frame; may return an empty fragment if nothing is ready yet
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>, CaptureError>;

    /// Flush whatever is still buffered as the last fragment
    fn finish(&mut self) -> Result<Vec<u8>, CaptureError>;
}

/// The platform's encoder facilities
pub trait EncoderPlatform: Send + Sync {
    /// `None` when the platform has no way to answer the question
    fn is_type_supported(&self, mime_type: &str) -> Option<bool>;

    /// Create an encoder; `None` asks for the platform default
    fn create_encoder(&self, mime_type: Option<&str>) -> Result<Box<dyn AudioEncoder>, CaptureError>;
}

/// Pick the first candidate the platform supports.
///
/// Returns `None` when nothing matches or the platform cannot be queried; the
/// caller then falls back to the platform default encoder.
pub fn choose_encoding<S: AsRef<str>>(
    platform: &dyn EncoderPlatform,
    candidates: &[S],
) -> Option<String> {
    for candidate in candidates {
        let candidate = candidate.as_ref();
        match platform.is_type_supported(candidate) {
            Some(true) => {
                info!("Selected encoding: {}", candidate);
                return Some(candidate.to_string());
            }
            Some(false) => debug!("Encoding not supported: {}", candidate),
            None => {
                info!("Platform cannot be queried for encodings, using default");
                return None;
            }
        }
    }

    info!("No preferred encoding supported, using default");
    None
}

/// MIME type without parameters, lower-cased (`audio/webm;codecs=opus` -> `audio/webm`)
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// File extension for an upload carrying `mime_type`
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_essence(mime_type).as_str() {
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "mp4",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        _ => "bin",
    }
}

/// Guess a MIME type from a file extension (used for pre-recorded uploads)
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "webm" => Some("audio/webm"),
        "ogg" | "opus" => Some("audio/ogg"),
        "mp4" | "m4a" => Some("audio/mp4"),
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        _ => None,
    }
}

/// Encoders available without any system codec libraries: WAV only
#[derive(Debug, Default, Clone)]
pub struct NativePlatform;

impl NativePlatform {
    pub const DEFAULT_MIME_TYPE: &'static str = "audio/wav";
}

impl EncoderPlatform for NativePlatform {
    fn is_type_supported(&self, mime_type: &str) -> Option<bool> {
        Some(matches!(
            mime_essence(mime_type).as_str(),
            "audio/wav" | "audio/wave" | "audio/x-wav"
        ))
    }

    fn create_encoder(&self, mime_type: Option<&str>) -> Result<Box<dyn AudioEncoder>, CaptureError> {
        match mime_type {
            None => Ok(Box::new(WavEncoder::new())),
            Some(m) if self.is_type_supported(m) == Some(true) => Ok(Box::new(WavEncoder::new())),
            Some(m) => Err(CaptureError::Encoder(format!("no encoder for {m}"))),
        }
    }
}

/// 16-bit PCM WAV.
///
/// The RIFF header needs the final data length, so samples are buffered and
/// the whole file is emitted as one fragment from `finish`.
#[derive(Debug, Default)]
pub struct WavEncoder {
    spec: Option<hound::WavSpec>,
    samples: Vec<i16>,
}

impl WavEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioEncoder for WavEncoder {
    fn mime_type(&self) -> &str {
        NativePlatform::DEFAULT_MIME_TYPE
    }

    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>, CaptureError> {
        let spec = hound::WavSpec {
            channels: frame.channels,
            sample_rate: frame.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        match self.spec {
            None => self.spec = Some(spec),
            Some(current) if current != spec => {
                return Err(CaptureError::Encoder(format!(
                    "format changed mid-recording ({}Hz/{}ch -> {}Hz/{}ch)",
                    current.sample_rate, current.channels, spec.sample_rate, spec.channels
                )));
            }
            Some(_) => {}
        }

        self.samples.extend_from_slice(&frame.samples);
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<u8>, CaptureError> {
        let Some(spec) = self.spec.take() else {
            return Ok(Vec::new());
        };
        if self.samples.is_empty() {
            return Ok(Vec::new());
        }

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| CaptureError::Encoder(e.to_string()))?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| CaptureError::Encoder(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| CaptureError::Encoder(e.to_string()))?;
        }

        self.samples.clear();
        Ok(cursor.into_inner())
    }
}
