//! Transcription Service client
//!
//! Uploads a finalized payload as a single multipart form field and maps the
//! outcome to `TranscriptionResult` or a typed `CaptureError`.

mod client;
mod response;

pub use client::{HttpTranscriber, Transcriber};
pub use response::{parse_response, TranscriptionResult};
