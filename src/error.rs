//! Error taxonomy for the capture pipeline
//!
//! Every failure a session can end in is a `CaptureError`. Errors are attached
//! to the session (see `RecordingSession::error`) rather than thrown across
//! the host boundary, so the host renders one "try again" path for all of them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionState;

/// Why the microphone could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceUnavailableReason {
    /// The platform has no audio capture capability at all
    NotSupported,
    /// The user or OS refused microphone access
    PermissionDenied,
    /// Capture is supported but no input device exists
    NoDevice,
}

impl std::fmt::Display for DeviceUnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::NotSupported => "Audio capture is not supported on this platform.",
            Self::PermissionDenied => "Microphone access was denied.",
            Self::NoDevice => "No microphone found.",
        };
        f.write_str(msg)
    }
}

/// Flat discriminant of `CaptureError`, convenient for hosts and snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DeviceUnavailable,
    StreamFault,
    Encoder,
    EmptyRecording,
    AlreadyFinalized,
    NetworkError,
    ServerError,
    MalformedResponse,
    InvalidTransition,
    SessionActive,
    PipelineClosed,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("{0}")]
    DeviceUnavailable(DeviceUnavailableReason),

    #[error("Recording error: {0}")]
    StreamFault(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("No audio data captured. Try recording again.")]
    EmptyRecording,

    #[error("Recording was already finalized")]
    AlreadyFinalized,

    #[error("Upload failed: {0}")]
    NetworkError(String),

    #[error("Upload failed ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Unexpected response from transcription service: {0}")]
    MalformedResponse(String),

    #[error("Cannot {action} while {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },

    #[error("A capture session is already in progress ({0})")]
    SessionActive(SessionState),

    #[error("Capture pipeline is no longer running")]
    PipelineClosed,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::StreamFault(_) => ErrorKind::StreamFault,
            Self::Encoder(_) => ErrorKind::Encoder,
            Self::EmptyRecording => ErrorKind::EmptyRecording,
            Self::AlreadyFinalized => ErrorKind::AlreadyFinalized,
            Self::NetworkError(_) => ErrorKind::NetworkError,
            Self::ServerError { .. } => ErrorKind::ServerError,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::SessionActive(_) => ErrorKind::SessionActive,
            Self::PipelineClosed => ErrorKind::PipelineClosed,
        }
    }

    /// HTTP status of a `ServerError`
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Serialisable view of a `CaptureError` attached to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl From<&CaptureError> for SessionError {
    fn from(err: &CaptureError) -> Self {
        Self {
            kind: err.kind(),
            status: err.status(),
            message: err.to_string(),
        }
    }
}
