use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::RecordingSession;
use super::state::SessionState;
use crate::error::SessionError;
use crate::intent::CaptureResult;

/// Observable view of the capture control, published on every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Active session, if any
    pub session_id: Option<Uuid>,

    pub state: SessionState,

    /// Negotiated encoding (`None` = platform default)
    pub mime_type: Option<String>,

    /// Seconds left, only while counting down
    pub countdown_remaining: Option<u32>,

    /// Encoded fragments collected so far, frozen once the payload is built
    pub chunk_count: usize,

    /// Size of the finalized payload
    pub payload_bytes: Option<usize>,

    /// Populated only in `Failed`
    pub error: Option<SessionError>,

    /// Populated only in `Completed`
    pub result: Option<CaptureResult>,

    /// When the session was created
    pub started_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// No session: the control is idle
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: SessionState::Idle,
            mime_type: None,
            countdown_remaining: None,
            chunk_count: 0,
            payload_bytes: None,
            error: None,
            result: None,
            started_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn of(session: &RecordingSession) -> Self {
        Self {
            session_id: Some(session.id()),
            state: session.state(),
            mime_type: session.mime_type().map(str::to_string),
            countdown_remaining: session.countdown_remaining(),
            chunk_count: session
                .payload()
                .map(|p| p.fragment_count)
                .unwrap_or_else(|| session.chunks().fragment_count()),
            payload_bytes: session.payload().map(|p| p.len()),
            error: session.error().map(SessionError::from),
            result: session.result().cloned(),
            started_at: Some(session.started_at()),
            updated_at: Utc::now(),
        }
    }

    /// Terminal, or nothing running at all
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || self.state == SessionState::Idle
    }
}
