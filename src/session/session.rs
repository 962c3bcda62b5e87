use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::SessionState;
use crate::audio::{ChunkAccumulator, Payload};
use crate::error::CaptureError;
use crate::intent::CaptureResult;

/// One user-initiated record, transcribe and resolve cycle.
///
/// Holds data only; device and network resources are owned by the capture
/// pipeline. Every state change goes through `transition`, which enforces the
/// transition table.
#[derive(Debug)]
pub struct RecordingSession {
    id: Uuid,
    state: SessionState,
    started_at: DateTime<Utc>,
    mime_type: Option<String>,
    chunks: ChunkAccumulator,
    payload: Option<Arc<Payload>>,
    countdown_remaining: u32,
    error: Option<CaptureError>,
    result: Option<CaptureResult>,
}

impl RecordingSession {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        info!("Creating recording session: {}", id);

        Self {
            id,
            state: SessionState::Idle,
            started_at: Utc::now(),
            mime_type: None,
            chunks: ChunkAccumulator::new(),
            payload: None,
            countdown_remaining: 0,
            error: None,
            result: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn chunks(&self) -> &ChunkAccumulator {
        &self.chunks
    }

    pub fn payload(&self) -> Option<&Arc<Payload>> {
        self.payload.as_ref()
    }

    /// Only meaningful while counting down
    pub fn countdown_remaining(&self) -> Option<u32> {
        (self.state == SessionState::CountingDown).then_some(self.countdown_remaining)
    }

    pub fn error(&self) -> Option<&CaptureError> {
        self.error.as_ref()
    }

    pub fn result(&self) -> Option<&CaptureResult> {
        self.result.as_ref()
    }

    fn transition(&mut self, next: SessionState, action: &'static str) -> Result<(), CaptureError> {
        if !self.state.can_transition_to(next) {
            warn!(
                "Session {}: rejected {} ({} -> {})",
                self.id, action, self.state, next
            );
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action,
            });
        }

        info!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn begin_countdown(&mut self, secs: u32) -> Result<(), CaptureError> {
        self.transition(SessionState::CountingDown, "start countdown")?;
        self.countdown_remaining = secs;
        Ok(())
    }

    /// Advance the countdown by one step; returns the seconds left
    pub fn tick_countdown(&mut self) -> Result<u32, CaptureError> {
        if self.state != SessionState::CountingDown {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "tick countdown",
            });
        }
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        debug!("Session {}: countdown {}", self.id, self.countdown_remaining);
        Ok(self.countdown_remaining)
    }

    /// Abandon the countdown; nothing was acquired yet
    pub fn abort_countdown(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::Idle, "cancel")?;
        self.countdown_remaining = 0;
        Ok(())
    }

    /// Enter `Recording` with the negotiated encoding, fixed from here on
    pub fn begin_recording(&mut self, mime_type: Option<String>) -> Result<(), CaptureError> {
        self.transition(SessionState::Recording, "start recording")?;
        self.mime_type = mime_type;
        self.countdown_remaining = 0;
        Ok(())
    }

    /// Append an encoded fragment; only accepted while recording
    pub fn append_fragment(&mut self, fragment: Vec<u8>) -> Result<bool, CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action: "append audio",
            });
        }
        self.chunks.append(fragment)
    }

    /// Enter `Stopped` and finalize the chunks into the payload.
    ///
    /// The transition happens even when finalizing fails; the caller then fails
    /// the session with the returned error.
    pub fn stop(&mut self, payload_mime_type: &str) -> Result<Arc<Payload>, CaptureError> {
        self.transition(SessionState::Stopped, "stop")?;
        let payload = Arc::new(self.chunks.finalize(payload_mime_type)?);
        self.payload = Some(Arc::clone(&payload));
        Ok(payload)
    }

    pub fn begin_upload(&mut self) -> Result<(), CaptureError> {
        if self.payload.is_none() {
            return Err(CaptureError::EmptyRecording);
        }
        self.transition(SessionState::Uploading, "upload")
    }

    pub fn complete(&mut self, result: CaptureResult) -> Result<(), CaptureError> {
        self.transition(SessionState::Completed, "complete")?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: CaptureError) -> Result<(), CaptureError> {
        self.transition(SessionState::Failed, "fail")?;
        self.chunks.discard();
        self.error = Some(error);
        Ok(())
    }

    /// Cancel a running recording; accumulated chunks are discarded unsent
    pub fn cancel(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::Cancelled, "cancel")?;
        self.chunks.discard();
        Ok(())
    }

    /// Explicit reset from a terminal state
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        self.transition(SessionState::Idle, "reset")
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}
