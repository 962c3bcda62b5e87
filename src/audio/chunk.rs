use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::encoder::extension_for;
use crate::error::CaptureError;

/// The finalized recording, ready for upload
#[derive(Debug, Clone)]
pub struct Payload {
    /// Concatenated encoded bytes
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime_type: String,
    /// Number of fragments that made up the payload
    pub fragment_count: usize,
    /// When the payload was finalized
    pub created_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            fragment_count: 1,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Upload filename embedding the capture timestamp, e.g. `recording-1730000000000.webm`
    pub fn file_name(&self, prefix: &str) -> String {
        format!(
            "{}-{}.{}",
            prefix,
            self.created_at.timestamp_millis(),
            extension_for(&self.mime_type)
        )
    }
}

/// Buffers encoded fragments in arrival order and joins them into one payload.
///
/// Append-only until `finalize`, which may run once. `discard` drops everything
/// without producing a payload (cancellation).
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    fragments: Vec<Vec<u8>>,
    total_bytes: usize,
    finalized: bool,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns `Ok(false)` for zero-length fragments, which are ignored.
    pub fn append(&mut self, fragment: Vec<u8>) -> Result<bool, CaptureError> {
        if self.finalized {
            warn!("Fragment of {} bytes arrived after finalize, rejected", fragment.len());
            return Err(CaptureError::AlreadyFinalized);
        }

        if fragment.is_empty() {
            return Ok(false);
        }

        self.total_bytes += fragment.len();
        self.fragments.push(fragment);

        debug!(
            "Fragment {} appended ({} bytes total)",
            self.fragments.len(),
            self.total_bytes
        );

        Ok(true)
    }

    /// Join all fragments into the payload. Only the first call may succeed.
    pub fn finalize(&mut self, mime_type: &str) -> Result<Payload, CaptureError> {
        if self.finalized {
            return Err(CaptureError::AlreadyFinalized);
        }
        self.finalized = true;

        if self.fragments.is_empty() {
            warn!("Finalize called with no audio fragments");
            return Err(CaptureError::EmptyRecording);
        }

        let fragment_count = self.fragments.len();
        let mut bytes = Vec::with_capacity(self.total_bytes);
        for fragment in self.fragments.drain(..) {
            bytes.extend_from_slice(&fragment);
        }

        info!(
            "Recording finalized: {} fragments, {} bytes ({})",
            fragment_count,
            bytes.len(),
            mime_type
        );

        Ok(Payload {
            bytes,
            mime_type: mime_type.to_string(),
            fragment_count,
            created_at: Utc::now(),
        })
    }

    /// Drop all fragments and freeze the accumulator without producing a payload
    pub fn discard(&mut self) {
        if !self.fragments.is_empty() {
            info!(
                "Discarding {} fragments ({} bytes)",
                self.fragments.len(),
                self.total_bytes
            );
        }
        self.fragments.clear();
        self.total_bytes = 0;
        self.finalized = true;
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}
