use crate::intent::MemoryHost;
use crate::recording::CaptureHandle;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The capture control driven by the routes
    pub capture: CaptureHandle,

    /// Host callbacks target; the pipeline holds the same instance
    pub host: Arc<MemoryHost>,
}

impl AppState {
    pub fn new(capture: CaptureHandle, host: Arc<MemoryHost>) -> Self {
        Self { capture, host }
    }
}
