//! Recording session data model
//!
//! This module provides the `RecordingSession` value and everything needed to
//! observe it:
//! - Session states and the transition table
//! - Capture policy (countdown, encoding preferences, device format)
//! - Serialisable snapshots published to the host

mod config;
mod session;
mod snapshot;
mod state;

pub use config::CapturePolicy;
pub use session::RecordingSession;
pub use snapshot::SessionSnapshot;
pub use state::SessionState;
