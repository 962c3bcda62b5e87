//! HTTP API for hosts that drive capture remotely
//!
//! This module exposes one capture control over REST:
//! - POST /capture/start - Start a session (countdown or immediate)
//! - POST /capture/stop - Stop recording and upload
//! - POST /capture/cancel - Cancel a countdown or a recording
//! - POST /capture/reset - Return a finished session to idle
//! - GET /capture/status - Current session snapshot
//! - GET /capture/form - Listing form as filled by field extraction
//! - GET /capture/navigation - Navigation targets received so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
