//! Capture pipeline
//!
//! A single task owns the session, the device stream and the in-flight
//! upload. Hosts drive it through a `CaptureHandle`:
//! - start / stop / cancel / reset commands with typed replies
//! - snapshots published on every state change
//! - teardown on `shutdown()` or when every handle is dropped

mod events;
mod pipeline;

pub use pipeline::{CaptureHandle, CapturePipeline};
