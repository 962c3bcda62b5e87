//! Interpretation of transcription results
//!
//! Two mutually exclusive modes over the same result:
//! - navigation: a `page` target handed to the host's navigate callback
//! - field extraction: listing fields merged into the host's form

mod form;
mod host;
mod resolver;

pub use form::{ExtractedFields, ListingForm};
pub use host::MemoryHost;
pub use resolver::{CaptureResult, IntentHost, IntentMode, IntentOutcome, IntentResolver};
