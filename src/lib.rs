pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod intent;
pub mod recording;
pub mod session;
pub mod transcription;

pub use audio::{
    AudioDevice, AudioFile, AudioFrame, ChunkAccumulator, DeviceStreamManager, FileDevice,
    NativePlatform, Payload,
};
pub use config::Config;
pub use error::{CaptureError, DeviceUnavailableReason, ErrorKind, SessionError};
pub use http::{create_router, AppState};
pub use intent::{
    CaptureResult, ExtractedFields, IntentHost, IntentMode, IntentOutcome, IntentResolver,
    ListingForm, MemoryHost,
};
pub use recording::{CaptureHandle, CapturePipeline};
pub use session::{CapturePolicy, RecordingSession, SessionSnapshot, SessionState};
pub use transcription::{HttpTranscriber, Transcriber, TranscriptionResult};
