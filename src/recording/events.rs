use tokio::sync::oneshot;
use uuid::Uuid;

use crate::audio::DeviceEvent;
use crate::error::CaptureError;
use crate::transcription::TranscriptionResult;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, CaptureError>>;

/// Requests from the host
pub(crate) enum CaptureCommand {
    Start(Reply<Uuid>),
    Stop(Reply<()>),
    Cancel(Reply<()>),
    Reset(Reply<()>),
    Shutdown,
}

/// Everything the state machine reacts to
pub(crate) enum CaptureEvent {
    Command(CaptureCommand),
    CountdownTick,
    /// `None` when the device stream ended on its own
    Device(Option<DeviceEvent>),
    UploadFinished(Result<TranscriptionResult, CaptureError>),
}
