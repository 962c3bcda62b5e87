// Integration tests for the capture state machine
//
// These tests drive a spawned pipeline through its handle with a mock device
// and a mock transcriber, and check device acquisition/release, upload
// counts and the state each session ends in.

mod common;

use anyhow::Result;
use common::{eventually, MockDevice, MockTranscriber};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use voice_intent::{
    CaptureError, CaptureHandle, CapturePipeline, CapturePolicy, DeviceUnavailableReason,
    ErrorKind, ExtractedFields, IntentMode, IntentOutcome, ListingForm, MemoryHost,
    SessionSnapshot, SessionState, TranscriptionResult,
};

const WAIT: Duration = Duration::from_secs(5);

fn spawn(
    device: &Arc<MockDevice>,
    transcriber: &Arc<MockTranscriber>,
    mode: IntentMode,
    host: &Arc<MemoryHost>,
    policy: CapturePolicy,
) -> CaptureHandle {
    CapturePipeline::new(device.clone(), transcriber.clone(), mode, host.clone())
        .with_policy(policy)
        .spawn()
}

async fn settled(capture: &CaptureHandle) -> Result<SessionSnapshot> {
    Ok(timeout(WAIT, capture.settled()).await??)
}

#[tokio::test]
async fn test_countdown_recording_upload_navigates() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/dashboard");
    let host = Arc::new(MemoryHost::new());
    let policy = CapturePolicy::default()
        .with_countdown(2)
        .with_countdown_tick(Duration::from_millis(50));
    let capture = spawn(&device, &transcriber, IntentMode::Navigate, &host, policy);

    let id = capture.start().await?;
    let snapshot = capture.snapshot();
    assert_eq!(snapshot.state, SessionState::CountingDown);
    assert_eq!(snapshot.countdown_remaining, Some(2));
    assert_eq!(snapshot.session_id, Some(id));
    assert_eq!(device.opens(), 0, "Device must not be acquired during countdown");

    timeout(WAIT, capture.wait_for(|s| s.state == SessionState::Recording)).await??;
    assert_eq!(device.opens(), 1);
    assert_eq!(capture.snapshot().mime_type.as_deref(), Some("audio/wav"));

    assert!(device.send_frames(5).await);
    capture.stop().await?;

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Completed);
    assert_eq!(done.session_id, Some(id));
    assert!(done.error.is_none());

    let result = done.result.expect("completed session carries a result");
    assert_eq!(result.transcription.as_deref(), Some("go to /dashboard"));
    assert!(done.chunk_count > 0, "Chunk count is kept after the payload is built");
    assert!(done.payload_bytes.is_some());
    assert!(done.started_at.is_some());
    assert_eq!(
        result.outcome,
        IntentOutcome::Navigated {
            target: "/dashboard".to_string()
        }
    );

    assert_eq!(host.targets(), vec!["/dashboard".to_string()], "Navigate exactly once");
    assert_eq!(transcriber.submits(), 1);
    assert_eq!(device.stops(), 1, "Stream released exactly once");

    let payload = transcriber.last_payload().expect("payload was uploaded");
    assert_eq!(payload.mime_type, "audio/wav");
    assert_eq!(&payload.bytes[0..4], b"RIFF");
    assert!(payload.file_name("routing").starts_with("routing-"));

    Ok(())
}

#[tokio::test]
async fn test_cancel_during_countdown_never_acquires_device() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::default()
            .with_countdown(3)
            .with_countdown_tick(Duration::from_millis(20)),
    );

    capture.start().await?;
    capture.cancel().await?;

    let snapshot = capture.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.session_id, None);

    // Three ticks would have reached recording by now
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(capture.snapshot().state, SessionState::Idle);
    assert_eq!(device.opens(), 0);
    assert_eq!(transcriber.submits(), 0);

    Ok(())
}

#[tokio::test]
async fn test_cancel_during_recording_releases_and_never_uploads() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert_eq!(capture.snapshot().state, SessionState::Recording);
    assert!(device.send_frames(3).await);

    capture.cancel().await?;
    let snapshot = capture.snapshot();
    assert_eq!(snapshot.state, SessionState::Cancelled);
    assert_eq!(snapshot.chunk_count, 0, "Chunks are discarded on cancel");
    assert!(snapshot.payload_bytes.is_none());

    assert_eq!(device.opens(), 1);
    assert_eq!(device.stops(), 1);
    assert_eq!(transcriber.submits(), 0);
    assert!(!device.send_frames(1).await, "Released stream no longer accepts frames");

    // Cancelling twice is rejected
    let err = capture.cancel().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    Ok(())
}

#[tokio::test]
async fn test_stop_without_audio_fails_with_empty_recording() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    capture.stop().await?;

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Failed);
    let error = done.error.expect("failed session carries an error");
    assert_eq!(error.kind, ErrorKind::EmptyRecording);

    assert_eq!(transcriber.submits(), 0, "Empty recordings are never uploaded");
    assert_eq!(device.stops(), 1);

    Ok(())
}

#[tokio::test]
async fn test_denied_device_fails_session_with_reason() -> Result<()> {
    let device = MockDevice::failing(DeviceUnavailableReason::PermissionDenied);
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;

    let snapshot = capture.snapshot();
    assert_eq!(snapshot.state, SessionState::Failed);
    let error = snapshot.error.expect("failed session carries an error");
    assert_eq!(error.kind, ErrorKind::DeviceUnavailable);
    assert_eq!(error.message, "Microphone access was denied.");
    assert_eq!(transcriber.submits(), 0);

    Ok(())
}

#[tokio::test]
async fn test_server_error_surfaces_kind_and_status() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::replying(Err(CaptureError::ServerError {
        status: 500,
        message: "Internal Server Error".to_string(),
    }));
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(2).await);
    capture.stop().await?;

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Failed);
    let error = done.error.expect("failed session carries an error");
    assert_eq!(error.kind, ErrorKind::ServerError);
    assert_eq!(error.status, Some(500));
    assert!(done.result.is_none());
    assert!(host.targets().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_upload_cannot_be_cancelled_and_ends_once() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::slow(
        Ok(TranscriptionResult {
            page: Some("/orders".to_string()),
            ..TranscriptionResult::default()
        }),
        Duration::from_millis(200),
    );
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(2).await);
    capture.stop().await?;
    assert_eq!(capture.snapshot().state, SessionState::Uploading);

    let err = capture.cancel().await.unwrap_err();
    assert!(matches!(
        err,
        CaptureError::InvalidTransition {
            from: SessionState::Uploading,
            ..
        }
    ));

    let err = capture.start().await.unwrap_err();
    assert_eq!(err, CaptureError::SessionActive(SessionState::Uploading));

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Completed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(capture.snapshot().state, SessionState::Completed);
    assert_eq!(host.targets().len(), 1);
    assert_eq!(transcriber.submits(), 1);

    Ok(())
}

#[tokio::test]
async fn test_start_while_recording_is_rejected() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    let id = capture.start().await?;
    let err = capture.start().await.unwrap_err();
    assert_eq!(err, CaptureError::SessionActive(SessionState::Recording));
    assert_eq!(capture.snapshot().session_id, Some(id));
    assert_eq!(device.opens(), 1, "Rejected start must not acquire again");

    // Reset is only for finished sessions
    let err = capture.reset().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    Ok(())
}

#[tokio::test]
async fn test_rerecord_from_terminal_state_starts_new_session() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    let first = capture.start().await?;
    capture.stop().await?;
    assert_eq!(settled(&capture).await?.state, SessionState::Failed);

    let second = capture.start().await?;
    assert_ne!(first, second);
    let snapshot = capture.snapshot();
    assert_eq!(snapshot.state, SessionState::Recording);
    assert!(snapshot.error.is_none(), "Previous error is not carried over");
    assert_eq!(device.opens(), 2);

    Ok(())
}

#[tokio::test]
async fn test_reset_returns_to_idle() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(1).await);
    capture.stop().await?;
    assert_eq!(settled(&capture).await?.state, SessionState::Completed);

    capture.reset().await?;
    let snapshot = capture.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.result.is_none());

    // Nothing to reset when idle
    capture.reset().await?;

    Ok(())
}

#[tokio::test]
async fn test_stream_fault_fails_and_releases() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(2).await);
    assert!(device.send_fault("device unplugged").await);

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Failed);
    let error = done.error.expect("failed session carries an error");
    assert_eq!(error.kind, ErrorKind::StreamFault);
    assert!(error.message.contains("device unplugged"));

    assert_eq!(device.stops(), 1);
    assert_eq!(transcriber.submits(), 0);

    Ok(())
}

#[tokio::test]
async fn test_fault_queued_before_stop_fails_session() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    // Queue frames and a fault, then stop before the pipeline drains them
    assert!(device.send_frames(3).await);
    assert!(device.send_fault("device unplugged").await);
    capture.stop().await?;

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Failed, "A queued fault must not be dropped");
    let error = done.error.expect("failed session carries an error");
    assert_eq!(error.kind, ErrorKind::StreamFault);
    assert!(error.message.contains("device unplugged"));
    assert!(done.result.is_none());

    assert_eq!(transcriber.submits(), 0, "Faulted audio is never uploaded");
    assert_eq!(device.stops(), 1);
    assert!(host.targets().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_cancel_outside_countdown_or_recording_is_rejected() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    let err = capture.cancel().await.unwrap_err();
    assert_eq!(
        err,
        CaptureError::InvalidTransition {
            from: SessionState::Idle,
            action: "cancel",
        }
    );

    capture.start().await?;
    assert!(device.send_frames(2).await);
    capture.stop().await?;
    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Completed);

    let err = capture.cancel().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(
        capture.snapshot().state,
        SessionState::Completed,
        "Cancel leaves a finished session alone"
    );
    assert_eq!(transcriber.submits(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stream_end_is_treated_as_stop() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/reports");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(4).await);
    device.end_stream();

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Completed);
    assert_eq!(host.last_target().as_deref(), Some("/reports"));
    assert_eq!(device.stops(), 1);

    Ok(())
}

#[tokio::test]
async fn test_field_extraction_merges_into_form() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::replying(Ok(TranscriptionResult {
        transcription: Some("Tomato forty rupees".to_string()),
        page: Some("/ignored".to_string()),
        fields: ExtractedFields {
            name: Some("Tomato".to_string()),
            price: Some(40.0),
            ..ExtractedFields::default()
        },
    }));
    let host = Arc::new(MemoryHost::with_form(ListingForm {
        quantity: Some(12.0),
        ..ListingForm::default()
    }));
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::ExtractFields,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(3).await);
    capture.stop().await?;

    let done = settled(&capture).await?;
    assert_eq!(done.state, SessionState::Completed);

    let form = host.form();
    assert_eq!(form.name, "Tomato");
    assert_eq!(form.price, Some(40.0));
    assert_eq!(form.unit, "per kg", "Unit keeps its prior value");
    assert_eq!(form.quantity, Some(12.0), "Quantity keeps its prior value");
    assert!(host.targets().is_empty(), "Extraction mode never navigates");

    Ok(())
}

#[tokio::test]
async fn test_finish_stops_recording_or_cancels_countdown() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/inbox");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::default()
            .with_countdown(3)
            .with_countdown_tick(Duration::from_secs(1)),
    );

    // Nothing running
    capture.finish().await?;
    assert_eq!(capture.snapshot().state, SessionState::Idle);

    capture.start().await?;
    capture.finish().await?;
    assert_eq!(capture.snapshot().state, SessionState::Idle);
    assert_eq!(device.opens(), 0);

    let recording = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );
    recording.start().await?;
    assert!(device.send_frames(3).await);
    recording.finish().await?;

    let done = settled(&recording).await?;
    assert_eq!(done.state, SessionState::Completed);
    assert_eq!(host.last_target().as_deref(), Some("/inbox"));
    assert_eq!(transcriber.submits(), 1);
    assert_eq!(device.stops(), 1);

    // Finished sessions are left as they are
    recording.finish().await?;
    assert_eq!(recording.snapshot().state, SessionState::Completed);

    Ok(())
}

#[tokio::test]
async fn test_shutdown_releases_live_stream() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(2).await);
    capture.shutdown().await;

    assert!(eventually(|| device.stops() == 1).await, "Stream released on teardown");
    assert_eq!(transcriber.submits(), 0);

    let err = capture.start().await.unwrap_err();
    assert_eq!(err, CaptureError::PipelineClosed);

    Ok(())
}

#[tokio::test]
async fn test_dropping_every_handle_tears_down() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::navigating_to("/home");
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    drop(capture);

    assert!(eventually(|| device.stops() == 1).await, "Stream released when handles are gone");

    Ok(())
}

#[tokio::test]
async fn test_shutdown_during_upload_discards_result() -> Result<()> {
    let device = MockDevice::new();
    let transcriber = MockTranscriber::slow(
        Ok(TranscriptionResult {
            page: Some("/late".to_string()),
            ..TranscriptionResult::default()
        }),
        Duration::from_millis(200),
    );
    let host = Arc::new(MemoryHost::new());
    let capture = spawn(
        &device,
        &transcriber,
        IntentMode::Navigate,
        &host,
        CapturePolicy::immediate(),
    );

    capture.start().await?;
    assert!(device.send_frames(2).await);
    capture.stop().await?;
    assert_eq!(capture.snapshot().state, SessionState::Uploading);

    capture.shutdown().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(host.targets().is_empty(), "Late result must not reach the host");

    Ok(())
}
