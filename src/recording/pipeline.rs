use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::events::{CaptureCommand, CaptureEvent, Reply};
use crate::audio::{
    choose_encoding, AudioDevice, AudioEncoder, AudioFrame, DeviceEvent, DeviceStream,
    DeviceStreamManager, EncoderPlatform, NativePlatform, Payload,
};
use crate::error::CaptureError;
use crate::intent::{IntentHost, IntentMode, IntentResolver};
use crate::session::{CapturePolicy, RecordingSession, SessionSnapshot, SessionState};
use crate::transcription::{Transcriber, TranscriptionResult};

type UploadTask = JoinHandle<Result<TranscriptionResult, CaptureError>>;

/// Builder for one capture control: device, encoder platform, transcription
/// client and host callbacks wired into a single state machine task.
pub struct CapturePipeline {
    device: Arc<dyn AudioDevice>,
    platform: Arc<dyn EncoderPlatform>,
    transcriber: Arc<dyn Transcriber>,
    resolver: IntentResolver,
    host: Arc<dyn IntentHost>,
    policy: CapturePolicy,
}

impl CapturePipeline {
    pub fn new(
        device: Arc<dyn AudioDevice>,
        transcriber: Arc<dyn Transcriber>,
        mode: IntentMode,
        host: Arc<dyn IntentHost>,
    ) -> Self {
        Self {
            device,
            platform: Arc::new(NativePlatform),
            transcriber,
            resolver: IntentResolver::new(mode),
            host,
            policy: CapturePolicy::default(),
        }
    }

    pub fn with_platform(mut self, platform: Arc<dyn EncoderPlatform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_policy(mut self, policy: CapturePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start the state machine task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> CaptureHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle());

        let machine = CaptureMachine {
            devices: DeviceStreamManager::new(self.device, self.policy.stream.clone()),
            platform: self.platform,
            transcriber: self.transcriber,
            resolver: self.resolver,
            host: self.host,
            policy: self.policy,
            session: None,
            live: None,
            countdown: None,
            upload: None,
            snapshots: snapshot_tx,
        };

        tokio::spawn(machine.run(command_rx));

        CaptureHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }
}

/// Host-side handle to a running capture control
#[derive(Clone)]
pub struct CaptureHandle {
    commands: mpsc::Sender<CaptureCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl CaptureHandle {
    /// Start a new session. Returns once the session is counting down,
    /// recording, or has failed to acquire the device.
    pub async fn start(&self) -> Result<Uuid, CaptureError> {
        self.request(CaptureCommand::Start).await
    }

    /// Stop recording; the payload is finalized and uploaded
    pub async fn stop(&self) -> Result<(), CaptureError> {
        self.request(CaptureCommand::Stop).await
    }

    /// Cancel a countdown or a recording. Uploads cannot be cancelled.
    pub async fn cancel(&self) -> Result<(), CaptureError> {
        self.request(CaptureCommand::Cancel).await
    }

    /// End whatever is running without failing it: a recording is stopped
    /// and uploaded, a countdown is cancelled. Anything else is left alone.
    pub async fn finish(&self) -> Result<(), CaptureError> {
        match self.snapshot().state {
            SessionState::Recording => self.stop().await,
            SessionState::CountingDown => self.cancel().await,
            _ => Ok(()),
        }
    }

    /// Return a finished session to idle
    pub async fn reset(&self) -> Result<(), CaptureError> {
        self.request(CaptureCommand::Reset).await
    }

    /// Tear the control down; live streams are released, uploads abandoned
    pub async fn shutdown(&self) {
        let _ = self.commands.send(CaptureCommand::Shutdown).await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// State-change notifications
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, CaptureError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| CaptureError::PipelineClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait until the session is terminal or the control is idle
    pub async fn settled(&self) -> Result<SessionSnapshot, CaptureError> {
        self.wait_for(SessionSnapshot::is_settled).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> CaptureCommand,
    ) -> Result<T, CaptureError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| CaptureError::PipelineClosed)?;
        reply_rx.await.map_err(|_| CaptureError::PipelineClosed)?
    }
}

struct LiveCapture {
    stream: DeviceStream,
    encoder: Box<dyn AudioEncoder>,
}

/// The only component allowed to change session state
struct CaptureMachine {
    devices: DeviceStreamManager,
    platform: Arc<dyn EncoderPlatform>,
    transcriber: Arc<dyn Transcriber>,
    resolver: IntentResolver,
    host: Arc<dyn IntentHost>,
    policy: CapturePolicy,
    session: Option<RecordingSession>,
    live: Option<LiveCapture>,
    countdown: Option<Interval>,
    upload: Option<UploadTask>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl CaptureMachine {
    async fn run(mut self, mut commands: mpsc::Receiver<CaptureCommand>) {
        info!(
            "Capture pipeline started ({:?} mode, device {})",
            self.resolver.mode(),
            self.devices.device_name()
        );

        loop {
            let event = tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => CaptureEvent::Command(command),
                    None => break,
                },
                event = next_device_event(&mut self.live) => CaptureEvent::Device(event),
                _ = next_tick(&mut self.countdown) => CaptureEvent::CountdownTick,
                result = join_upload(&mut self.upload) => CaptureEvent::UploadFinished(result),
            };

            if !self.handle(event).await {
                break;
            }
        }

        self.teardown();
    }

    async fn handle(&mut self, event: CaptureEvent) -> bool {
        match event {
            CaptureEvent::Command(CaptureCommand::Start(reply)) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            CaptureEvent::Command(CaptureCommand::Stop(reply)) => {
                let _ = reply.send(self.stop());
            }
            CaptureEvent::Command(CaptureCommand::Cancel(reply)) => {
                let _ = reply.send(self.cancel());
            }
            CaptureEvent::Command(CaptureCommand::Reset(reply)) => {
                let _ = reply.send(self.reset());
            }
            CaptureEvent::Command(CaptureCommand::Shutdown) => return false,
            CaptureEvent::CountdownTick => self.on_countdown_tick().await,
            CaptureEvent::Device(event) => self.on_device_event(event),
            CaptureEvent::UploadFinished(result) => self.on_upload_finished(result),
        }
        true
    }

    fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(RecordingSession::state)
            .unwrap_or(SessionState::Idle)
    }

    fn publish(&self) {
        let snapshot = match &self.session {
            Some(session) => SessionSnapshot::of(session),
            None => SessionSnapshot::idle(),
        };
        self.snapshots.send_replace(snapshot);
    }

    async fn start(&mut self) -> Result<Uuid, CaptureError> {
        if let Some(previous) = &self.session {
            if previous.state().is_active() {
                warn!("Start rejected: session {} is {}", previous.id(), previous.state());
                return Err(CaptureError::SessionActive(previous.state()));
            }
            info!("Discarding finished session {} ({})", previous.id(), previous.state());
        }

        let mut session = RecordingSession::new();
        let id = session.id();

        if self.policy.countdown_secs > 0 {
            session.begin_countdown(self.policy.countdown_secs)?;
            let tick = self.policy.countdown_tick;
            self.countdown = Some(time::interval_at(Instant::now() + tick, tick));
            self.session = Some(session);
            self.publish();
        } else {
            self.session = Some(session);
            self.enter_recording().await;
        }

        Ok(id)
    }

    async fn on_countdown_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.countdown = None;
            return;
        };

        match session.tick_countdown() {
            Ok(0) => {
                self.countdown = None;
                self.publish();
                self.enter_recording().await;
            }
            Ok(_) => self.publish(),
            Err(e) => {
                warn!("Stray countdown tick: {}", e);
                self.countdown = None;
            }
        }
    }

    /// Negotiate the encoding, create the encoder, acquire the device
    async fn enter_recording(&mut self) {
        let mime_type = choose_encoding(self.platform.as_ref(), &self.policy.encoding_preferences);

        let encoder = match self.platform.create_encoder(mime_type.as_deref()) {
            Ok(encoder) => encoder,
            Err(e) => return self.fail(e),
        };

        let stream = match self.devices.acquire().await {
            Ok(stream) => stream,
            Err(e) => return self.fail(e),
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(e) = session.begin_recording(mime_type) {
            // `stream` is dropped here, which releases it
            warn!("Could not enter recording: {}", e);
            return;
        }

        self.live = Some(LiveCapture { stream, encoder });
        self.publish();
    }

    fn on_device_event(&mut self, event: Option<DeviceEvent>) {
        match event {
            Some(DeviceEvent::Frame(frame)) => {
                let appended = match (self.live.as_mut(), self.session.as_mut()) {
                    (Some(live), Some(session)) => {
                        encode_frame(session, live.encoder.as_mut(), &frame)
                    }
                    _ => Ok(false),
                };
                match appended {
                    Ok(true) => self.publish(),
                    Ok(false) => {}
                    Err(e) => self.fail(e),
                }
            }
            Some(DeviceEvent::Fault(message)) => {
                warn!("Audio device fault: {}", message);
                self.fail(CaptureError::StreamFault(message));
            }
            None => {
                info!("Audio device stream ended");
                self.finish_recording();
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let state = self.state();
        if state != SessionState::Recording {
            return Err(CaptureError::InvalidTransition {
                from: state,
                action: "stop",
            });
        }
        self.finish_recording();
        Ok(())
    }

    /// Recording -> Stopped -> Uploading. The stream is released before
    /// anything else so it is given back even if finalizing fails.
    fn finish_recording(&mut self) {
        let Some(mut live) = self.live.take() else {
            return;
        };
        live.stream.release();

        let Some(session) = self.session.as_mut() else {
            return;
        };

        // Frames emitted before the stop still belong to the recording
        let mut flushed = Ok(());
        for event in live.stream.drain_pending() {
            match event {
                DeviceEvent::Frame(frame) => {
                    if let Err(e) = encode_frame(session, live.encoder.as_mut(), &frame) {
                        flushed = Err(e);
                        break;
                    }
                }
                // A fault queued behind the stop still ends the recording
                DeviceEvent::Fault(message) => {
                    warn!("Device fault queued before stop: {}", message);
                    flushed = Err(CaptureError::StreamFault(message));
                    break;
                }
            }
        }
        let stopped = flushed
            .and_then(|()| live.encoder.finish())
            .and_then(|tail| session.append_fragment(tail).map(|_| ()))
            .and_then(|()| session.stop(live.encoder.mime_type()));

        match stopped {
            Ok(payload) => self.begin_upload(payload),
            Err(e) => self.fail(e),
        }
    }

    fn begin_upload(&mut self, payload: Arc<Payload>) {
        self.publish();

        let started = match self.session.as_mut() {
            Some(session) => session.begin_upload(),
            None => return,
        };
        if let Err(e) = started {
            return self.fail(e);
        }

        let transcriber = Arc::clone(&self.transcriber);
        self.upload = Some(tokio::spawn(async move { transcriber.submit(&payload).await }));
        self.publish();
    }

    fn on_upload_finished(&mut self, result: Result<TranscriptionResult, CaptureError>) {
        self.upload = None;

        let transcription = match result {
            Ok(transcription) => transcription,
            Err(e) => return self.fail(e),
        };

        let resolved = self.resolver.resolve(&transcription, self.host.as_ref());
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.complete(resolved) {
                warn!("Could not complete session: {}", e);
            }
        }
        self.publish();
    }

    fn cancel(&mut self) -> Result<(), CaptureError> {
        let state = self.state();
        if !state.is_cancellable() {
            return Err(CaptureError::InvalidTransition {
                from: state,
                action: "cancel",
            });
        }
        match state {
            SessionState::CountingDown => {
                self.countdown = None;
                if let Some(session) = self.session.as_mut() {
                    session.abort_countdown()?;
                    info!("Countdown cancelled for session {}", session.id());
                }
                self.session = None;
                self.publish();
                Ok(())
            }
            SessionState::Recording => {
                if let Some(mut live) = self.live.take() {
                    live.stream.release();
                }
                if let Some(session) = self.session.as_mut() {
                    session.cancel()?;
                }
                self.publish();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<(), CaptureError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.reset()?;
        self.session = None;
        self.publish();
        Ok(())
    }

    /// Any failure: stop counting down, give the device back, record the error
    fn fail(&mut self, error: CaptureError) {
        self.countdown = None;
        if let Some(mut live) = self.live.take() {
            live.stream.release();
        }

        if let Some(session) = self.session.as_mut() {
            error!("Session {} failed: {}", session.id(), error);
            if let Err(e) = session.fail(error) {
                warn!("Could not mark session failed: {}", e);
            }
        }
        self.publish();
    }

    fn teardown(&mut self) {
        self.countdown = None;
        if let Some(mut live) = self.live.take() {
            live.stream.release();
        }
        if let Some(upload) = self.upload.take() {
            info!("Abandoning in-flight upload");
            upload.abort();
        }
        info!(
            "Capture pipeline stopped ({} streams acquired, {} released)",
            self.devices.acquired_count(),
            self.devices.released_count()
        );
    }
}

fn encode_frame(
    session: &mut RecordingSession,
    encoder: &mut dyn AudioEncoder,
    frame: &AudioFrame,
) -> Result<bool, CaptureError> {
    let fragment = encoder.encode(frame)?;
    session.append_fragment(fragment)
}

async fn next_device_event(live: &mut Option<LiveCapture>) -> Option<DeviceEvent> {
    match live {
        Some(live) => live.stream.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(countdown: &mut Option<Interval>) {
    match countdown {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn join_upload(upload: &mut Option<UploadTask>) -> Result<TranscriptionResult, CaptureError> {
    match upload {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(CaptureError::NetworkError(format!("upload task failed: {e}"))),
        },
        None => std::future::pending().await,
    }
}
