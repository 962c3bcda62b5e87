// Shared test doubles for the capture pipeline.
//
// The mock device hands its frame sender to the test so frames, faults and
// end-of-stream can be injected at will, and counts opens and stops. The mock
// transcriber counts submissions and answers with a canned result.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_intent::audio::{
    AudioDevice, AudioFrame, AudioStreamConfig, DeviceEvent, OpenedStream, StreamControl,
};
use voice_intent::{
    CaptureError, DeviceUnavailableReason, ExtractedFields, Payload, Transcriber,
    TranscriptionResult,
};

pub struct MockDevice {
    failure: Option<DeviceUnavailableReason>,
    opens: AtomicUsize,
    stops: Arc<AtomicUsize>,
    sender: Mutex<Option<mpsc::Sender<DeviceEvent>>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            opens: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            sender: Mutex::new(None),
        })
    }

    pub fn failing(reason: DeviceUnavailableReason) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(reason),
            opens: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            sender: Mutex::new(None),
        })
    }

    /// Successful acquisitions
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams stopped by their lease
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn sender(&self) -> Option<mpsc::Sender<DeviceEvent>> {
        self.sender.lock().unwrap().clone()
    }

    /// Push `count` frames of 100 ms; false once the stream is gone
    pub async fn send_frames(&self, count: usize) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        for i in 0..count {
            let frame = AudioFrame {
                samples: vec![(i as i16) * 10; 1600],
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: i as u64 * 100,
            };
            if tx.send(DeviceEvent::Frame(frame)).await.is_err() {
                return false;
            }
        }
        true
    }

    pub async fn send_fault(&self, message: &str) -> bool {
        match self.sender() {
            Some(tx) => tx.send(DeviceEvent::Fault(message.to_string())).await.is_ok(),
            None => false,
        }
    }

    /// Close the stream from the device side
    pub fn end_stream(&self) {
        self.sender.lock().unwrap().take();
    }
}

struct MockControl {
    stops: Arc<AtomicUsize>,
}

impl StreamControl for MockControl {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioDevice for MockDevice {
    async fn open(
        &self,
        _config: &AudioStreamConfig,
    ) -> Result<OpenedStream, DeviceUnavailableReason> {
        if let Some(reason) = self.failure {
            return Err(reason);
        }

        let (tx, rx) = mpsc::channel(256);
        *self.sender.lock().unwrap() = Some(tx);
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(OpenedStream {
            events: rx,
            control: Box::new(MockControl {
                stops: Arc::clone(&self.stops),
            }),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockTranscriber {
    response: Result<TranscriptionResult, CaptureError>,
    delay: Duration,
    submits: AtomicUsize,
    last_payload: Mutex<Option<Payload>>,
}

impl MockTranscriber {
    pub fn replying(response: Result<TranscriptionResult, CaptureError>) -> Arc<Self> {
        Arc::new(Self {
            response,
            delay: Duration::ZERO,
            submits: AtomicUsize::new(0),
            last_payload: Mutex::new(None),
        })
    }

    pub fn slow(response: Result<TranscriptionResult, CaptureError>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            response,
            delay,
            submits: AtomicUsize::new(0),
            last_payload: Mutex::new(None),
        })
    }

    pub fn navigating_to(page: &str) -> Arc<Self> {
        Self::replying(Ok(TranscriptionResult {
            transcription: Some(format!("go to {}", page)),
            page: Some(page.to_string()),
            fields: ExtractedFields::default(),
        }))
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Option<Payload> {
        self.last_payload.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn submit(&self, payload: &Payload) -> Result<TranscriptionResult, CaptureError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().unwrap() = Some(payload.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response.clone()
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
