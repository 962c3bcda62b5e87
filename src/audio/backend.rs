use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, DeviceUnavailableReason};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Reduce to at most `channels` channels. Mono is the average of every
    /// input channel; other targets keep the leading channels. Frames that
    /// already fit are returned untouched.
    pub fn downmix(self, channels: u16) -> AudioFrame {
        if channels == 0 || self.channels <= channels {
            return self;
        }

        let from = self.channels as usize;
        let to = channels as usize;
        let samples = self
            .samples
            .chunks_exact(from)
            .flat_map(|group| {
                if to == 1 {
                    let sum: i32 = group.iter().map(|&s| s as i32).sum();
                    vec![(sum / from as i32) as i16]
                } else {
                    group[..to].to_vec()
                }
            })
            .collect();

        AudioFrame {
            samples,
            channels,
            ..self
        }
    }
}

/// What a live device stream delivers
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A block of captured audio
    Frame(AudioFrame),
    /// The device reported an error; no more frames will follow
    Fault(String),
}

/// Requested capture format
#[derive(Debug, Clone)]
pub struct AudioStreamConfig {
    /// Preferred sample rate (devices that cannot run at it deliver their
    /// native rate instead)
    pub sample_rate: u32,
    /// Maximum channel count (1 = mono, 2 = stereo); wider input is downmixed
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

/// Stops the platform side of an opened stream
pub trait StreamControl: Send {
    fn stop(&mut self);
}

/// A stream as handed back by a device, before the manager wraps it
pub struct OpenedStream {
    pub events: mpsc::Receiver<DeviceEvent>,
    pub control: Box<dyn StreamControl>,
}

/// Audio capture device
///
/// Implementations:
/// - `FileDevice`: replays a WAV file (testing, batch use)
/// - `MicrophoneDevice`: cpal default input (`microphone` feature)
#[async_trait]
pub trait AudioDevice: Send + Sync {
    /// Request access to the device and start delivering frames
    async fn open(&self, config: &AudioStreamConfig)
        -> Result<OpenedStream, DeviceUnavailableReason>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Acquires and releases the capture device on behalf of one session.
///
/// Every `DeviceStream` it hands out is released exactly once: explicitly via
/// `release`, or when the stream value is dropped on any other exit path.
pub struct DeviceStreamManager {
    device: Arc<dyn AudioDevice>,
    config: AudioStreamConfig,
    next_id: AtomicU64,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl DeviceStreamManager {
    pub fn new(device: Arc<dyn AudioDevice>, config: AudioStreamConfig) -> Self {
        Self {
            device,
            config,
            next_id: AtomicU64::new(1),
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn acquire(&self) -> Result<DeviceStream, CaptureError> {
        info!("Requesting audio device: {}", self.device.name());

        let opened = match self.device.open(&self.config).await {
            Ok(opened) => opened,
            Err(reason) => {
                warn!("Audio device {} unavailable: {:?}", self.device.name(), reason);
                return Err(CaptureError::DeviceUnavailable(reason));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);

        info!("Acquired audio stream {} from {}", id, self.device.name());

        Ok(DeviceStream {
            id,
            device: self.device.name().to_string(),
            events: opened.events,
            control: Some(opened.control),
            released: Arc::clone(&self.released),
        })
    }

    /// Release a stream. Safe to call on an already released stream.
    pub fn release(&self, stream: &mut DeviceStream) -> bool {
        stream.release()
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Streams acquired but not yet released
    pub fn outstanding(&self) -> usize {
        self.acquired_count().saturating_sub(self.released_count())
    }
}

/// Exclusive lease on an acquired device stream
pub struct DeviceStream {
    id: u64,
    device: String,
    events: mpsc::Receiver<DeviceEvent>,
    control: Option<Box<dyn StreamControl>>,
    released: Arc<AtomicUsize>,
}

impl DeviceStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.control.is_none()
    }

    /// Next event from the device; `None` once the stream has ended
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        self.events.recv().await
    }

    /// Stop the device and give the microphone back.
    ///
    /// Returns `true` only for the call that actually released it.
    pub fn release(&mut self) -> bool {
        let Some(mut control) = self.control.take() else {
            return false;
        };

        control.stop();
        self.events.close();
        self.released.fetch_add(1, Ordering::SeqCst);

        info!("Released audio stream {} ({})", self.id, self.device);
        true
    }

    /// Events the device emitted before it was stopped but that were not yet read
    pub fn drain_pending(&mut self) -> Vec<DeviceEvent> {
        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            pending.push(event);
        }
        pending
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        if self.release() {
            debug!("Audio stream {} released on drop", self.id);
        }
    }
}
