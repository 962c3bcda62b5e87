use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioDevice, AudioFrame, AudioStreamConfig, DeviceEvent, OpenedStream, StreamControl};
use crate::error::DeviceUnavailableReason;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into frames of `frame_ms` each, stamped relative to the start
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_ms / 1000) as usize * self.channels as usize;
        let per_frame = per_frame.max(self.channels as usize).max(1);

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Replays a WAV file as if it were a live microphone.
///
/// With `realtime` set, frames are paced at their natural duration; otherwise
/// they are emitted as fast as the consumer reads them. The stream ends when
/// the file is exhausted.
pub struct FileDevice {
    path: PathBuf,
    name: String,
    realtime: bool,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            name,
            realtime: true,
        }
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

#[async_trait]
impl AudioDevice for FileDevice {
    async fn open(
        &self,
        config: &AudioStreamConfig,
    ) -> Result<OpenedStream, DeviceUnavailableReason> {
        if !self.path.exists() {
            warn!("Replay source not found: {}", self.path.display());
            return Err(DeviceUnavailableReason::NoDevice);
        }

        let audio = match AudioFile::open(&self.path) {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Replay source unreadable: {:#}", e);
                return Err(DeviceUnavailableReason::NotSupported);
            }
        };

        if audio.sample_rate != config.sample_rate {
            info!(
                "Replaying at the file's {}Hz (requested {}Hz)",
                audio.sample_rate, config.sample_rate
            );
        }

        let frame_ms = config.buffer_duration_ms.max(1);
        let channels = config.channels;
        let frames: Vec<AudioFrame> = audio
            .frames(frame_ms)
            .into_iter()
            .map(|frame| frame.downmix(channels))
            .collect();
        let realtime = self.realtime;
        let stopped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(64);

        let task_stopped = Arc::clone(&stopped);
        let task = tokio::spawn(async move {
            for frame in frames {
                if task_stopped.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(DeviceEvent::Frame(frame)).await.is_err() {
                    break;
                }
                if realtime {
                    tokio::time::sleep(Duration::from_millis(frame_ms)).await;
                }
            }
        });

        Ok(OpenedStream {
            events: rx,
            control: Box::new(ReplayControl { stopped, task }),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct ReplayControl {
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl StreamControl for ReplayControl {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}
