//! Default system microphone via cpal.
//!
//! `cpal::Stream` is not `Send`, so each opened stream lives on its own
//! thread and frames cross over a channel.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{AudioDevice, AudioFrame, AudioStreamConfig, DeviceEvent, OpenedStream, StreamControl};
use crate::error::DeviceUnavailableReason;

pub struct MicrophoneDevice {
    name: String,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self {
            name: "default microphone".to_string(),
        }
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioDevice for MicrophoneDevice {
    async fn open(
        &self,
        config: &AudioStreamConfig,
    ) -> Result<OpenedStream, DeviceUnavailableReason> {
        let requested = config.clone();
        let (events_tx, events_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("microphone".into())
            .spawn(move || run_stream(requested, events_tx, ready_tx, stop_rx))
            .map_err(|_| DeviceUnavailableReason::NotSupported)?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(OpenedStream {
                events: events_rx,
                control: Box::new(MicrophoneControl { stop: Some(stop_tx) }),
            }),
            Ok(Err(reason)) => Err(reason),
            Err(_) => Err(DeviceUnavailableReason::NotSupported),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct MicrophoneControl {
    stop: Option<std_mpsc::Sender<()>>,
}

impl StreamControl for MicrophoneControl {
    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

fn run_stream(
    requested: AudioStreamConfig,
    events: mpsc::Sender<DeviceEvent>,
    ready: oneshot::Sender<Result<(), DeviceUnavailableReason>>,
    stop: std_mpsc::Receiver<()>,
) {
    let stream = match build_stream(&requested, events) {
        Ok(stream) => stream,
        Err(reason) => {
            let _ = ready.send(Err(reason));
            return;
        }
    };

    if let Err(e) = stream.play() {
        warn!("Failed to start microphone stream: {}", e);
        let _ = ready.send(Err(DeviceUnavailableReason::PermissionDenied));
        return;
    }

    let _ = ready.send(Ok(()));

    // Blocks until stopped or the control is dropped
    let _ = stop.recv();
    drop(stream);
    info!("Microphone stream closed");
}

/// An input config running at the requested rate, fewest channels first.
/// Falls back to the device default when no range covers the rate.
fn pick_input_config(
    device: &cpal::Device,
    requested: &AudioStreamConfig,
) -> Result<cpal::SupportedStreamConfig, DeviceUnavailableReason> {
    let rate = cpal::SampleRate(requested.sample_rate);
    let matching = device.supported_input_configs().ok().and_then(|configs| {
        configs
            .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
            .filter(|c| {
                matches!(
                    c.sample_format(),
                    cpal::SampleFormat::F32 | cpal::SampleFormat::I16
                )
            })
            .min_by_key(|c| c.channels().abs_diff(requested.channels))
    });

    match matching {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => {
            info!(
                "Microphone cannot run at {}Hz, using its default config",
                requested.sample_rate
            );
            device.default_input_config().map_err(|e| {
                warn!("No usable input config: {}", e);
                DeviceUnavailableReason::NoDevice
            })
        }
    }
}

fn build_stream(
    requested: &AudioStreamConfig,
    events: mpsc::Sender<DeviceEvent>,
) -> Result<cpal::Stream, DeviceUnavailableReason> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(DeviceUnavailableReason::NoDevice)?;

    let supported = pick_input_config(&device, requested)?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let target_channels = requested.channels;
    let config: cpal::StreamConfig = supported.config();
    let started = Instant::now();

    info!(
        "Opening microphone {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        channels,
        supported.sample_format()
    );

    let err_events = events.clone();
    let err_fn = move |err: cpal::StreamError| {
        let _ = err_events.try_send(DeviceEvent::Fault(err.to_string()));
    };

    let frame = move |samples: Vec<i16>| {
        AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: started.elapsed().as_millis() as u64,
        }
        .downmix(target_channels)
    };

    let result = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples = data
                    .iter()
                    .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                let _ = events.try_send(DeviceEvent::Frame(frame(samples)));
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = events.try_send(DeviceEvent::Frame(frame(data.to_vec())));
            },
            err_fn,
            None,
        ),
        other => {
            warn!("Unsupported microphone sample format: {:?}", other);
            return Err(DeviceUnavailableReason::NotSupported);
        }
    };

    result.map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceUnavailableReason::NoDevice,
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => DeviceUnavailableReason::NotSupported,
        other => {
            warn!("Microphone refused: {}", other);
            DeviceUnavailableReason::PermissionDenied
        }
    })
}
