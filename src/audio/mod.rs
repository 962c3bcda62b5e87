pub mod backend;
pub mod chunk;
pub mod encoder;
pub mod file;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioDevice, AudioFrame, AudioStreamConfig, DeviceEvent, DeviceStream, DeviceStreamManager,
    OpenedStream, StreamControl,
};
pub use chunk::{ChunkAccumulator, Payload};
pub use encoder::{
    choose_encoding, AudioEncoder, EncoderPlatform, NativePlatform, WavEncoder,
    DEFAULT_ENCODING_PREFERENCES,
};
pub use file::{AudioFile, FileDevice};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneDevice;
