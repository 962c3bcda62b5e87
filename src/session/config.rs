use std::time::Duration;

use crate::audio::{AudioStreamConfig, DEFAULT_ENCODING_PREFERENCES};

/// Per-control capture policy
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    /// Seconds counted down before recording starts (0 = record immediately)
    pub countdown_secs: u32,

    /// Length of one countdown step
    /// Default: 1 second
    pub countdown_tick: Duration,

    /// Ordered encoding preferences, first supported wins
    pub encoding_preferences: Vec<String>,

    /// Format requested from the device
    pub stream: AudioStreamConfig,
}

impl CapturePolicy {
    /// Policy for surfaces that record straight away
    pub fn immediate() -> Self {
        Self {
            countdown_secs: 0,
            ..Self::default()
        }
    }

    pub fn with_countdown(mut self, secs: u32) -> Self {
        self.countdown_secs = secs;
        self
    }

    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            countdown_tick: Duration::from_secs(1),
            encoding_preferences: DEFAULT_ENCODING_PREFERENCES
                .iter()
                .map(|e| e.to_string())
                .collect(),
            stream: AudioStreamConfig::default(),
        }
    }
}
