//! Scheduler configuration, loadable from and persistable to JSON.

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// Tunables for a [`crate::scheduler::PlayerScheduler`] instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    /// Audio device sample rate in Hz, forwarded to the sound-chip
    /// emulator via [`crate::chip::RegisterSink::reconfigure`] callers.
    pub sample_rate: u32,
    /// Output volume, 0.0..=1.0.
    pub volume: f32,
    /// Requested [`crate::queue::FrameQueue`] capacity (rounded up to a
    /// power of two by the queue itself).
    pub queue_capacity: usize,
    /// Repeat the current file when it reaches the end.
    pub repeat_file: bool,
    /// Repeat the current directory listing when it is exhausted.
    pub repeat_directory: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            volume: 1.0,
            queue_capacity: 8,
            repeat_file: false,
            repeat_directory: false,
        }
    }
}

impl PlayerConfig {
    /// Parses a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| DeviceError::InvalidArgument(format!("invalid player config: {e}")))?;
        if !(0.0..=1.0).contains(&config.volume) {
            return Err(DeviceError::InvalidArgument(format!(
                "volume {} out of range 0.0..=1.0",
                config.volume
            )));
        }
        if config.queue_capacity == 0 {
            return Err(DeviceError::InvalidArgument(
                "queue_capacity must be greater than 0".into(),
            ));
        }
        Ok(config)
    }

    /// Serializes this config to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DeviceError::InvalidArgument(format!("cannot serialize config: {e}")))
    }
}
