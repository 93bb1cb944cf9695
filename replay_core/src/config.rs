//! Viewer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default render rate of a viewport.
pub const DEFAULT_FPS: u32 = 60;

/// Settings shared by every controller a registry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Target render rate in Hz (default: 60). Zero renders on every callback.
    pub fps: u32,

    /// Whether a freshly loaded animation starts playing (default: true)
    pub autoplay: bool,

    /// Speed multiplier a new controller starts with (default: 1.0)
    pub initial_speed: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            autoplay: true,
            initial_speed: 1.0,
        }
    }
}

impl ViewerConfig {
    /// Reads a config from JSON; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Minimum wall time between two rendered frames, `1000 / fps` whole
    /// milliseconds.
    pub fn frame_interval(&self) -> Duration {
        if self.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(1000 / self.fps as u64)
        }
    }
}
