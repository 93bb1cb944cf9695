//! Render pacing: caps how often a host refresh turns into a rendered frame.

use crate::config::ViewerConfig;
use std::time::Duration;

/// Skips host refreshes that arrive sooner than the configured interval.
///
/// Only rendering is throttled; the clock still sees the full elapsed time on
/// the next rendered tick.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last_render: Option<Duration>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
        }
    }

    /// Paces at the config's frame interval; `fps: 0` never throttles.
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new(config.frame_interval())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true and records `now` if a frame should be rendered.
    pub fn should_render(&mut self, now: Duration) -> bool {
        match self.last_render {
            Some(last) if now.saturating_sub(last) < self.interval => false,
            _ => {
                self.last_render = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_render = None;
    }
}
