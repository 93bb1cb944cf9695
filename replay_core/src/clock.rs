//! Per-instance playback clock.

use serde::{Deserialize, Serialize};

/// Logical animation time, play/pause state and speed for one controller.
///
/// The clock accepts every input; folding time into the loop happens in the
/// resolver when the time is read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackClock {
    /// Logical time, in the same units as the log's `step`
    current_time: f64,

    playing: bool,

    /// Multiplier on real time; negative plays in reverse, zero freezes
    speed: f64,
}

impl PlaybackClock {
    pub fn new(start_time: f64, playing: bool, speed: f64) -> Self {
        Self {
            current_time: start_time,
            playing,
            speed,
        }
    }

    /// Advances time by `real_delta_secs * speed` while playing.
    ///
    /// Negative or non-finite deltas are treated as zero.
    pub fn tick(&mut self, real_delta_secs: f64) {
        if !self.playing || !(real_delta_secs > 0.0) || !real_delta_secs.is_finite() {
            return;
        }
        self.current_time += real_delta_secs * self.speed;
    }

    /// Absolute seek. Works while playing and leaves `playing` untouched.
    pub fn set_time(&mut self, time: f64) {
        self.current_time = time;
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Flips play/pause and returns the new `playing` state.
    pub fn toggle(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(0.0, true, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_tick_scales_by_speed() {
        let mut clock = PlaybackClock::new(1.0, true, 2.0);
        clock.tick(0.5);
        assert_relative_eq!(clock.current_time(), 2.0);
    }

    #[test]
    fn test_paused_clock_does_not_move() {
        let mut clock = PlaybackClock::new(1.0, false, 1.0);
        clock.tick(0.5);
        assert_relative_eq!(clock.current_time(), 1.0);
    }

    #[test]
    fn test_zero_speed_freezes() {
        let mut clock = PlaybackClock::new(0.3, true, 0.0);
        clock.tick(10.0);
        assert_relative_eq!(clock.current_time(), 0.3);
    }

    #[test]
    fn test_negative_speed_runs_backwards_past_zero() {
        let mut clock = PlaybackClock::new(0.05, true, -1.0);
        clock.tick(0.1);
        assert_relative_eq!(clock.current_time(), -0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_delta_ignored() {
        let mut clock = PlaybackClock::new(1.0, true, 1.0);
        clock.tick(-0.5);
        clock.tick(f64::NAN);
        assert_relative_eq!(clock.current_time(), 1.0);
    }

    #[test]
    fn test_seek_while_playing_keeps_playing() {
        let mut clock = PlaybackClock::default();
        clock.set_time(4.2);
        assert!(clock.is_playing());
        assert_relative_eq!(clock.current_time(), 4.2);
    }

    #[test]
    fn test_toggle() {
        let mut clock = PlaybackClock::default();
        assert!(!clock.toggle());
        assert!(!clock.is_playing());
        assert!(clock.toggle());
        clock.pause();
        assert!(!clock.is_playing());
        clock.play();
        assert!(clock.is_playing());
    }

    proptest! {
        #[test]
        fn prop_reverse_speed_never_increases_time(deltas in proptest::collection::vec(0.0f64..0.1, 1..50)) {
            let mut clock = PlaybackClock::new(0.0, true, -1.0);
            let mut previous = clock.current_time();
            for delta in deltas {
                clock.tick(delta);
                prop_assert!(clock.current_time() <= previous);
                previous = clock.current_time();
            }
        }
    }
}
