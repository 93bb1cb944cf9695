//! Playback Controller - one viewport's clock, record and resolver, ticked together.
//!
//! # Per-tick flow
//!
//! ```text
//! host callback ──► tick(now)
//!                     │  real delta = now - last tick
//!                     ▼
//!               PlaybackClock::tick(delta)
//!                     │  Empty? stop here
//!                     ▼
//!               resolver::resolve(time, timing) ──► frame
//!                     │  frame changed (or first after load)?
//!                     ▼
//!               SceneSink::apply_pose(group, pose)   for every group
//!                     │  active?
//!                     ▼
//!               TimeObserver::notify_time(frame * step + start)
//! ```
//!
//! A controller whose record breaks its invariants halts its own pose
//! updates; it never takes down the registry or the other slot.

use crate::clock::PlaybackClock;
use crate::config::ViewerConfig;
use crate::record::{AnimationRecord, Group, ParseError, Pose};
use crate::resolver::{self, InvalidTimingError};

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Receives resolved poses (the renderer side of a viewport).
pub trait SceneSink {
    /// Builds the scene for a newly loaded record. Called once per load.
    fn build_scene(&mut self, _groups: &[Group]) {}

    /// Places one group. Called once per group each time the frame changes.
    fn apply_pose(&mut self, group: &str, pose: &Pose);
}

/// Receives the quantized time of the active controller (the Controls side).
pub trait TimeObserver {
    fn notify_time(&mut self, quantized_time: f64);
}

impl<F: FnMut(f64)> TimeObserver for F {
    fn notify_time(&mut self, quantized_time: f64) {
        self(quantized_time)
    }
}

/// A resolved frame has no pose where the record promised one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoseLookupError {
    #[error("Frame {frame} is not recorded (record holds {recorded} frames)")]
    MissingFrame { frame: usize, recorded: usize },

    #[error("Frame {frame} has no pose for group {group}")]
    MissingGroup { frame: usize, group: String },
}

/// Why a controller stopped updating poses.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackFault {
    #[error(transparent)]
    InvalidTiming(#[from] InvalidTimingError),

    #[error(transparent)]
    PoseLookup(#[from] PoseLookupError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No record loaded; ticks advance the clock and nothing else
    Empty,
    /// A record is loaded; the clock may be playing or paused
    Loaded,
}

/// Per-group entry of a [`LoadSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    /// `#rrggbb`
    pub color: String,
    pub transparency: f64,
}

/// What the control panel needs after a load: slider bounds and group list.
///
/// Timing values are the normalized ones, whatever shape the log used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub name: Option<String>,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub groups: Vec<GroupSummary>,
}

impl LoadSummary {
    pub fn from_record(record: &AnimationRecord) -> Self {
        let timing = record.timing();
        Self {
            name: record.name().map(str::to_string),
            start: timing.start,
            stop: timing.stop,
            step: timing.step,
            groups: record
                .groups()
                .iter()
                .map(|g| GroupSummary {
                    name: g.name.clone(),
                    color: g.initial_color.to_hex_string(),
                    transparency: g.initial_transparency,
                })
                .collect(),
        }
    }
}

/// Result of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing loaded yet
    Empty,
    /// Pose updates stopped after an earlier fault
    Halted,
    /// The clock sits on a non-finite time; this tick pushed and reported nothing
    Unresolved { time: f64 },
    Resolved {
        frame: usize,
        quantized_time: f64,
        /// Poses were pushed this tick (the frame changed)
        pose_applied: bool,
        /// The observer was notified this tick (controller is active)
        notified: bool,
    },
}

struct Sample {
    frame: usize,
    quantized_time: f64,
    pose_applied: bool,
}

/// Drives one viewport.
pub struct PlaybackController<S: SceneSink> {
    scene: S,
    record: Option<AnimationRecord>,
    clock: PlaybackClock,
    is_active: bool,

    /// Last frame pushed to the scene; `None` forces a push on the next tick
    last_frame: Option<usize>,

    /// Host timestamp of the previous tick
    last_tick: Option<Duration>,

    fault: Option<PlaybackFault>,
}

impl<S: SceneSink> PlaybackController<S> {
    /// Creates an Empty controller.
    pub fn new(scene: S, config: &ViewerConfig) -> Self {
        Self {
            scene,
            record: None,
            clock: PlaybackClock::new(0.0, config.autoplay, config.initial_speed),
            is_active: false,
            last_frame: None,
            last_tick: None,
            fault: None,
        }
    }

    /// Installs a record, replacing any previous one wholesale.
    ///
    /// The clock seeks to the record's `start`; play state and speed carry
    /// over. A previous fault is cleared along with the record that caused it.
    pub fn load(&mut self, record: AnimationRecord) -> LoadSummary {
        let summary = LoadSummary::from_record(&record);

        self.scene.build_scene(record.groups());
        self.clock.set_time(record.timing().start);
        self.last_frame = None;
        self.fault = None;
        self.record = Some(record);

        info!(
            "Loaded animation: {} groups, start={} stop={} step={}",
            summary.groups.len(),
            summary.start,
            summary.stop,
            summary.step
        );
        summary
    }

    /// Validates already-decoded log data and loads it.
    pub fn load_animation(&mut self, data: Value) -> Result<LoadSummary, ParseError> {
        let record = AnimationRecord::from_value(data)?;
        Ok(self.load(record))
    }

    /// Advances by the time elapsed since the previous tick.
    ///
    /// `now` is the host's monotonic frame timestamp. The first tick after
    /// construction has a zero delta.
    pub fn tick<O: TimeObserver>(
        &mut self,
        now: Duration,
        observer: &mut O,
    ) -> Result<TickOutcome, PlaybackFault> {
        let real_delta = match self.last_tick {
            Some(previous) => now.saturating_sub(previous).as_secs_f64(),
            None => 0.0,
        };
        self.last_tick = Some(now);
        self.advance(real_delta, observer)
    }

    /// Advances by an explicit real-time delta in seconds.
    pub fn advance<O: TimeObserver>(
        &mut self,
        real_delta_secs: f64,
        observer: &mut O,
    ) -> Result<TickOutcome, PlaybackFault> {
        self.clock.tick(real_delta_secs);

        let sampled = match self.record.as_ref() {
            None => return Ok(TickOutcome::Empty),
            Some(_) if self.fault.is_some() => return Ok(TickOutcome::Halted),
            Some(record) => Self::sample(
                record,
                &mut self.scene,
                &mut self.last_frame,
                self.clock.current_time(),
            ),
        };

        let sample = match sampled {
            Ok(sample) => sample,
            Err(PlaybackFault::InvalidTiming(InvalidTimingError::NonFiniteTime(time))) => {
                warn!("Clock time {} cannot be resolved, skipping pose update", time);
                return Ok(TickOutcome::Unresolved { time });
            }
            Err(fault) => {
                error!("Halting pose updates: {}", fault);
                self.fault = Some(fault.clone());
                return Err(fault);
            }
        };

        if self.is_active {
            observer.notify_time(sample.quantized_time);
        }

        Ok(TickOutcome::Resolved {
            frame: sample.frame,
            quantized_time: sample.quantized_time,
            pose_applied: sample.pose_applied,
            notified: self.is_active,
        })
    }

    fn sample(
        record: &AnimationRecord,
        scene: &mut S,
        last_frame: &mut Option<usize>,
        time: f64,
    ) -> Result<Sample, PlaybackFault> {
        let timing = record.timing();
        let frame = resolver::resolve(time, timing)?;
        let quantized_time = timing.time_of(frame);

        if *last_frame == Some(frame) {
            return Ok(Sample {
                frame,
                quantized_time,
                pose_applied: false,
            });
        }

        // Look everything up before touching the scene so a bad frame
        // never leaves it half-updated.
        let recorded = record.frame(frame).ok_or(PoseLookupError::MissingFrame {
            frame,
            recorded: record.frame_count(),
        })?;
        let poses = record
            .groups()
            .iter()
            .map(|group| {
                recorded
                    .pose(&group.name)
                    .map(|pose| (group.name.as_str(), pose))
                    .ok_or_else(|| PoseLookupError::MissingGroup {
                        frame,
                        group: group.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (name, pose) in poses {
            scene.apply_pose(name, pose);
        }
        *last_frame = Some(frame);
        debug!("Frame {} applied (t={:.4})", frame, quantized_time);

        Ok(Sample {
            frame,
            quantized_time,
            pose_applied: true,
        })
    }

    // ---------------------------------------------------------------------
    // Controls -> Core
    // ---------------------------------------------------------------------

    pub fn set_time(&mut self, time: f64) {
        self.clock.set_time(time);
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.clock.set_speed(speed);
    }

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    /// Flips play/pause and returns the new `playing` state.
    pub fn toggle(&mut self) -> bool {
        self.clock.toggle()
    }

    pub fn set_is_active(&mut self, active: bool) {
        self.is_active = active;
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        if self.record.is_some() {
            ControllerState::Loaded
        } else {
            ControllerState::Empty
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn record(&self) -> Option<&AnimationRecord> {
        self.record.as_ref()
    }

    /// Summary of the loaded record, if any.
    pub fn summary(&self) -> Option<LoadSummary> {
        self.record.as_ref().map(LoadSummary::from_record)
    }

    /// Frame most recently pushed to the scene.
    pub fn current_frame(&self) -> Option<usize> {
        self.last_frame
    }

    /// Quantized time of the clock's current position, without side effects.
    pub fn quantized_time(&self) -> Option<f64> {
        let record = self.record.as_ref()?;
        resolver::quantize(self.clock.current_time(), record.timing()).ok()
    }

    pub fn fault(&self) -> Option<&PlaybackFault> {
        self.fault.as_ref()
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Frame, Timing};
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    const CYLINDER_BOX: &str = include_str!("../fixtures/cylinder_box.json");

    #[derive(Default)]
    struct CountingScene {
        pushes: Vec<(String, [f64; 3])>,
        builds: usize,
    }

    impl SceneSink for CountingScene {
        fn build_scene(&mut self, _groups: &[Group]) {
            self.builds += 1;
        }

        fn apply_pose(&mut self, group: &str, pose: &Pose) {
            self.pushes.push((group.to_string(), pose.position_array()));
        }
    }

    struct Forbidden;

    impl TimeObserver for Forbidden {
        fn notify_time(&mut self, quantized_time: f64) {
            panic!("unexpected notification at {}", quantized_time);
        }
    }

    fn loaded_controller() -> PlaybackController<CountingScene> {
        let mut controller = PlaybackController::new(CountingScene::default(), &ViewerConfig::default());
        controller.load(AnimationRecord::parse(CYLINDER_BOX.as_bytes()).unwrap());
        controller
    }

    fn broken_record() -> AnimationRecord {
        let groups = AnimationRecord::parse(CYLINDER_BOX.as_bytes()).unwrap().groups().to_vec();
        let mut poses = HashMap::new();
        poses.insert("group1".to_string(), Pose::from_arrays([0.0; 3], [0.0, 0.0, 0.0, 1.0]));
        // group2 is missing everywhere and there are fewer frames than the timing needs
        let frames = vec![Frame::new(poses); 3];
        AnimationRecord::from_parts_unchecked(None, groups, frames, Timing::new(0.1, 0.0, 0.9).unwrap())
    }

    #[test]
    fn test_end_to_end_cylinder_box() {
        let mut controller = loaded_controller();
        let mut notified = Vec::new();
        let mut observer = |t: f64| notified.push(t);

        controller.set_time(0.12);
        controller.set_speed(1.0);
        controller.set_is_active(true);

        let outcome = controller.advance(0.04, &mut observer).unwrap();
        match outcome {
            TickOutcome::Resolved { frame, pose_applied, notified: was_notified, .. } => {
                assert_eq!(frame, 1);
                assert!(pose_applied);
                assert!(was_notified);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let group2 = controller
            .scene()
            .pushes
            .iter()
            .find(|(name, _)| name == "group2")
            .unwrap();
        assert_eq!(group2.1, [1.5, 0.0125, 0.0]);
        assert_relative_eq!(notified[0], 0.16, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_controller_only_runs_clock() {
        let mut controller = PlaybackController::new(CountingScene::default(), &ViewerConfig::default());
        let outcome = controller.advance(0.5, &mut Forbidden).unwrap();

        assert_eq!(outcome, TickOutcome::Empty);
        assert_eq!(controller.state(), ControllerState::Empty);
        assert_relative_eq!(controller.clock().current_time(), 0.5);
    }

    #[test]
    fn test_load_seeks_to_start_and_summarizes() {
        let mut controller = PlaybackController::new(CountingScene::default(), &ViewerConfig::default());
        let summary = controller.load(AnimationRecord::parse(CYLINDER_BOX.as_bytes()).unwrap());

        assert_eq!(controller.state(), ControllerState::Loaded);
        assert_relative_eq!(controller.clock().current_time(), 0.12);
        assert_eq!(controller.scene().builds, 1);
        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.groups[1].color, "#00ff00");
        assert_relative_eq!(summary.step, 0.04);
    }

    #[test]
    fn test_first_tick_after_load_pushes_pose() {
        let mut controller = loaded_controller();
        controller.pause();
        controller.advance(0.0, &mut |_t: f64| {}).unwrap();
        assert_eq!(controller.scene().pushes.len(), 2);
        assert_eq!(controller.current_frame(), Some(0));
    }

    #[test]
    fn test_no_duplicate_pose_pushes() {
        let mut controller = loaded_controller();
        controller.advance(0.0, &mut |_t: f64| {}).unwrap();
        // 5ms moves the clock well under half a step
        let outcome = controller.advance(0.005, &mut |_t: f64| {}).unwrap();

        assert!(matches!(outcome, TickOutcome::Resolved { frame: 0, pose_applied: false, .. }));
        assert_eq!(controller.scene().pushes.len(), 2);
    }

    #[test]
    fn test_reload_forces_fresh_push() {
        let mut controller = loaded_controller();
        controller.advance(0.0, &mut |_t: f64| {}).unwrap();
        controller.load(AnimationRecord::parse(CYLINDER_BOX.as_bytes()).unwrap());
        controller.advance(0.0, &mut |_t: f64| {}).unwrap();
        assert_eq!(controller.scene().pushes.len(), 4);
    }

    #[test]
    fn test_inactive_controller_does_not_notify() {
        let mut controller = loaded_controller();
        let outcome = controller.advance(0.04, &mut Forbidden).unwrap();
        assert!(matches!(outcome, TickOutcome::Resolved { notified: false, .. }));
    }

    #[test]
    fn test_notified_time_is_quantized() {
        let mut controller = loaded_controller();
        controller.set_is_active(true);
        let mut times = Vec::new();
        controller.advance(0.05, &mut |t: f64| times.push(t)).unwrap();

        // 0.12 + 0.05 = 0.17 -> frame 1 -> 0.16
        assert_relative_eq!(times[0], 0.16, epsilon = 1e-12);
        assert_relative_eq!(controller.clock().current_time(), 0.17, epsilon = 1e-12);
    }

    #[test]
    fn test_reverse_playback_wraps_to_loop_end() {
        let mut controller = loaded_controller();
        controller.set_speed(-1.0);
        let outcome = controller.advance(0.04, &mut |_t: f64| {}).unwrap();
        assert!(matches!(outcome, TickOutcome::Resolved { frame: 71, .. }));
    }

    #[test]
    fn test_seek_while_paused_updates_pose_on_next_tick() {
        let mut controller = loaded_controller();
        controller.pause();
        controller.advance(0.0, &mut |_t: f64| {}).unwrap();
        controller.set_time(0.12 + 10.0 * 0.04);
        let outcome = controller.advance(0.016, &mut |_t: f64| {}).unwrap();
        assert!(matches!(outcome, TickOutcome::Resolved { frame: 10, pose_applied: true, .. }));
    }

    #[test]
    fn test_tick_uses_host_timestamps() {
        let mut controller = loaded_controller();
        controller.tick(Duration::from_millis(1000), &mut |_t: f64| {}).unwrap();
        assert_relative_eq!(controller.clock().current_time(), 0.12);

        controller.tick(Duration::from_millis(1040), &mut |_t: f64| {}).unwrap();
        assert_relative_eq!(controller.clock().current_time(), 0.16, epsilon = 1e-9);
        assert_eq!(controller.current_frame(), Some(1));
    }

    #[test]
    fn test_pose_lookup_failure_halts_controller() {
        let mut controller = PlaybackController::new(CountingScene::default(), &ViewerConfig::default());
        controller.load(broken_record());

        let err = controller.advance(0.0, &mut |_t: f64| {}).unwrap_err();
        assert_eq!(
            err,
            PlaybackFault::PoseLookup(PoseLookupError::MissingGroup { frame: 0, group: "group2".to_string() })
        );
        assert!(controller.scene().pushes.is_empty());

        let outcome = controller.advance(0.5, &mut |_t: f64| {}).unwrap();
        assert_eq!(outcome, TickOutcome::Halted);
        assert_eq!(controller.state(), ControllerState::Loaded);
        assert!(controller.fault().is_some());
    }

    #[test]
    fn test_non_finite_clock_time_skips_tick_without_halting() {
        let mut controller = loaded_controller();
        controller.set_is_active(true);
        controller.advance(0.0, &mut |_t: f64| {}).unwrap();

        controller.set_time(f64::INFINITY);
        let outcome = controller.advance(0.016, &mut Forbidden).unwrap();
        assert!(matches!(outcome, TickOutcome::Unresolved { time } if time.is_infinite()));
        assert!(controller.fault().is_none());
        assert_eq!(controller.quantized_time(), None);

        controller.set_time(0.12 + 10.0 * 0.04);
        let mut times = Vec::new();
        let outcome = controller.advance(0.0, &mut |t: f64| times.push(t)).unwrap();
        assert!(matches!(outcome, TickOutcome::Resolved { frame: 10, pose_applied: true, .. }));
        assert_relative_eq!(times[0], 0.52, epsilon = 1e-12);
    }

    #[test]
    fn test_overflowing_speed_recovers_after_seek() {
        let mut controller = loaded_controller();
        controller.set_speed(f64::MAX);
        let outcome = controller.advance(10.0, &mut |_t: f64| {}).unwrap();
        assert!(matches!(outcome, TickOutcome::Unresolved { .. }));

        controller.set_speed(1.0);
        controller.set_time(0.12);
        let outcome = controller.advance(0.0, &mut |_t: f64| {}).unwrap();
        assert!(matches!(outcome, TickOutcome::Resolved { frame: 0, .. }));
    }

    #[test]
    fn test_load_animation_rejects_bad_data() {
        let mut controller = PlaybackController::new(CountingScene::default(), &ViewerConfig::default());
        let err = controller
            .load_animation(serde_json::json!({ "groups": [], "frames": {} }))
            .unwrap_err();
        assert_eq!(err, ParseError::MissingTimingFields);
        assert_eq!(controller.state(), ControllerState::Empty);
    }
}
