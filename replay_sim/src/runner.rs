//! Scenario runner - executes scripted playback scenarios on a [`SimHost`].

use crate::host::{HostConfig, LoadStats, SimError, SimHost};
use crate::scenarios::ScenarioId;

use replay_core::{fixtures, load_from_str, AnimationRecord, Frame, RegistryError, SlotId, TickOutcome, Timing};
use replay_env::LogLocation;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Host refreshes executed
    pub total_ticks: u64,

    /// Final virtual host time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Pose pushes across all scenes
    pub pose_pushes: u64,

    /// Quantized-time notifications received by the controls
    pub notifications: u64,

    /// Host refreshes that were rendered
    pub rendered_frames: u64,

    pub loads: LoadStats,

    /// Controller faults raised
    pub faults: u64,
}

/// Why a scenario failed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A scenario assertion did not hold
    #[error("{0}")]
    Check(String),
}

impl From<String> for ScenarioError {
    fn from(reason: String) -> Self {
        Self::Check(reason)
    }
}

impl From<&str> for ScenarioError {
    fn from(reason: &str) -> Self {
        Self::Check(reason.to_string())
    }
}

type Verdict = Result<(), ScenarioError>;

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Verdict {
    if condition {
        Ok(())
    } else {
        Err(ScenarioError::Check(reason()))
    }
}

fn builtin(index: usize) -> Result<AnimationRecord, ScenarioError> {
    let raw = fixtures::builtin(index).ok_or_else(|| format!("No built-in log {}", index))?;
    Ok(load_from_str(raw).map_err(SimError::from)?)
}

fn runtime() -> Result<tokio::runtime::Runtime, ScenarioError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SimError::Runtime(e.to_string()).into())
}

fn slot_groups(host: &SimHost, slot: SlotId) -> Option<usize> {
    host.registry()
        .controller(slot)
        .and_then(|c| c.summary())
        .map(|s| s.groups.len())
}

fn clock_time(host: &SimHost, slot: SlotId) -> f64 {
    host.registry()
        .controller(slot)
        .map(|c| c.clock().current_time())
        .unwrap_or(f64::NAN)
}

fn push_count(host: &SimHost, slot: SlotId) -> usize {
    host.registry().controller(slot).map_or(0, |c| c.scene().push_count())
}

/// Runs playback scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Host time each scenario runs for, in seconds
    duration_secs: f64,

    host_config: HostConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_secs: 3.0,
            host_config: HostConfig {
                jitter_std_ms: 2.0,
                ..Default::default()
            },
        }
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Replaces the host configuration.
    pub fn with_host_config(mut self, config: HostConfig) -> Self {
        self.host_config = config;
        self
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.1))
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let mut host = match SimHost::new(self.seed, self.host_config.clone()) {
            Ok(host) => host,
            Err(e) => {
                return ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    total_ticks: 0,
                    final_time_secs: 0.0,
                    failure_reason: Some(e.to_string()),
                    metrics: ScenarioMetrics::default(),
                }
            }
        };

        let verdict = match scenario {
            ScenarioId::DualPlayback => self.run_dual_playback(&mut host),
            ScenarioId::ReverseWrap => self.run_reverse_wrap(&mut host),
            ScenarioId::ScrubWhilePlaying => self.run_scrub_while_playing(&mut host),
            ScenarioId::StaleLoad => self.run_stale_load(&mut host),
            ScenarioId::CapacityEvict => self.run_capacity_evict(&mut host),
            ScenarioId::SpeedFreeze => self.run_speed_freeze(&mut host),
            ScenarioId::FaultIsolation => self.run_fault_isolation(&mut host),
        };

        let metrics = Self::collect_metrics(&host);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            total_ticks: host.ticks(),
            final_time_secs: host.now().as_secs_f64(),
            failure_reason: verdict.err().map(|e| e.to_string()),
            metrics,
        }
    }

    fn collect_metrics(host: &SimHost) -> ScenarioMetrics {
        let pose_pushes = SlotId::ALL
            .iter()
            .filter_map(|slot| host.registry().controller(*slot))
            .map(|c| c.scene().push_count() as u64)
            .sum();

        ScenarioMetrics {
            pose_pushes,
            notifications: host.observer().times().len() as u64,
            rendered_frames: host.rendered_frames(),
            loads: host.load_stats(),
            faults: host.faults().len() as u64,
        }
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    fn run_dual_playback(&self, host: &mut SimHost) -> Verdict {
        let one = host.open_viewport(None)?;
        let two = host.open_viewport(None)?;
        host.load_now(one, builtin(0)?)?;
        host.load_now(two, builtin(1)?)?;

        ensure(host.registry().active() == Some(two), || "Newest viewport is not active".to_string())?;

        let half = self.duration() / 2;
        host.run_for(half);

        // Exactly one notification per tick: only the active slot reports
        ensure(host.observer().times().len() as u64 == host.ticks(), || {
            format!("{} notifications for {} ticks", host.observer().times().len(), host.ticks())
        })?;
        let orbit = *builtin(1)?.timing();
        for t in host.observer().times() {
            ensure(on_grid(*t, &orbit), || format!("Slot 2 reported off-grid time {}", t))?;
        }

        host.registry_mut().set_active(one)?;
        let switched_at = host.observer().times().len();
        host.run_for(half);

        let cylinder = *builtin(0)?.timing();
        for t in &host.observer().times()[switched_at..] {
            ensure(on_grid(*t, &cylinder), || format!("Slot 1 reported off-grid time {}", t))?;
        }

        for slot in [one, two] {
            let controller = host.registry().controller(slot).ok_or("Slot vanished")?;
            let groups = controller.scene().groups().len();
            ensure(controller.scene().push_count() > groups, || {
                format!("Slot {} never left its first frame", slot)
            })?;
        }
        ensure(host.faults().is_empty(), || "Unexpected fault".to_string())
    }

    fn run_reverse_wrap(&self, host: &mut SimHost) -> Verdict {
        let slot = host.open_viewport(None)?;
        let record = builtin(0)?;
        let frame_count = record.timing().frame_count();
        host.load_now(slot, record)?;
        host.registry_mut().controller_mut(slot).ok_or("Slot vanished")?.set_speed(-1.0);

        host.run_for(self.duration());

        let frames = host.export().frame_sequence(slot);
        ensure(frames.first() == Some(&0), || format!("Playback began at {:?}", frames.first()))?;

        let mut wraps = 0;
        for pair in frames.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next > prev {
                ensure(next - prev > frame_count / 2, || format!("Reverse playback stepped forward {} -> {}", prev, next))?;
                wraps += 1;
            } else {
                ensure(prev - next <= 2, || format!("Reverse playback skipped {} -> {}", prev, next))?;
            }
        }
        ensure(wraps >= 1, || "Reverse playback never wrapped".to_string())?;
        ensure(frames.get(1).map_or(false, |f| *f + 2 >= frame_count), || {
            format!("First wrap landed on {:?}, expected the loop end", frames.get(1))
        })
    }

    fn run_scrub_while_playing(&self, host: &mut SimHost) -> Verdict {
        let slot = host.open_viewport(None)?;
        let record = builtin(0)?;
        let timing = *record.timing();
        host.load_now(slot, record)?;
        host.run_for(self.duration() / 4);

        let target = 40;
        let controller = host.registry_mut().controller_mut(slot).ok_or("Slot vanished")?;
        controller.set_time(timing.time_of(target));
        ensure(controller.is_playing(), || "Seek paused playback".to_string())?;

        let report = host.step();
        let outcome = report
            .outcomes
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, outcome)| *outcome)
            .ok_or("Slot did not tick")?;

        match outcome {
            TickOutcome::Resolved {
                frame,
                quantized_time,
                pose_applied,
                ..
            } => {
                ensure(frame == target || frame == target + 1, || format!("Seek landed on frame {}", frame))?;
                ensure(pose_applied, || "Seek did not push a pose".to_string())?;
                ensure((quantized_time - timing.time_of(frame)).abs() < 1e-9, || {
                    format!("Reported {} for frame {}", quantized_time, frame)
                })?;
                ensure(host.observer().last() == Some(quantized_time), || {
                    "Controls were not told the seek time".to_string()
                })?;
            }
            other => return Err(format!("Unexpected outcome after seek: {:?}", other).into()),
        }

        host.run_for(Duration::from_millis(500));
        let frame = host.registry().controller(slot).and_then(|c| c.current_frame());
        ensure(frame.map_or(false, |f| f > target + 1), || format!("Playback stalled after seek at {:?}", frame))
    }

    fn run_stale_load(&self, host: &mut SimHost) -> Verdict {
        let rt = runtime()?;
        let slot = host.open_viewport(None)?;

        let slow = LogLocation::file("slow.json");
        let fast = LogLocation::file("fast.json");
        let missing = LogLocation::file("missing.json");
        host.transport()
            .insert(slow.clone(), fixtures::builtin(1).ok_or("No built-in log 1")?, Duration::from_millis(500));
        host.transport()
            .insert(fast.clone(), fixtures::builtin(0).ok_or("No built-in log 0")?, Duration::from_millis(50));

        rt.block_on(host.request_load(slot, &slow))?;
        rt.block_on(host.request_load(slot, &fast))?;
        host.run_for(Duration::from_millis(200));

        ensure(slot_groups(host, slot) == Some(2), || "Fast load did not land".to_string())?;

        rt.block_on(host.request_load(slot, &missing))?;
        host.run_for(self.duration().max(Duration::from_secs(1)));

        let stats = host.load_stats();
        ensure(stats == LoadStats { loaded: 1, stale: 1, failed: 1 }, || format!("Load stats {:?}", stats))?;
        ensure(slot_groups(host, slot) == Some(2), || "Slot lost the fast log".to_string())?;

        let frame = host.registry().controller(slot).and_then(|c| c.current_frame());
        ensure(frame.map_or(false, |f| f > 0), || "Playback stopped after failed load".to_string())
    }

    fn run_capacity_evict(&self, host: &mut SimHost) -> Verdict {
        let one = host.open_viewport(None)?;
        let two = host.open_viewport(None)?;
        host.load_now(one, builtin(0)?)?;
        host.load_now(two, builtin(1)?)?;

        match host.open_viewport(None) {
            Err(SimError::Registry(RegistryError::Capacity)) => {}
            other => return Err(format!("Third viewport: expected capacity error, got {:?}", other).into()),
        }

        host.run_for(self.duration() / 2);

        host.registry_mut().evict(one)?;
        ensure(host.registry().active() == Some(two), || "Evicting inactive slot moved activation".to_string())?;

        let reopened = host.open_viewport(None)?;
        ensure(reopened == SlotId::One, || format!("Reopened slot {}", reopened))?;
        ensure(host.registry().active() == Some(SlotId::One), || "Reopened slot is not active".to_string())?;

        host.registry_mut().evict(SlotId::One)?;
        ensure(host.registry().active() == Some(two), || "Activation did not fall back to slot 2".to_string())?;

        let before = host.registry().controller(two).and_then(|c| c.current_frame());
        host.run_for(self.duration() / 2);
        let after = host.registry().controller(two).and_then(|c| c.current_frame());
        ensure(before != after, || "Slot 2 stopped animating".to_string())
    }

    fn run_speed_freeze(&self, host: &mut SimHost) -> Verdict {
        let slot = host.open_viewport(None)?;
        host.load_now(slot, builtin(0)?)?;
        host.step();

        host.registry_mut().controller_mut(slot).ok_or("Slot vanished")?.set_speed(0.0);
        let (frozen_time, frozen_pushes) = (clock_time(host, slot), push_count(host, slot));
        host.run_for(self.duration() / 2);
        ensure(clock_time(host, slot) == frozen_time, || "Speed 0 moved the clock".to_string())?;
        ensure(push_count(host, slot) == frozen_pushes, || "Speed 0 pushed new poses".to_string())?;

        host.registry_mut().controller_mut(slot).ok_or("Slot vanished")?.set_speed(2.0);
        let (host_before, clock_before) = (host.now(), clock_time(host, slot));
        host.run_for(self.duration() / 2);
        let host_delta = (host.now() - host_before).as_secs_f64();
        let clock_delta = clock_time(host, slot) - clock_before;
        ensure((clock_delta - 2.0 * host_delta).abs() < 1e-6, || {
            format!("Clock moved {:.6}s in {:.6}s of host time at 2x", clock_delta, host_delta)
        })?;

        host.registry_mut().pause_all();
        let paused_at = clock_time(host, slot);
        host.run_for(Duration::from_millis(250));
        ensure(clock_time(host, slot) == paused_at, || "Paused clock moved".to_string())
    }

    fn run_fault_isolation(&self, host: &mut SimHost) -> Verdict {
        let healthy = host.open_viewport(None)?;
        let broken = host.open_viewport(None)?;
        host.load_now(healthy, builtin(0)?)?;

        // Orbit's groups over a single empty frame: every lookup misses
        let orbit = builtin(1)?;
        let record = AnimationRecord::from_parts_unchecked(
            Some("broken".to_string()),
            orbit.groups().to_vec(),
            vec![Frame::new(HashMap::new())],
            Timing::new(0.1, 0.0, 0.9).map_err(|e| e.to_string())?,
        );
        host.load_now(broken, record)?;

        host.run_for(self.duration());

        let faults = host.faults();
        ensure(faults.len() == 1, || format!("{} faults raised, expected 1", faults.len()))?;
        ensure(faults[0].1 == broken, || format!("Fault raised in slot {}", faults[0].1))?;

        let halted = host.registry().controller(broken).ok_or("Slot vanished")?;
        ensure(halted.fault().is_some(), || "Broken slot is not halted".to_string())?;
        ensure(halted.scene().push_count() == 0, || "Broken slot pushed a partial frame".to_string())?;

        let alive = host.registry().controller(healthy).ok_or("Slot vanished")?;
        ensure(alive.fault().is_none(), || "Healthy slot faulted".to_string())?;
        ensure(alive.scene().push_count() > 2, || "Healthy slot stopped animating".to_string())
    }
}

/// Frame times run from `start` to `stop` inclusive: the last frame sits on
/// `stop` when the span is a whole number of steps.
fn on_grid(time: f64, timing: &Timing) -> bool {
    let steps = (time - timing.start) / timing.step;
    time >= timing.start - 1e-9 && time <= timing.stop + 1e-9 && (steps - steps.round()).abs() < 1e-6
}
