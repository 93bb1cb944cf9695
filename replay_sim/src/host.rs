//! Headless host: drives a registry from a virtual display refresh.
//!
//! # Step
//!
//! ```text
//! advance virtual clock by 1/refresh_hz (+ jitter)
//!         │
//!         ▼
//! deliver loads whose latency has elapsed ──► finish_load (stale/failed are counted)
//!         │
//!         ▼
//! registry.tick_all(now) ──► timeline samples, faults
//!         │
//!         ▼
//! FramePacer::should_render(now) ──► rendered frame count
//! ```

use crate::context::SimContext;
use crate::exporter::{PlaybackExport, TimelineSample};
use crate::recorder::{RecordingObserver, RecordingScene};
use crate::transport::SimTransport;

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use replay_core::{
    load_from_location, AnimationRecord, FramePacer, InstanceRegistry, LoadError, LoadSummary, LoadTicket,
    PlaybackFault, RegistryError, SlotId, TickReport, ViewerConfig,
};
use replay_env::{LogLocation, ReplayContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Host-level failures surfaced to the CLI.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Invalid host configuration: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Display refresh simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host refresh rate in Hz (default: 60)
    pub refresh_hz: f64,

    /// Standard deviation of refresh jitter in ms (default: 0)
    pub jitter_std_ms: f64,

    /// Settings handed to every controller
    pub viewer: ViewerConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60.0,
            jitter_std_ms: 0.0,
            viewer: ViewerConfig::default(),
        }
    }
}

/// How a delivered load ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub loaded: u64,
    pub stale: u64,
    pub failed: u64,
}

struct PendingLoad {
    due: Duration,
    ticket: LoadTicket,
    result: Result<AnimationRecord, LoadError>,
}

/// Owns everything a viewer page would: clock, transport, slots, controls.
pub struct SimHost {
    context: SimContext,
    transport: SimTransport,
    registry: InstanceRegistry<RecordingScene>,
    observer: RecordingObserver,
    pacer: FramePacer,

    rng: ChaCha8Rng,
    jitter: Option<Normal<f64>>,
    refresh: Duration,

    pending: Vec<PendingLoad>,
    load_stats: LoadStats,
    faults: Vec<(Duration, SlotId, PlaybackFault)>,

    ticks: u64,
    rendered_frames: u64,
    export: PlaybackExport,
}

impl SimHost {
    pub fn new(seed: u64, config: HostConfig) -> Result<Self, SimError> {
        if !(config.refresh_hz > 0.0) || !config.refresh_hz.is_finite() {
            return Err(SimError::Config(format!("refresh_hz must be positive, got {}", config.refresh_hz)));
        }

        let context = SimContext::new(seed);
        let jitter = if config.jitter_std_ms > 0.0 {
            Some(
                Normal::new(0.0, config.jitter_std_ms)
                    .map_err(|e| SimError::Config(format!("jitter_std_ms: {}", e)))?,
            )
        } else {
            None
        };

        Ok(Self {
            transport: SimTransport::new(context.clone()),
            rng: context.derive_rng(0x7e51),
            pacer: FramePacer::from_config(&config.viewer),
            registry: InstanceRegistry::new(config.viewer),
            observer: RecordingObserver::new(),
            jitter,
            refresh: Duration::from_secs_f64(1.0 / config.refresh_hz),
            pending: Vec::new(),
            load_stats: LoadStats::default(),
            faults: Vec::new(),
            ticks: 0,
            rendered_frames: 0,
            export: PlaybackExport::new("sim", seed),
            context,
        })
    }

    pub fn context(&self) -> &SimContext {
        &self.context
    }

    pub fn transport(&self) -> &SimTransport {
        &self.transport
    }

    pub fn registry(&self) -> &InstanceRegistry<RecordingScene> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InstanceRegistry<RecordingScene> {
        &mut self.registry
    }

    pub fn observer(&self) -> &RecordingObserver {
        &self.observer
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    /// Opens a viewport with a fresh recording scene.
    pub fn open_viewport(&mut self, preferred: Option<SlotId>) -> Result<SlotId, SimError> {
        Ok(self.registry.assign_slot(preferred, RecordingScene::new())?)
    }

    /// Loads a record into `slot` immediately.
    pub fn load_now(&mut self, slot: SlotId, record: AnimationRecord) -> Result<LoadSummary, SimError> {
        let summary = self.registry.load(slot, record)?;
        self.load_stats.loaded += 1;
        self.export.add_slot(slot, summary.clone());
        Ok(summary)
    }

    /// Starts an asynchronous load of `location` into `slot`.
    ///
    /// The fetch and parse happen now; the result reaches the slot once the
    /// transport's latency for `location` has elapsed on the virtual clock.
    pub async fn request_load(&mut self, slot: SlotId, location: &LogLocation) -> Result<LoadTicket, SimError> {
        let ticket = self.registry.begin_load(slot)?;
        let result = load_from_location(&self.transport, location).await;
        let due = self.now() + self.transport.latency(location);

        debug!("Load #{} of {} into slot {} due at {:?}", ticket.sequence(), location, slot, due);
        self.pending.push(PendingLoad { due, ticket, result });
        Ok(ticket)
    }

    /// Loads still waiting on their latency.
    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    /// Runs one host refresh.
    pub fn step(&mut self) -> TickReport {
        let interval = self.next_interval();
        self.context.advance_time(interval);
        let now = self.now();

        self.deliver_due_loads(now);

        let report = self.registry.tick_all(now, &mut self.observer);
        let host_time_sec = now.as_secs_f64();
        for (slot, outcome) in &report.outcomes {
            if let Some(sample) = TimelineSample::from_outcome(host_time_sec, *slot, outcome) {
                self.export.add_sample(sample);
            }
        }
        for (slot, fault) in &report.faults {
            self.faults.push((now, *slot, fault.clone()));
        }

        if self.pacer.should_render(now) {
            self.rendered_frames += 1;
        }
        self.ticks += 1;

        trace!("Tick {} at {:?}: {} outcomes", self.ticks, now, report.outcomes.len());
        report
    }

    /// Steps until `duration` of virtual time has passed. Returns ticks run.
    pub fn run_for(&mut self, duration: Duration) -> u64 {
        let end = self.now() + duration;
        let mut ticks = 0;
        while self.now() < end {
            self.step();
            ticks += 1;
        }
        ticks
    }

    fn next_interval(&mut self) -> Duration {
        let base = self.refresh.as_secs_f64();
        let jitter = self
            .jitter
            .as_ref()
            .map(|normal| normal.sample(&mut self.rng) / 1000.0)
            .unwrap_or(0.0);
        Duration::from_secs_f64((base + jitter).max(0.001))
    }

    fn deliver_due_loads(&mut self, now: Duration) {
        let (mut due, waiting): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;
        due.sort_by_key(|p| p.due);

        for load in due {
            let slot = load.ticket.slot();
            match self.registry.finish_load(load.ticket, load.result) {
                Ok(summary) => {
                    self.load_stats.loaded += 1;
                    self.export.add_slot(slot, summary);
                }
                Err(RegistryError::StaleLoad { .. }) => self.load_stats.stale += 1,
                Err(e) => {
                    info!("Slot {} keeps its animation: {}", slot, e);
                    self.load_stats.failed += 1;
                }
            }
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames
    }

    pub fn load_stats(&self) -> LoadStats {
        self.load_stats
    }

    pub fn faults(&self) -> &[(Duration, SlotId, PlaybackFault)] {
        &self.faults
    }

    /// The timeline recorded so far.
    pub fn export(&self) -> &PlaybackExport {
        &self.export
    }

    /// Finalizes and hands over the timeline.
    pub fn into_export(mut self, source: &str) -> PlaybackExport {
        let faults = self
            .faults
            .iter()
            .map(|(at, slot, fault)| format!("t={:.3}s slot {}: {}", at.as_secs_f64(), slot, fault))
            .collect();
        self.export.source = source.to_string();
        self.export.finalize(self.rendered_frames, faults);
        self.export
    }
}
