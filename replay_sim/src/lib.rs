//! RePLAY Deterministic Simulation Host
//!
//! This crate runs the playback engine headlessly against a virtual display
//! refresh, so multi-viewport behavior can be scripted and replayed exactly.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: the host clock only moves when the host steps it
//! - **Loads**: logs come from memory, completing after a configured latency
//! - **Randomness**: refresh jitter is drawn from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimHost                           │
//! │  SimContext (virtual clock)      SimTransport (logs)     │
//! │       │                               │                  │
//! │       ▼                               ▼                  │
//! │  ┌───────────────────────────────────────────────┐       │
//! │  │ InstanceRegistry                              │       │
//! │  │   slot 1: PlaybackController<RecordingScene>  │       │
//! │  │   slot 2: PlaybackController<RecordingScene>  │       │
//! │  └───────────────────────────────────────────────┘       │
//! │       │ quantized time (active slot)                     │
//! │       ▼                                                  │
//! │  RecordingObserver            PlaybackExport (timeline)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use replay_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::ReverseWrap);
//! assert!(result.passed);
//! ```

mod context;
mod transport;
mod recorder;
mod host;
mod exporter;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use transport::SimTransport;
pub use recorder::{PosePush, RecordingObserver, RecordingScene};
pub use host::{HostConfig, LoadStats, SimError, SimHost};
pub use exporter::{PlaybackExport, SlotExport, TimelineSample};
pub use runner::{ScenarioError, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
