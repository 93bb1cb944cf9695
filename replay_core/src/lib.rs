//! RePLAY Core - Playback and frame sampling for rigid-body animation logs
//!
//! A log records one pose per group per frame on a fixed time grid. This
//! library turns it into looping playback:
//! 1. **Parsing**: structural validation into an immutable `AnimationRecord`
//! 2. **Sampling**: a pure resolver from continuous time to the nearest frame, wrapping both ways
//! 3. **Playback**: per-viewport clocks and controllers, held by a two-slot registry

pub mod record;
pub mod resolver;
pub mod clock;
pub mod controller;
pub mod registry;
pub mod loader;
pub mod pacing;
pub mod config;
pub mod fixtures;

// Re-export key types for convenience
pub use record::{AnimationRecord, Color, Frame, GeometryDescriptor, Group, ParseError, Pose, PrimitiveKind, Timing, MAX_FRAME_COUNT};
pub use resolver::{quantize, resolve, InvalidTimingError};
pub use clock::PlaybackClock;
pub use controller::{
    ControllerState, GroupSummary, LoadSummary, PlaybackController, PlaybackFault, PoseLookupError, SceneSink,
    TickOutcome, TimeObserver,
};
pub use registry::{InstanceRegistry, LoadTicket, RegistryError, SlotId, TickReport, MAX_SLOTS};
pub use loader::{load_from_bytes, load_from_location, load_from_str, LoadError};
pub use pacing::FramePacer;
pub use config::ViewerConfig;
