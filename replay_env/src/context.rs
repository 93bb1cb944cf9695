//! Host clock trait for RePLAY hosts.

use std::time::{Duration, SystemTime};

/// The host's view of time.
///
/// Playback controllers derive their real-time delta from `now()`, so the
/// same controller code runs against the display clock in production and a
/// virtual clock in simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `Instant` and the system clock
/// - **Simulation**: `SimContext` - manually advanced virtual clock
pub trait ReplayContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// This is what a host's per-frame callback reports as its timestamp.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time, used to stamp fetched logs.
    fn system_time(&self) -> SystemTime;
}
