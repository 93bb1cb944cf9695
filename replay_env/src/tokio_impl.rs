//! Production implementations backed by Tokio.

use crate::{EnvError, LogEnvelope, LogLocation, LogTransport, ReplayContext};
use async_trait::async_trait;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Production context backed by the system clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Reads log files from the local filesystem.
///
/// Remote URLs are refused: fetching over the network is left to the host.
#[derive(Debug, Default, Clone)]
pub struct FsTransport {
    context: TokioContext,
}

impl FsTransport {
    pub fn new() -> Self {
        Self::with_context(TokioContext::new())
    }

    /// Stamps fetched envelopes with `context`'s wall clock.
    pub fn with_context(context: TokioContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl LogTransport for FsTransport {
    async fn fetch(&self, location: &LogLocation) -> Result<LogEnvelope, EnvError> {
        match location {
            LogLocation::File(path) => {
                let payload = tokio::fs::read(path).await?;
                let fetched_at_ms = self
                    .context
                    .system_time()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                Ok(LogEnvelope::new(payload, location.to_string(), fetched_at_ms))
            }
            LogLocation::Url(_) => Err(EnvError::unsupported(location)),
        }
    }
}
