//! In-memory log transport with simulated latency.

use crate::context::SimContext;
use async_trait::async_trait;
use replay_env::{EnvError, LogEnvelope, LogLocation, LogTransport, ReplayContext};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct HostedLog {
    payload: Vec<u8>,
    latency: Duration,
}

/// Serves logs from memory.
///
/// Fetches return immediately; the per-location latency is read by the host
/// to decide when the load completes on its virtual timeline.
#[derive(Clone)]
pub struct SimTransport {
    context: SimContext,
    logs: Arc<Mutex<HashMap<LogLocation, HostedLog>>>,
}

impl SimTransport {
    pub fn new(context: SimContext) -> Self {
        Self {
            context,
            logs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Hosts `payload` at `location`, completing `latency` after a request.
    pub fn insert(&self, location: LogLocation, payload: impl Into<Vec<u8>>, latency: Duration) {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.insert(
            location,
            HostedLog {
                payload: payload.into(),
                latency,
            },
        );
    }

    /// Stops serving `location`; later fetches fail with `NotFound`.
    pub fn remove(&self, location: &LogLocation) -> bool {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.remove(location).is_some()
    }

    /// Simulated latency for `location`; zero for unknown locations.
    pub fn latency(&self, location: &LogLocation) -> Duration {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(location).map(|log| log.latency).unwrap_or_default()
    }
}

#[async_trait]
impl LogTransport for SimTransport {
    async fn fetch(&self, location: &LogLocation) -> Result<LogEnvelope, EnvError> {
        let payload = {
            let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
            logs.get(location)
                .map(|log| log.payload.clone())
                .ok_or_else(|| EnvError::not_found(location))?
        };
        let fetched_at_ms = self
            .context
            .system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(LogEnvelope::new(payload, location.to_string(), fetched_at_ms))
    }
}
