//! Log loading: transport bytes in, validated [`AnimationRecord`] out.

use crate::record::{AnimationRecord, ParseError};
use replay_env::{EnvError, LogEnvelope, LogLocation, LogTransport};
use thiserror::Error;
use tracing::{info, warn};

/// A load attempt failed. Fatal to the attempt only; whatever the slot was
/// playing keeps playing.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The bytes could not be acquired
    #[error("Transport error: {0}")]
    Transport(#[from] EnvError),

    /// The bytes are not a valid log
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

pub fn load_from_bytes(raw: &[u8]) -> Result<AnimationRecord, LoadError> {
    Ok(AnimationRecord::parse(raw)?)
}

pub fn load_from_str(raw: &str) -> Result<AnimationRecord, LoadError> {
    load_from_bytes(raw.as_bytes())
}

pub fn load_from_envelope(envelope: &LogEnvelope) -> Result<AnimationRecord, LoadError> {
    let record = load_from_bytes(&envelope.payload)?;
    info!("Parsed {} ({} bytes)", envelope.origin, envelope.size());
    Ok(record)
}

/// Fetches and parses the log at `location`.
pub async fn load_from_location<T: LogTransport + ?Sized>(
    transport: &T,
    location: &LogLocation,
) -> Result<AnimationRecord, LoadError> {
    let envelope = transport.fetch(location).await.map_err(|e| {
        warn!("Fetching {} failed: {}", location, e);
        LoadError::from(e)
    })?;
    load_from_envelope(&envelope)
}
