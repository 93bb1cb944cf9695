//! Log transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{LogEnvelope, LogLocation};

/// Acquires raw log bytes for the loader.
///
/// # Implementations
///
/// - **Production**: `FsTransport` reads files through `tokio::fs`
/// - **Simulation**: in-memory logs with configurable latency
///
/// # Load Flow
///
/// ```text
/// Controls                 Transport                  Core
///   |                          |                        |
///   |-- fetch(location) ------>|                        |
///   |                          |-- LogEnvelope -------->|-- parse() -> AnimationRecord
///   |                          |                        |
/// ```
///
/// The transport only moves bytes. Structural validation belongs to the
/// core's parser, so a transport error and a parse error never overlap.
#[async_trait]
pub trait LogTransport: Send + Sync + 'static {
    /// Fetches the raw log at `location`.
    ///
    /// # Returns
    /// * `Ok(envelope)` - The payload was read in full
    /// * `Err(EnvError::NotFound)` - Nothing exists at that location
    /// * `Err(EnvError::Unsupported)` - This transport cannot serve the location kind
    async fn fetch(&self, location: &LogLocation) -> Result<LogEnvelope, EnvError>;
}
