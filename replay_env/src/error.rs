//! Error types for the RePLAY environment abstraction.

use thiserror::Error;

/// Transport-level failures, kept distinct from log parse errors.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Reading the log failed
    #[error("I/O error: {0}")]
    Io(String),

    /// No log exists at the requested location
    #[error("Log not found: {0}")]
    NotFound(String),

    /// The transport cannot serve this kind of location
    #[error("Unsupported location: {0}")]
    Unsupported(String),
}

impl EnvError {
    /// Creates a not-found error.
    pub fn not_found(location: impl std::fmt::Display) -> Self {
        Self::NotFound(location.to_string())
    }

    /// Creates an unsupported-location error.
    pub fn unsupported(location: impl std::fmt::Display) -> Self {
        Self::Unsupported(location.to_string())
    }
}

impl From<std::io::Error> for EnvError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}
