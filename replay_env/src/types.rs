//! Common types for the RePLAY environment abstraction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix applied to `logref` values that are not already URLs.
pub const GITHUB_RAW_PREFIX: &str = "https://raw.githubusercontent.com/";

/// Where a log lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLocation {
    /// A log file on the local filesystem
    File(PathBuf),

    /// A remote log addressed by URL
    Url(String),
}

impl LogLocation {
    /// Creates a file location.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Resolves a `logref` value into a URL location.
    ///
    /// Anything containing `http` is taken verbatim; otherwise the value is
    /// read as `user/repo/branch/path/to/log.json` on GitHub.
    pub fn from_logref(logref: &str) -> Self {
        let logref = logref.trim();
        if logref.contains("http") {
            Self::Url(logref.to_string())
        } else {
            Self::Url(format!("{}{}", GITHUB_RAW_PREFIX, logref.trim_start_matches('/')))
        }
    }
}

impl std::fmt::Display for LogLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLocation::File(path) => write!(f, "{}", path.display()),
            LogLocation::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Raw log bytes as delivered by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// The unparsed log payload
    pub payload: Vec<u8>,

    /// Human-readable origin (path or URL)
    pub origin: String,

    /// Wall-clock time of the fetch, in ms since the Unix epoch
    pub fetched_at_ms: u64,
}

impl LogEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(payload: Vec<u8>, origin: impl Into<String>, fetched_at_ms: u64) -> Self {
        Self {
            payload,
            origin: origin.into(),
            fetched_at_ms,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logref_repo_path_gets_github_prefix() {
        let location = LogLocation::from_logref("someone/robots/master/logs/walk.json");
        assert_eq!(
            location,
            LogLocation::Url("https://raw.githubusercontent.com/someone/robots/master/logs/walk.json".to_string())
        );
    }

    #[test]
    fn test_logref_full_url_is_kept() {
        let location = LogLocation::from_logref("https://example.org/walk.json");
        assert_eq!(location, LogLocation::Url("https://example.org/walk.json".to_string()));
    }

    #[test]
    fn test_location_display() {
        assert_eq!(LogLocation::file("logs/run.json").to_string(), "logs/run.json");
    }
}
