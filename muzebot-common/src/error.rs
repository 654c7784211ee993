// ================================================================
// File: muzebot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Voice transport error: {0}")]
    Voice(String),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Platform(format!("{e:?}"))
    }
}

/// Failure classes for turning a track locator into a playable stream.
/// Any of these is non-fatal at the player boundary: the offending track
/// is reported and dropped, and playback advances to the next item.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transcode error: {0}")]
    Transcode(String),
}
