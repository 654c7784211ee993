// File: muzebot-common/src/models/track.rs

use serde::{Deserialize, Serialize};

/// A queued piece of audio: where to get it and how to display it.
/// Immutable once accepted into a queue; loop modes re-insert clones.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// http(s) locator, or a source URL produced by the search path.
    pub url: String,
    pub title: String,
    pub artist: Option<String>,
}

impl Track {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        artist: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            artist,
        }
    }

    /// Fallback constructor for locators we know nothing about yet:
    /// the locator doubles as the display title.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: url.clone(),
            url,
            artist: None,
        }
    }
}
