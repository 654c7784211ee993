//! Lyrics lookup against a lyrics HTTP API.
//!
//! Absent or failed lookups are "no lyrics", never an error surfaced to the
//! player; the only hard failure is a transport-level one from reqwest.

use serde::Deserialize;
use tracing::debug;

use muzebot_common::error::Error;

#[derive(Debug, Deserialize)]
struct LyricsResponse {
    lyrics: Option<String>,
}

#[derive(Clone)]
pub struct LyricsClient {
    http: reqwest::Client,
    base_url: String,
}

impl LyricsClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Look up lyrics for a free-text query (usually "title artist").
    pub async fn fetch(&self, query: &str) -> Result<Option<String>, Error> {
        let url = format!(
            "{}/lyrics?title={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            debug!("lyrics API returned {} for '{query}'", resp.status());
            return Ok(None);
        }
        match resp.json::<LyricsResponse>().await {
            Ok(body) => Ok(body.lyrics.filter(|l| !l.trim().is_empty())),
            Err(e) => {
                debug!("lyrics API sent an unparsable body for '{query}': {e}");
                Ok(None)
            }
        }
    }
}
