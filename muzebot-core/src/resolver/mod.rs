// File: src/resolver/mod.rs
//
// Turns a track locator into a playable audio source. Classification into a
// source kind is a pure function of the URL; dispatch to the matching
// extractor follows from the tag. Extraction runs through yt-dlp (platform
// and generic media) or a plain HTTP request (direct audio files); decoding
// and resampling to the transport's fixed PCM format happen inside the
// voice library's input pipeline.

use std::io::Cursor;

use async_trait::async_trait;
use songbird::input::{
    AudioStreamError, Compose, HttpRequest, Input, LiveInput, YoutubeDl,
};
use tracing::warn;
use url::Url;

use muzebot_common::error::ResolveError;
use muzebot_common::models::Track;

/// Closed classification of a locator. Resolver dispatch is a function of
/// this tag alone; no string sniffing happens past this point.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SourceKind {
    /// Plain audio file fetched over HTTP.
    DirectFile,
    /// YouTube / YouTube Music watch pages and short links.
    PlatformMedia,
    /// Anything else yt-dlp might know how to extract.
    GenericMedia,
}

const AUDIO_FILE_EXTENSIONS: &[&str] = &[".mp3", ".ogg", ".wav", ".flac", ".m4a"];

/// Classify an already-parsed locator.
pub fn classify(url: &Url) -> SourceKind {
    let host = url.host_str().unwrap_or_default();
    let is_platform = match host {
        "youtu.be" => true,
        "youtube.com" | "www.youtube.com" | "music.youtube.com" => {
            url.path() == "/watch"
        }
        _ => false,
    };
    if is_platform {
        return SourceKind::PlatformMedia;
    }

    let path = url.path().to_ascii_lowercase();
    if AUDIO_FILE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        SourceKind::DirectFile
    } else {
        SourceKind::GenericMedia
    }
}

/// Parse and scheme-check a locator typed by a user. Anything that is not
/// an absolute http(s) URL is rejected before it can reach a queue.
pub fn parse_locator(raw: &str) -> Result<Url, ResolveError> {
    let url = Url::parse(raw)
        .map_err(|e| ResolveError::UnsupportedSource(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ResolveError::UnsupportedSource(format!(
            "scheme '{other}' is not playable"
        ))),
    }
}

/// A live audio source handed to the transport, plus the extractor handle
/// kept around so the driver can recreate the stream on seek.
pub struct ResolvedSource {
    pub input: Input,
}

impl ResolvedSource {
    /// Short stereo sine burst, used by the test-sound command to verify the
    /// voice path end to end without touching any external source.
    pub fn test_tone(frequency: f32, seconds: u32) -> Result<Self, ResolveError> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = hound::WavWriter::new(cursor, spec)
                .map_err(|e| ResolveError::Transcode(e.to_string()))?;
            let total = spec.sample_rate * seconds;
            for n in 0..total {
                let t = n as f32 / spec.sample_rate as f32;
                let sample =
                    ((t * frequency * 2.0 * std::f32::consts::PI).sin() * 0.4 * i16::MAX as f32) as i16;
                for _ in 0..spec.channels {
                    writer
                        .write_sample(sample)
                        .map_err(|e| ResolveError::Transcode(e.to_string()))?;
                }
            }
            writer
                .finalize()
                .map_err(|e| ResolveError::Transcode(e.to_string()))?;
        }
        Ok(Self {
            input: Input::from(buf),
        })
    }
}

#[mockall::automock]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Obtain a live byte stream for the given track, or fail with a
    /// classified error. Never retried by callers; a failed track is dropped.
    async fn resolve(&self, track: &Track) -> Result<ResolvedSource, ResolveError>;

    /// Best-effort display metadata for a locator at enqueue time.
    async fn describe(&self, url: &str) -> Result<Track, ResolveError>;

    /// Search path for non-URL queries; returns up to `limit` candidates.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, ResolveError>;
}

/// Production resolver: yt-dlp for platform/generic media, a shared HTTP
/// client for direct files.
pub struct YtDlpResolver {
    http: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn open(&self, mut compose: impl Compose + 'static) -> Result<ResolvedSource, ResolveError> {
        // Create the stream eagerly so failures surface here, in the
        // Preparing state, rather than deep inside the driver.
        let stream = compose.create_async().await.map_err(stream_error)?;
        Ok(ResolvedSource {
            input: Input::Live(LiveInput::Raw(stream), Some(Box::new(compose))),
        })
    }
}

fn stream_error(e: AudioStreamError) -> ResolveError {
    match e {
        AudioStreamError::Unsupported => {
            ResolveError::UnsupportedSource("source container/codec not supported".into())
        }
        AudioStreamError::Fail(inner) => ResolveError::NotFound(inner.to_string()),
        other => ResolveError::Network(other.to_string()),
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, track: &Track) -> Result<ResolvedSource, ResolveError> {
        let url = parse_locator(&track.url)?;
        match classify(&url) {
            SourceKind::DirectFile => {
                self.open(HttpRequest::new(self.http.clone(), track.url.clone()))
                    .await
            }
            SourceKind::PlatformMedia | SourceKind::GenericMedia => {
                self.open(YoutubeDl::new(self.http.clone(), track.url.clone()))
                    .await
            }
        }
    }

    async fn describe(&self, raw: &str) -> Result<Track, ResolveError> {
        let url = parse_locator(raw)?;
        match classify(&url) {
            SourceKind::DirectFile => {
                let title = url
                    .path_segments()
                    .and_then(|mut s| s.next_back())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(raw)
                    .to_string();
                Ok(Track::new(raw, title, None))
            }
            SourceKind::PlatformMedia => {
                let mut ydl = YoutubeDl::new(self.http.clone(), raw.to_string());
                match ydl.aux_metadata().await {
                    Ok(meta) => Ok(Track::new(
                        raw,
                        meta.title.unwrap_or_else(|| raw.to_string()),
                        meta.artist,
                    )),
                    Err(e) => {
                        warn!("metadata probe failed for {raw}: {e}");
                        Ok(Track::from_url(raw))
                    }
                }
            }
            SourceKind::GenericMedia => Ok(Track::from_url(raw)),
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, ResolveError> {
        let mut ydl = YoutubeDl::new_search(self.http.clone(), query.to_string());
        let results = ydl.search(Some(limit)).await.map_err(stream_error)?;

        let tracks: Vec<Track> = results
            .into_iter()
            .filter_map(|meta| {
                let url = meta.source_url?;
                Some(Track::new(
                    url.clone(),
                    meta.title.unwrap_or(url),
                    meta.artist,
                ))
            })
            .take(limit)
            .collect();

        if tracks.is_empty() {
            return Err(ResolveError::NotFound(format!("no results for '{query}'")));
        }
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: &str) -> SourceKind {
        classify(&Url::parse(raw).unwrap())
    }

    #[test]
    fn classifies_youtube_watch_urls_as_platform() {
        assert_eq!(
            kind("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            SourceKind::PlatformMedia
        );
        assert_eq!(
            kind("https://music.youtube.com/watch?v=abc123"),
            SourceKind::PlatformMedia
        );
        assert_eq!(kind("https://youtu.be/dQw4w9WgXcQ"), SourceKind::PlatformMedia);
    }

    #[test]
    fn youtube_non_watch_paths_are_generic() {
        assert_eq!(
            kind("https://www.youtube.com/playlist?list=PL123"),
            SourceKind::GenericMedia
        );
    }

    #[test]
    fn classifies_audio_file_extensions_as_direct() {
        assert_eq!(kind("https://host.example/some/song.mp3"), SourceKind::DirectFile);
        assert_eq!(kind("http://host.example/a.FLAC"), SourceKind::DirectFile);
        assert_eq!(kind("https://host.example/tune.ogg?token=1"), SourceKind::DirectFile);
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(
            kind("https://soundcloud.example/artist/track"),
            SourceKind::GenericMedia
        );
    }

    #[test]
    fn rejects_non_http_locators() {
        assert!(parse_locator("file:///etc/passwd").is_err());
        assert!(parse_locator("not a url at all").is_err());
        assert!(parse_locator("ftp://host/file.mp3").is_err());
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_locator("http://host.example/x.mp3").is_ok());
        assert!(parse_locator("https://host.example/x").is_ok());
    }

    #[test]
    fn test_tone_builds_a_source() {
        assert!(ResolvedSource::test_tone(440.0, 1).is_ok());
        assert!(ResolvedSource::test_tone(880.0, 2).is_ok());
    }
}
