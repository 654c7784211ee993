// File: src/player/transport.rs

use async_trait::async_trait;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use crate::resolver::ResolvedSource;
use muzebot_common::error::Error;

/// Emitted by the transport when a handed-off stream finishes or dies.
///
/// The payload carries the session (guild) and the generation stamp of the
/// hand-off explicitly, so a late event cannot be mis-applied to a newer
/// track: the player compares the stamp against its own counter and drops
/// anything stale.
#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub guild_id: Id<GuildMarker>,
    pub generation: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone)]
pub enum TransportEventKind {
    /// The track ended, naturally or via an explicit track stop (skip).
    Ended,
    /// Playback failed mid-stream; treated like "track finished" upstream.
    Errored(String),
}

/// Real-time audio delivery into a voice session. One implementation backed
/// by songbird; mocked in player tests.
#[mockall::automock]
#[async_trait]
pub trait AudioTransport: Send + Sync {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<(), Error>;

    /// Start emitting the resolved stream, replacing whatever was playing.
    /// Completion/failure is reported asynchronously as a `TransportEvent`
    /// stamped with `generation`.
    async fn play(
        &self,
        guild_id: Id<GuildMarker>,
        source: ResolvedSource,
        generation: u64,
    ) -> Result<(), Error>;

    async fn pause(&self, guild_id: Id<GuildMarker>) -> Result<(), Error>;
    async fn resume(&self, guild_id: Id<GuildMarker>) -> Result<(), Error>;

    /// Stop the current track. The transport still emits `Ended` for it.
    async fn stop(&self, guild_id: Id<GuildMarker>) -> Result<(), Error>;

    /// Tear down the voice session entirely.
    async fn leave(&self, guild_id: Id<GuildMarker>) -> Result<(), Error>;
}
