//! voice.rs
//!
//! Songbird-backed implementation of the audio transport: joins voice
//! channels, hands resolved inputs to the driver, and reports track
//! end/error back to the player loop as explicit events carrying the
//! guild id and generation stamp of the hand-off.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{
    Event as SongbirdEvent, EventContext, EventHandler as SongbirdEventHandler, Songbird,
    TrackEvent,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use crate::Error;
use crate::player::transport::{AudioTransport, TransportEvent, TransportEventKind};
use crate::resolver::ResolvedSource;

pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    /// Handle of the track currently playing per guild, for pause/resume/stop.
    handles: DashMap<Id<GuildMarker>, TrackHandle>,
    events_tx: UnboundedSender<TransportEvent>,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>, events_tx: UnboundedSender<TransportEvent>) -> Self {
        Self {
            manager,
            handles: DashMap::new(),
            events_tx,
        }
    }

    fn handle_for(&self, guild_id: Id<GuildMarker>) -> Result<TrackHandle, Error> {
        self.handles
            .get(&guild_id)
            .map(|h| h.clone())
            .ok_or_else(|| Error::Voice("no track is active in this guild".to_string()))
    }
}

#[async_trait]
impl AudioTransport for SongbirdVoice {
    async fn join(
        &self,
        guild_id: Id<GuildMarker>,
        channel_id: Id<ChannelMarker>,
    ) -> Result<(), Error> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map(|_call| ())
            .map_err(|e| Error::Voice(format!("join failed: {e}")))
    }

    async fn play(
        &self,
        guild_id: Id<GuildMarker>,
        source: ResolvedSource,
        generation: u64,
    ) -> Result<(), Error> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| Error::Voice("not connected to a voice channel".to_string()))?;

        let mut handler = call.lock().await;
        let handle = handler.play_only_input(source.input);

        handle
            .add_event(
                SongbirdEvent::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id,
                    generation,
                    tx: self.events_tx.clone(),
                },
            )
            .map_err(|e| Error::Voice(format!("could not attach end handler: {e}")))?;
        handle
            .add_event(
                SongbirdEvent::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    guild_id,
                    generation,
                    tx: self.events_tx.clone(),
                },
            )
            .map_err(|e| Error::Voice(format!("could not attach error handler: {e}")))?;

        self.handles.insert(guild_id, handle);
        Ok(())
    }

    async fn pause(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.handle_for(guild_id)?
            .pause()
            .map_err(|e| Error::Voice(format!("pause failed: {e}")))
    }

    async fn resume(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.handle_for(guild_id)?
            .play()
            .map_err(|e| Error::Voice(format!("resume failed: {e}")))
    }

    async fn stop(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.handle_for(guild_id)?
            .stop()
            .map_err(|e| Error::Voice(format!("stop failed: {e}")))
    }

    async fn leave(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.handles.remove(&guild_id);
        if let Err(e) = self.manager.remove(guild_id).await {
            // already disconnected is fine
            debug!("guild {guild_id}: voice session removal: {e}");
        }
        Ok(())
    }
}

struct TrackEndNotifier {
    guild_id: Id<GuildMarker>,
    generation: u64,
    tx: UnboundedSender<TransportEvent>,
}

#[async_trait]
impl SongbirdEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<SongbirdEvent> {
        let _ = self.tx.send(TransportEvent {
            guild_id: self.guild_id,
            generation: self.generation,
            kind: TransportEventKind::Ended,
        });
        None
    }
}

struct TrackErrorNotifier {
    guild_id: Id<GuildMarker>,
    generation: u64,
    tx: UnboundedSender<TransportEvent>,
}

#[async_trait]
impl SongbirdEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<SongbirdEvent> {
        let mut message = "playback error".to_string();
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if let PlayMode::Errored(e) = &state.playing {
                    message = e.to_string();
                }
            }
        }
        let _ = self.tx.send(TransportEvent {
            guild_id: self.guild_id,
            generation: self.generation,
            kind: TransportEventKind::Errored(message),
        });
        None
    }
}
