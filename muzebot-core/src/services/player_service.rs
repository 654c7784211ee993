//! The player service loop.
//!
//! One task owns every guild's `PlayerSession` and is the only place that
//! mutates them: dispatcher commands and transport completion events are
//! funneled into the same loop over channels and processed to completion
//! one at a time. Queries reply over oneshot channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};

use muzebot_common::error::Error;
use muzebot_common::models::{LoopMode, Track};

use crate::eventbus::EventBus;
use crate::player::session::PlayerSession;
use crate::player::transport::{AudioTransport, TransportEvent};
use crate::resolver::{ResolvedSource, Resolver};
use crate::services::notifier::Notifier;

/// Commands and queries accepted by the player service.
pub enum PlayerMessage {
    Play {
        guild_id: Id<GuildMarker>,
        track: Track,
        /// Voice channel of the requesting user, if any; required to start
        /// playback on an inactive session.
        voice_channel: Option<Id<ChannelMarker>>,
        reply: oneshot::Sender<PlayOutcome>,
    },
    TestSound {
        guild_id: Id<GuildMarker>,
        voice_channel: Option<Id<ChannelMarker>>,
        reply: oneshot::Sender<PlayOutcome>,
    },
    Skip {
        guild_id: Id<GuildMarker>,
    },
    Stop {
        guild_id: Id<GuildMarker>,
    },
    Pause {
        guild_id: Id<GuildMarker>,
    },
    Resume {
        guild_id: Id<GuildMarker>,
    },
    SetLoop {
        guild_id: Id<GuildMarker>,
        mode: LoopMode,
    },
    ToggleLoop {
        guild_id: Id<GuildMarker>,
        which: LoopMode,
        reply: oneshot::Sender<LoopMode>,
    },
    Shuffle {
        guild_id: Id<GuildMarker>,
    },
    ListQueue {
        guild_id: Id<GuildMarker>,
        reply: oneshot::Sender<Vec<Track>>,
    },
    NowPlaying {
        guild_id: Id<GuildMarker>,
        reply: oneshot::Sender<Option<Track>>,
    },
    /// The bot's voice channel lost its last human listener.
    VoiceChannelEmpty {
        guild_id: Id<GuildMarker>,
    },
}

#[derive(Debug, Clone)]
pub enum PlayOutcome {
    /// Playback kicked off; the now-playing message follows separately.
    Started(Track),
    /// Something is already playing; the track waits in the queue.
    Queued(Track),
    /// The requester is not in a voice channel, so there is nowhere to play.
    NoVoiceChannel,
    Failed(String),
}

/// Cloneable front door to the player service loop.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<PlayerMessage>,
}

impl PlayerHandle {
    fn send(&self, msg: PlayerMessage) -> Result<(), Error> {
        self.tx
            .send(msg)
            .map_err(|_| Error::EventBus("player service is gone".to_string()))
    }

    pub async fn play(
        &self,
        guild_id: Id<GuildMarker>,
        track: Track,
        voice_channel: Option<Id<ChannelMarker>>,
    ) -> Result<PlayOutcome, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMessage::Play {
            guild_id,
            track,
            voice_channel,
            reply,
        })?;
        rx.await
            .map_err(|_| Error::EventBus("player service dropped the reply".to_string()))
    }

    pub async fn test_sound(
        &self,
        guild_id: Id<GuildMarker>,
        voice_channel: Option<Id<ChannelMarker>>,
    ) -> Result<PlayOutcome, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMessage::TestSound {
            guild_id,
            voice_channel,
            reply,
        })?;
        rx.await
            .map_err(|_| Error::EventBus("player service dropped the reply".to_string()))
    }

    pub fn skip(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.send(PlayerMessage::Skip { guild_id })
    }

    pub fn stop(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.send(PlayerMessage::Stop { guild_id })
    }

    pub fn pause(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.send(PlayerMessage::Pause { guild_id })
    }

    pub fn resume(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.send(PlayerMessage::Resume { guild_id })
    }

    pub fn set_loop(&self, guild_id: Id<GuildMarker>, mode: LoopMode) -> Result<(), Error> {
        self.send(PlayerMessage::SetLoop { guild_id, mode })
    }

    pub async fn toggle_loop(
        &self,
        guild_id: Id<GuildMarker>,
        which: LoopMode,
    ) -> Result<LoopMode, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMessage::ToggleLoop {
            guild_id,
            which,
            reply,
        })?;
        rx.await
            .map_err(|_| Error::EventBus("player service dropped the reply".to_string()))
    }

    pub fn shuffle(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.send(PlayerMessage::Shuffle { guild_id })
    }

    pub async fn list_queue(&self, guild_id: Id<GuildMarker>) -> Result<Vec<Track>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMessage::ListQueue { guild_id, reply })?;
        rx.await
            .map_err(|_| Error::EventBus("player service dropped the reply".to_string()))
    }

    pub async fn now_playing(&self, guild_id: Id<GuildMarker>) -> Result<Option<Track>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerMessage::NowPlaying { guild_id, reply })?;
        rx.await
            .map_err(|_| Error::EventBus("player service dropped the reply".to_string()))
    }

    pub fn voice_channel_empty(&self, guild_id: Id<GuildMarker>) -> Result<(), Error> {
        self.send(PlayerMessage::VoiceChannelEmpty { guild_id })
    }
}

pub struct PlayerService {
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn AudioTransport>,
    notifier: Arc<dyn Notifier>,
    event_bus: Arc<EventBus>,
    sessions: HashMap<Id<GuildMarker>, PlayerSession>,
    command_rx: mpsc::UnboundedReceiver<PlayerMessage>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl PlayerService {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn AudioTransport>,
        notifier: Arc<dyn Notifier>,
        event_bus: Arc<EventBus>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (PlayerHandle, Self) {
        let (tx, command_rx) = mpsc::unbounded_channel();
        let service = Self {
            resolver,
            transport,
            notifier,
            event_bus,
            sessions: HashMap::new(),
            command_rx,
            transport_rx,
        };
        (PlayerHandle { tx }, service)
    }

    /// Run until shutdown is signalled on the event bus or every sender is
    /// dropped.
    pub async fn run(mut self) {
        info!("(PlayerService) started.");
        let mut shutdown_rx = self.event_bus.shutdown_rx.clone();
        loop {
            tokio::select! {
                maybe_msg = self.command_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                }
                maybe_evt = self.transport_rx.recv() => {
                    match maybe_evt {
                        Some(evt) => self.handle_transport_event(evt).await,
                        None => break,
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("(PlayerService) shutdown signal received");
                        break;
                    }
                }
            }
        }
        info!("(PlayerService) loop ended.");
    }

    fn session_mut(&mut self, guild_id: Id<GuildMarker>) -> &mut PlayerSession {
        self.sessions.entry(guild_id).or_insert_with(|| {
            PlayerSession::new(
                guild_id,
                self.resolver.clone(),
                self.transport.clone(),
                self.notifier.clone(),
                self.event_bus.clone(),
            )
        })
    }

    async fn handle_message(&mut self, msg: PlayerMessage) {
        match msg {
            PlayerMessage::Play {
                guild_id,
                track,
                voice_channel,
                reply,
            } => {
                let session = self.session_mut(guild_id);
                session.enqueue(track.clone());
                if session.is_active() {
                    let _ = reply.send(PlayOutcome::Queued(track));
                    return;
                }
                let Some(channel_id) = voice_channel else {
                    let _ = reply.send(PlayOutcome::NoVoiceChannel);
                    return;
                };
                if let Err(e) = self.transport.join(guild_id, channel_id).await {
                    warn!("guild {guild_id}: voice join failed: {e}");
                    let _ = reply.send(PlayOutcome::Failed(format!(
                        "could not join the voice channel: {e}"
                    )));
                    return;
                }
                let _ = reply.send(PlayOutcome::Started(track));
                self.session_mut(guild_id).advance().await;
            }

            PlayerMessage::TestSound {
                guild_id,
                voice_channel,
                reply,
            } => {
                let Some(channel_id) = voice_channel else {
                    let _ = reply.send(PlayOutcome::NoVoiceChannel);
                    return;
                };
                if let Err(e) = self.transport.join(guild_id, channel_id).await {
                    let _ = reply.send(PlayOutcome::Failed(format!(
                        "could not join the voice channel: {e}"
                    )));
                    return;
                }
                let source = match ResolvedSource::test_tone(440.0, 2) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = reply.send(PlayOutcome::Failed(e.to_string()));
                        return;
                    }
                };
                let outcome = match self.session_mut(guild_id).play_source(source).await {
                    Ok(()) => PlayOutcome::Started(Track::new(
                        "https://localhost/test-tone",
                        "440 Hz test tone",
                        None,
                    )),
                    Err(e) => PlayOutcome::Failed(e.to_string()),
                };
                let _ = reply.send(outcome);
            }

            PlayerMessage::Skip { guild_id } => {
                if let Some(session) = self.sessions.get_mut(&guild_id) {
                    session.skip().await;
                }
            }

            PlayerMessage::Stop { guild_id } => {
                if let Some(session) = self.sessions.get_mut(&guild_id) {
                    session.stop().await;
                }
            }

            PlayerMessage::Pause { guild_id } => {
                if let Some(session) = self.sessions.get_mut(&guild_id) {
                    if let Err(e) = session.pause().await {
                        debug!("guild {guild_id}: pause: {e}");
                    }
                }
            }

            PlayerMessage::Resume { guild_id } => {
                if let Some(session) = self.sessions.get_mut(&guild_id) {
                    if let Err(e) = session.resume().await {
                        debug!("guild {guild_id}: resume: {e}");
                    }
                }
            }

            PlayerMessage::SetLoop { guild_id, mode } => {
                self.session_mut(guild_id).set_loop_mode(mode).await;
            }

            PlayerMessage::ToggleLoop {
                guild_id,
                which,
                reply,
            } => {
                let session = self.session_mut(guild_id);
                let new_mode = if session.loop_mode() == which {
                    LoopMode::Off
                } else {
                    which
                };
                session.set_loop_mode(new_mode).await;
                let _ = reply.send(new_mode);
            }

            PlayerMessage::Shuffle { guild_id } => {
                self.session_mut(guild_id).shuffle();
            }

            PlayerMessage::ListQueue { guild_id, reply } => {
                let tracks = self
                    .sessions
                    .get(&guild_id)
                    .map(|s| s.tracks())
                    .unwrap_or_default();
                let _ = reply.send(tracks);
            }

            PlayerMessage::NowPlaying { guild_id, reply } => {
                let current = self.sessions.get(&guild_id).and_then(|s| s.now_playing());
                let _ = reply.send(current);
            }

            PlayerMessage::VoiceChannelEmpty { guild_id } => {
                let active = self
                    .sessions
                    .get(&guild_id)
                    .map(|s| s.is_active())
                    .unwrap_or(false);
                if active {
                    info!("guild {guild_id}: voice channel emptied, stopping player");
                    self.notifier.voice_empty(guild_id).await;
                    if let Some(session) = self.sessions.get_mut(&guild_id) {
                        session.stop().await;
                    }
                }
            }
        }
    }

    async fn handle_transport_event(&mut self, evt: TransportEvent) {
        match self.sessions.get_mut(&evt.guild_id) {
            Some(session) => {
                session
                    .handle_transport_event(evt.generation, evt.kind)
                    .await;
            }
            None => {
                debug!(
                    "guild {}: transport event for unknown session ignored",
                    evt.guild_id
                );
            }
        }
    }
}
