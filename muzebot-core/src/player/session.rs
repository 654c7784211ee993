//! Per-guild player session: the state machine that owns the queue, the
//! current track, and the hand-off to the voice transport.
//!
//! One session exists per guild with an active (or stopped) player; all
//! mutation is funneled through the player service loop, so session methods
//! never interleave with each other. The only suspension points are the
//! resolver and transport calls.

use std::sync::Arc;

use tracing::{debug, info, warn};
use twilight_model::id::Id;
use twilight_model::id::marker::GuildMarker;

use muzebot_common::models::{LoopMode, PlayerStateKind, Track};

use crate::eventbus::{BotEvent, EventBus};
use crate::player::queue::PlayQueue;
use crate::player::transport::{AudioTransport, TransportEventKind};
use crate::resolver::{ResolvedSource, Resolver};
use crate::services::notifier::Notifier;

pub struct PlayerSession {
    guild_id: Id<GuildMarker>,
    queue: PlayQueue,
    state: PlayerStateKind,
    /// Monotonic stamp for transport hand-offs. Bumped on every new playback
    /// and on stop, so completion events for an older hand-off are ignored
    /// instead of double-advancing the queue.
    generation: u64,
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn AudioTransport>,
    notifier: Arc<dyn Notifier>,
    event_bus: Arc<EventBus>,
}

impl PlayerSession {
    pub fn new(
        guild_id: Id<GuildMarker>,
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn AudioTransport>,
        notifier: Arc<dyn Notifier>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            guild_id,
            queue: PlayQueue::new(),
            state: PlayerStateKind::Idle,
            generation: 0,
            resolver,
            transport,
            notifier,
            event_bus,
        }
    }

    pub fn enqueue(&mut self, track: Track) {
        debug!("guild {}: enqueued '{}'", self.guild_id, track.title);
        self.queue.enqueue(track);
    }

    /// True while a track is being prepared or played. A new `play` on an
    /// inactive session (idle or stopped) re-kicks the machine.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            PlayerStateKind::Preparing | PlayerStateKind::Playing
        )
    }

    pub fn state(&self) -> PlayerStateKind {
        self.state
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.queue.tracks()
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.queue.current().cloned()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.queue.loop_mode()
    }

    pub async fn set_loop_mode(&mut self, mode: LoopMode) {
        self.queue.set_loop_mode(mode);
        self.notifier.controls_changed(self.guild_id, mode).await;
    }

    pub fn shuffle(&mut self) {
        let mut rng = rand::rng();
        self.queue.shuffle(&mut rng);
    }

    /// Pop the next track (loop policy applied), resolve it, and hand it to
    /// the transport. A resolve or hand-off failure drops the offending
    /// track, reports it, and immediately tries the next one, so a broken
    /// locator can never stall the player.
    pub async fn advance(&mut self) {
        loop {
            let Some(track) = self.queue.next_track() else {
                self.state = PlayerStateKind::Idle;
                // orphan any completion still in flight for the last track
                self.generation += 1;
                info!("guild {}: queue empty, going idle", self.guild_id);
                self.notifier.queue_empty(self.guild_id).await;
                if let Err(e) = self.transport.leave(self.guild_id).await {
                    debug!("guild {}: leave after drain: {e}", self.guild_id);
                }
                self.event_bus
                    .publish(BotEvent::QueueEmptied {
                        guild_id: self.guild_id.get(),
                    })
                    .await;
                return;
            };

            self.state = PlayerStateKind::Preparing;
            debug!("guild {}: resolving '{}'", self.guild_id, track.url);

            let source = match self.resolver.resolve(&track).await {
                Ok(source) => source,
                Err(e) => {
                    self.report_failure(&track, &e.to_string()).await;
                    self.queue.drop_current();
                    continue;
                }
            };

            self.generation += 1;
            match self
                .transport
                .play(self.guild_id, source, self.generation)
                .await
            {
                Ok(()) => {
                    self.state = PlayerStateKind::Playing;
                    info!("guild {}: now playing '{}'", self.guild_id, track.title);
                    self.notifier
                        .track_changed(self.guild_id, &track, self.queue.loop_mode())
                        .await;
                    self.event_bus
                        .publish(BotEvent::TrackStarted {
                            guild_id: self.guild_id.get(),
                            title: track.title.clone(),
                            loop_mode: self.queue.loop_mode(),
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    self.report_failure(&track, &e.to_string()).await;
                    self.queue.drop_current();
                    continue;
                }
            }
        }
    }

    /// Transport completion/failure callback, routed here with the guild id
    /// and generation stamp from the event payload. Stale stamps are dropped.
    pub async fn handle_transport_event(&mut self, generation: u64, kind: TransportEventKind) {
        if generation != self.generation {
            debug!(
                "guild {}: stale transport event (gen {generation}, current {}), ignoring",
                self.guild_id, self.generation
            );
            return;
        }
        match kind {
            TransportEventKind::Ended => self.advance().await,
            TransportEventKind::Errored(message) => {
                let track = self.queue.current().cloned();
                let label = track.as_ref().map(|t| t.title.as_str()).unwrap_or("<none>");
                warn!("guild {}: playback failed for '{label}': {message}", self.guild_id);
                self.notifier
                    .error(self.guild_id, &format!("Playback failed for **{label}**: {message}"))
                    .await;
                self.event_bus
                    .publish(BotEvent::TrackFailed {
                        guild_id: self.guild_id.get(),
                        message,
                    })
                    .await;
                self.queue.drop_current();
                self.advance().await;
            }
        }
    }

    /// Stop the current track; its `Ended` event drives the actual advance,
    /// mirroring a natural completion (loop policy applies, so skipping
    /// under loop-track replays the same track).
    pub async fn skip(&mut self) {
        if self.state != PlayerStateKind::Playing {
            return;
        }
        if let Err(e) = self.transport.stop(self.guild_id).await {
            // no end event will come; advance directly
            warn!("guild {}: stop for skip failed: {e}", self.guild_id);
            self.advance().await;
        }
    }

    /// Explicit user stop: clear everything and tear the voice session down.
    pub async fn stop(&mut self) {
        self.queue.clear();
        self.generation += 1;
        if let Err(e) = self.transport.stop(self.guild_id).await {
            debug!("guild {}: transport stop: {e}", self.guild_id);
        }
        if let Err(e) = self.transport.leave(self.guild_id).await {
            debug!("guild {}: transport leave: {e}", self.guild_id);
        }
        self.notifier.stopped(self.guild_id).await;
        self.state = PlayerStateKind::Stopped;
        info!("guild {}: player stopped and queue cleared", self.guild_id);
    }

    pub async fn pause(&mut self) -> Result<(), muzebot_common::Error> {
        self.transport.pause(self.guild_id).await
    }

    pub async fn resume(&mut self) -> Result<(), muzebot_common::Error> {
        self.transport.resume(self.guild_id).await
    }

    /// Feed a pre-built source (the test tone) straight to the transport,
    /// bypassing the queue. When it ends, the regular completion path runs
    /// and the queue takes over.
    pub async fn play_source(&mut self, source: ResolvedSource) -> Result<(), muzebot_common::Error> {
        self.generation += 1;
        self.transport
            .play(self.guild_id, source, self.generation)
            .await?;
        self.state = PlayerStateKind::Playing;
        Ok(())
    }

    async fn report_failure(&self, track: &Track, message: &str) {
        warn!(
            "guild {}: dropping '{}' ({message})",
            self.guild_id, track.url
        );
        self.notifier
            .error(
                self.guild_id,
                &format!("Could not play **{}**: {message}", track.title),
            )
            .await;
        self.event_bus
            .publish(BotEvent::TrackFailed {
                guild_id: self.guild_id.get(),
                message: message.to_string(),
            })
            .await;
    }
}
