//! Parses prefixed chat commands and button interactions, and turns them
//! into player operations. Thin glue: all queue/player semantics live
//! behind the `PlayerHandle`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use twilight_cache_inmemory::InMemoryCache;
use twilight_http::Client as HttpClient;
use twilight_model::channel::message::MessageFlags;
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle, Component};
use twilight_model::http::interaction::{InteractionResponse, InteractionResponseType};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};
use twilight_util::builder::InteractionResponseDataBuilder;
use twilight_util::builder::embed::EmbedBuilder;

use muzebot_common::error::Error;
use muzebot_common::models::{LoopMode, Track};

use crate::eventbus::EventBus;
use crate::platforms::discord::runtime::{DiscordInteractionEvent, DiscordMessageEvent};
use crate::resolver::Resolver;
use crate::services::lyrics::LyricsClient;
use crate::services::notifier::DiscordNotifier;
use crate::services::player_service::{PlayOutcome, PlayerHandle};

/// How long numbered search-result buttons stay valid.
const SEARCH_PICK_TIMEOUT: Duration = Duration::from_secs(15);

/// Discord caps messages at 2000 chars; leave headroom for formatting.
const REPLY_CHUNK_LEN: usize = 1900;

struct PendingSearch {
    created: Instant,
    results: Vec<Track>,
}

pub struct CommandService {
    prefix: String,
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    player: PlayerHandle,
    resolver: Arc<dyn Resolver>,
    notifier: Arc<DiscordNotifier>,
    lyrics: LyricsClient,
    event_bus: Arc<EventBus>,
    /// Outstanding `!search` result sets, keyed by who may pick from them.
    pending_picks: DashMap<(Id<GuildMarker>, Id<UserMarker>), PendingSearch>,
}

impl CommandService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prefix: impl Into<String>,
        http: Arc<HttpClient>,
        cache: Arc<InMemoryCache>,
        player: PlayerHandle,
        resolver: Arc<dyn Resolver>,
        notifier: Arc<DiscordNotifier>,
        lyrics: LyricsClient,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            http,
            cache,
            player,
            resolver,
            notifier,
            lyrics,
            event_bus,
            pending_picks: DashMap::new(),
        }
    }

    /// Processes one inbound chat message. Non-commands are ignored.
    pub async fn handle_chat_line(&self, msg: DiscordMessageEvent) -> Result<(), Error> {
        let text = msg.text.trim();
        if !text.starts_with(self.prefix.as_str()) {
            return Ok(());
        }

        let parts: Vec<&str> = text.split_whitespace().collect();
        let cmd = parts[0]
            .trim_start_matches(self.prefix.as_str())
            .to_lowercase();
        let args = if parts.len() > 1 {
            parts[1..].join(" ")
        } else {
            String::new()
        };
        debug!("guild {}: command '{cmd}', args '{args}'", msg.guild_id);

        // player notifications follow the channel the user last spoke in
        self.notifier.set_text_channel(msg.guild_id, msg.channel_id);
        self.event_bus
            .publish_chat(&msg.channel_id.to_string(), &msg.username, text)
            .await;

        match cmd.as_str() {
            "play" => self.cmd_play(&msg, &args).await?,
            "search" => self.cmd_search(&msg, &args).await?,
            "queue" => self.cmd_queue(&msg).await?,
            "nowplaying" => self.cmd_now_playing(&msg).await?,
            "shuffle" => {
                self.player.shuffle(msg.guild_id)?;
                self.reply(msg.channel_id, "Queue shuffled.").await?;
            }
            "loop" => self.cmd_loop(&msg, &args).await?,
            "lyrics" => self.cmd_lyrics(&msg).await?,
            "skip" => {
                self.player.skip(msg.guild_id)?;
                self.reply(msg.channel_id, "Skipped.").await?;
            }
            "stop" => {
                self.player.stop(msg.guild_id)?;
                self.reply(msg.channel_id, "Stopped and cleared the queue.")
                    .await?;
            }
            "pause" => {
                self.player.pause(msg.guild_id)?;
                self.reply(msg.channel_id, "Paused.").await?;
            }
            "resume" => {
                self.player.resume(msg.guild_id)?;
                self.reply(msg.channel_id, "Resuming.").await?;
            }
            "testsound" => self.cmd_test_sound(&msg).await?,
            _ => debug!("unknown command '{cmd}' ignored"),
        }
        Ok(())
    }

    /// Processes a button press from the control row, a search pick, or any
    /// other component interaction.
    pub async fn handle_interaction(&self, evt: DiscordInteractionEvent) -> Result<(), Error> {
        let guild_id = evt.guild_id;
        match evt.custom_id.as_str() {
            "pause" => {
                self.player.pause(guild_id)?;
                self.respond_ephemeral(&evt, "Paused.").await?;
            }
            "resume" => {
                self.player.resume(guild_id)?;
                self.respond_ephemeral(&evt, "Resuming.").await?;
            }
            "skip" => {
                self.player.skip(guild_id)?;
                self.respond_ephemeral(&evt, "Skipped.").await?;
            }
            "stop" => {
                self.player.stop(guild_id)?;
                self.respond_ephemeral(&evt, "Stopped and disconnected.").await?;
            }
            "loop_track" => {
                let mode = self.player.toggle_loop(guild_id, LoopMode::Track).await?;
                let line = if mode == LoopMode::Track {
                    "Track loop enabled."
                } else {
                    "Track loop disabled."
                };
                self.respond_ephemeral(&evt, line).await?;
            }
            "loop_queue" => {
                let mode = self.player.toggle_loop(guild_id, LoopMode::Queue).await?;
                let line = if mode == LoopMode::Queue {
                    "Queue loop enabled."
                } else {
                    "Queue loop disabled."
                };
                self.respond_ephemeral(&evt, line).await?;
            }
            "shuffle" => {
                self.player.shuffle(guild_id)?;
                self.respond_ephemeral(&evt, "Queue shuffled.").await?;
            }
            id if id.starts_with("pick_") => {
                let index: usize = id
                    .trim_start_matches("pick_")
                    .parse()
                    .map_err(|_| Error::Parse(format!("bad pick id '{id}'")))?;
                self.handle_pick(&evt, index).await?;
            }
            other => debug!("unhandled interaction '{other}'"),
        }
        Ok(())
    }

    async fn cmd_play(&self, msg: &DiscordMessageEvent, args: &str) -> Result<(), Error> {
        let query = args.trim();
        if query.is_empty() {
            self.reply(msg.channel_id, &format!("Usage: {}play <url or search terms>", self.prefix))
                .await?;
            return Ok(());
        }

        let track = if query.starts_with("http://") || query.starts_with("https://") {
            match self.resolver.describe(query).await {
                Ok(track) => track,
                Err(e) => {
                    // malformed or unsupported locator: report, never enqueue
                    self.reply(msg.channel_id, &format!("Cannot play that link: {e}"))
                        .await?;
                    return Ok(());
                }
            }
        } else {
            match self.resolver.search(query, 1).await {
                Ok(mut results) => results.remove(0),
                Err(e) => {
                    debug!("search for '{query}' failed: {e}");
                    self.reply(msg.channel_id, "Nothing found.").await?;
                    return Ok(());
                }
            }
        };

        let voice_channel = self.user_voice_channel(msg.guild_id, msg.user_id);
        let outcome = self
            .player
            .play(msg.guild_id, track, voice_channel)
            .await?;
        self.reply_play_outcome(msg.channel_id, outcome).await
    }

    async fn cmd_search(&self, msg: &DiscordMessageEvent, args: &str) -> Result<(), Error> {
        let query = args.trim();
        if query.is_empty() {
            self.reply(msg.channel_id, &format!("Usage: {}search <search terms>", self.prefix))
                .await?;
            return Ok(());
        }

        let results = match self.resolver.search(query, 5).await {
            Ok(results) => results,
            Err(e) => {
                debug!("search for '{query}' failed: {e}");
                self.reply(msg.channel_id, "Nothing found.").await?;
                return Ok(());
            }
        };

        let listing = results
            .iter()
            .enumerate()
            .map(|(i, t)| format!("**{}.** [{}]({})", i + 1, t.title, t.url))
            .collect::<Vec<_>>()
            .join("\n");
        let embed = EmbedBuilder::new()
            .title("Search results")
            .description(listing)
            .color(0x7289DA)
            .build();

        let buttons: Vec<Component> = results
            .iter()
            .enumerate()
            .map(|(i, _)| {
                Component::Button(Button {
                    custom_id: Some(format!("pick_{i}")),
                    disabled: false,
                    emoji: None,
                    label: Some((i + 1).to_string()),
                    style: ButtonStyle::Primary,
                    url: None,
                    sku_id: None,
                })
            })
            .collect();
        let row = Component::ActionRow(ActionRow {
            components: buttons,
        });

        self.pending_picks.insert(
            (msg.guild_id, msg.user_id),
            PendingSearch {
                created: Instant::now(),
                results,
            },
        );

        self.http
            .create_message(msg.channel_id)
            .embeds(&[embed])
            .components(&[row])
            .await
            .map_err(|e| Error::Platform(format!("Error sending search results: {e:?}")))?;
        Ok(())
    }

    async fn handle_pick(&self, evt: &DiscordInteractionEvent, index: usize) -> Result<(), Error> {
        let Some(user_id) = evt.user_id else {
            debug!("pick interaction without a user, ignoring");
            return Ok(());
        };

        let picked = match self.pending_picks.remove(&(evt.guild_id, user_id)) {
            Some((_, pending)) if pending.created.elapsed() <= SEARCH_PICK_TIMEOUT => {
                pending.results.get(index).cloned()
            }
            Some(_) => None, // expired
            None => None,
        };
        let Some(track) = picked else {
            self.respond_ephemeral(evt, "That search has expired; run the search again.")
                .await?;
            return Ok(());
        };

        let voice_channel = self.user_voice_channel(evt.guild_id, user_id);
        let outcome = self.player.play(evt.guild_id, track, voice_channel).await?;
        let line = match outcome {
            PlayOutcome::Started(track) | PlayOutcome::Queued(track) => {
                format!("Added to queue: **{}**", track.title)
            }
            PlayOutcome::NoVoiceChannel => "Join a voice channel first!".to_string(),
            PlayOutcome::Failed(message) => message,
        };
        self.respond_ephemeral(evt, &line).await
    }

    async fn cmd_queue(&self, msg: &DiscordMessageEvent) -> Result<(), Error> {
        let tracks = self.player.list_queue(msg.guild_id).await?;
        if tracks.is_empty() {
            self.reply(msg.channel_id, "Queue is empty.").await?;
            return Ok(());
        }
        let listing = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. [{}]({})", i + 1, t.title, t.url))
            .collect::<Vec<_>>()
            .join("\n");
        let embed = EmbedBuilder::new()
            .title("Queue")
            .description(listing)
            .color(0x5865F2)
            .build();
        self.http
            .create_message(msg.channel_id)
            .embeds(&[embed])
            .await
            .map_err(|e| Error::Platform(format!("Error sending queue listing: {e:?}")))?;
        Ok(())
    }

    async fn cmd_now_playing(&self, msg: &DiscordMessageEvent) -> Result<(), Error> {
        match self.player.now_playing(msg.guild_id).await? {
            Some(track) => {
                let embed = EmbedBuilder::new()
                    .title("Now playing")
                    .description(format!("[{}]({})", track.title, track.url))
                    .color(0x1DB954)
                    .build();
                self.http
                    .create_message(msg.channel_id)
                    .embeds(&[embed])
                    .await
                    .map_err(|e| Error::Platform(format!("Error sending now-playing: {e:?}")))?;
            }
            None => {
                self.reply(msg.channel_id, "Nothing is playing right now.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn cmd_loop(&self, msg: &DiscordMessageEvent, args: &str) -> Result<(), Error> {
        match args.trim().parse::<LoopMode>() {
            Ok(mode) => {
                self.player.set_loop(msg.guild_id, mode)?;
                self.reply(msg.channel_id, &format!("Loop mode: **{mode}**"))
                    .await?;
            }
            Err(_) => {
                self.reply(
                    msg.channel_id,
                    &format!("Usage: {}loop off | track | queue", self.prefix),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn cmd_lyrics(&self, msg: &DiscordMessageEvent) -> Result<(), Error> {
        let Some(track) = self.player.now_playing(msg.guild_id).await? else {
            self.reply(msg.channel_id, "Nothing is playing right now.")
                .await?;
            return Ok(());
        };

        let query = match &track.artist {
            Some(artist) => format!("{} {}", track.title, artist),
            None => track.title.clone(),
        };
        match self.lyrics.fetch(&query).await {
            Ok(Some(lyrics)) => {
                for chunk in chunk_text(&lyrics, REPLY_CHUNK_LEN) {
                    self.reply(msg.channel_id, chunk).await?;
                }
            }
            Ok(None) => {
                self.reply(msg.channel_id, "No lyrics found.").await?;
            }
            Err(e) => {
                warn!("lyrics lookup failed: {e}");
                self.reply(msg.channel_id, "No lyrics found.").await?;
            }
        }
        Ok(())
    }

    async fn cmd_test_sound(&self, msg: &DiscordMessageEvent) -> Result<(), Error> {
        let voice_channel = self.user_voice_channel(msg.guild_id, msg.user_id);
        let outcome = self.player.test_sound(msg.guild_id, voice_channel).await?;
        let line = match outcome {
            PlayOutcome::Started(_) => "▶️ Playing a test tone in your voice channel!",
            PlayOutcome::NoVoiceChannel => "Join a voice channel first!",
            PlayOutcome::Queued(_) => "Something is already playing.",
            PlayOutcome::Failed(ref message) => message.as_str(),
        };
        self.reply(msg.channel_id, line).await
    }

    fn user_voice_channel(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
    ) -> Option<Id<ChannelMarker>> {
        self.cache
            .voice_state(user_id, guild_id)
            .map(|vs| vs.channel_id())
    }

    async fn reply_play_outcome(
        &self,
        channel_id: Id<ChannelMarker>,
        outcome: PlayOutcome,
    ) -> Result<(), Error> {
        match outcome {
            // the now-playing embed is the reply
            PlayOutcome::Started(_) => Ok(()),
            PlayOutcome::Queued(track) => {
                self.reply(channel_id, &format!("Added to queue: **{}**", track.title))
                    .await
            }
            PlayOutcome::NoVoiceChannel => {
                self.reply(channel_id, "Join a voice channel first!").await
            }
            PlayOutcome::Failed(message) => self.reply(channel_id, &message).await,
        }
    }

    async fn reply(&self, channel_id: Id<ChannelMarker>, content: &str) -> Result<(), Error> {
        self.http
            .create_message(channel_id)
            .content(content)
            .await
            .map_err(|e| Error::Platform(format!("Error sending Discord message: {e:?}")))?;
        Ok(())
    }

    async fn respond_ephemeral(
        &self,
        evt: &DiscordInteractionEvent,
        content: &str,
    ) -> Result<(), Error> {
        let data = InteractionResponseDataBuilder::new()
            .content(content)
            .flags(MessageFlags::EPHEMERAL)
            .build();
        let response = InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(data),
        };
        self.http
            .interaction(evt.application_id)
            .create_response(evt.interaction_id, &evt.token, &response)
            .await
            .map_err(|e| Error::Platform(format!("Error answering interaction: {e:?}")))?;
        Ok(())
    }
}

/// Split text on char boundaries into chunks of at most `max` bytes.
fn chunk_text(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}
