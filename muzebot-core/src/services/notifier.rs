//! Now-playing status messages and player notifications.
//!
//! The player session talks to a `Notifier` trait; the Discord
//! implementation renders embeds with a button control row, keeping one
//! status message per guild (the previous one is deleted when the track
//! changes). All delivery is best-effort: a failed send is logged and
//! never propagated into the player.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use twilight_http::Client as HttpClient;
use twilight_model::channel::message::EmojiReactionType;
use twilight_model::channel::message::component::{ActionRow, Button, ButtonStyle, Component};
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, MessageMarker};
use twilight_util::builder::embed::{EmbedBuilder, EmbedFieldBuilder, EmbedFooterBuilder};

use muzebot_common::models::{LoopMode, Track};

#[mockall::automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A new track reached the transport: render/replace the status message.
    async fn track_changed(&self, guild_id: Id<GuildMarker>, track: &Track, mode: LoopMode);

    /// The queue ran dry; the bot is leaving the voice channel.
    async fn queue_empty(&self, guild_id: Id<GuildMarker>);

    /// The voice channel has no human listeners left.
    async fn voice_empty(&self, guild_id: Id<GuildMarker>);

    /// Explicit user stop: tear down the status message.
    async fn stopped(&self, guild_id: Id<GuildMarker>);

    /// One-line failure report (resolve or playback).
    async fn error(&self, guild_id: Id<GuildMarker>, message: &str);

    /// Loop mode was toggled; re-render the control row.
    async fn controls_changed(&self, guild_id: Id<GuildMarker>, mode: LoopMode);
}

/// Build the control row under the now-playing message. The loop button
/// doubles as an indicator: green + single-loop emoji while loop-track is on.
pub fn control_row(mode: LoopMode) -> Component {
    let loop_track_on = mode == LoopMode::Track;
    Component::ActionRow(ActionRow {
        components: vec![
            emoji_button("pause", "⏸️", ButtonStyle::Secondary),
            emoji_button("resume", "▶️", ButtonStyle::Success),
            emoji_button("skip", "⏭️", ButtonStyle::Primary),
            emoji_button("stop", "⏹️", ButtonStyle::Danger),
            emoji_button(
                "loop_track",
                if loop_track_on { "🔂" } else { "🔁" },
                if loop_track_on {
                    ButtonStyle::Success
                } else {
                    ButtonStyle::Secondary
                },
            ),
        ],
    })
}

fn emoji_button(id: &str, emoji: &str, style: ButtonStyle) -> Component {
    Component::Button(Button {
        custom_id: Some(id.to_string()),
        disabled: false,
        emoji: Some(EmojiReactionType::Unicode {
            name: emoji.to_string(),
        }),
        label: None,
        style,
        url: None,
        sku_id: None,
    })
}

struct StatusMessage {
    channel_id: Id<ChannelMarker>,
    message_id: Id<MessageMarker>,
    track: Track,
}

pub struct DiscordNotifier {
    http: Arc<HttpClient>,
    /// Last text channel a command was issued from, per guild. Player
    /// notifications go there.
    text_channels: DashMap<Id<GuildMarker>, Id<ChannelMarker>>,
    status_messages: DashMap<Id<GuildMarker>, StatusMessage>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            text_channels: DashMap::new(),
            status_messages: DashMap::new(),
        }
    }

    /// Record where player notifications for this guild should go.
    /// Called by the command dispatcher on every inbound command.
    pub fn set_text_channel(&self, guild_id: Id<GuildMarker>, channel_id: Id<ChannelMarker>) {
        self.text_channels.insert(guild_id, channel_id);
    }

    fn text_channel(&self, guild_id: Id<GuildMarker>) -> Option<Id<ChannelMarker>> {
        self.text_channels.get(&guild_id).map(|c| *c)
    }

    async fn send_line(&self, guild_id: Id<GuildMarker>, content: &str) {
        let Some(channel_id) = self.text_channel(guild_id) else {
            debug!("guild {guild_id}: no text channel recorded, dropping '{content}'");
            return;
        };
        if let Err(e) = self.http.create_message(channel_id).content(content).await {
            warn!("guild {guild_id}: failed to send notification: {e}");
        }
    }

    async fn delete_status_message(&self, guild_id: Id<GuildMarker>) {
        if let Some((_, status)) = self.status_messages.remove(&guild_id) {
            if let Err(e) = self
                .http
                .delete_message(status.channel_id, status.message_id)
                .await
            {
                debug!("guild {guild_id}: could not delete old status message: {e}");
            }
        }
    }

    async fn post_status_message(
        &self,
        guild_id: Id<GuildMarker>,
        track: &Track,
        mode: LoopMode,
    ) {
        let Some(channel_id) = self.text_channel(guild_id) else {
            debug!("guild {guild_id}: no text channel recorded for status message");
            return;
        };

        let mut embed = EmbedBuilder::new()
            .title("🎶 Now playing")
            .description(format!("[{}]({})", track.title, track.url))
            .color(0x1DB954)
            .footer(EmbedFooterBuilder::new("MuzeBot").build());
        if let Some(artist) = &track.artist {
            embed = embed.field(EmbedFieldBuilder::new("Artist", artist.clone()).inline());
        }
        let embed = embed.build();

        let row = control_row(mode);
        let sent = self
            .http
            .create_message(channel_id)
            .embeds(&[embed])
            .components(&[row])
            .await;

        match sent {
            Ok(response) => match response.model().await {
                Ok(message) => {
                    self.status_messages.insert(
                        guild_id,
                        StatusMessage {
                            channel_id,
                            message_id: message.id,
                            track: track.clone(),
                        },
                    );
                }
                Err(e) => warn!("guild {guild_id}: could not read back status message: {e}"),
            },
            Err(e) => warn!("guild {guild_id}: failed to post status message: {e}"),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn track_changed(&self, guild_id: Id<GuildMarker>, track: &Track, mode: LoopMode) {
        self.delete_status_message(guild_id).await;
        self.post_status_message(guild_id, track, mode).await;
    }

    async fn queue_empty(&self, guild_id: Id<GuildMarker>) {
        self.delete_status_message(guild_id).await;
        self.send_line(guild_id, "Queue is empty, disconnecting.").await;
    }

    async fn voice_empty(&self, guild_id: Id<GuildMarker>) {
        self.delete_status_message(guild_id).await;
        self.send_line(guild_id, "Voice channel is empty, disconnecting.")
            .await;
    }

    async fn stopped(&self, guild_id: Id<GuildMarker>) {
        self.delete_status_message(guild_id).await;
    }

    async fn error(&self, guild_id: Id<GuildMarker>, message: &str) {
        self.send_line(guild_id, &format!("⚠️ {message}")).await;
    }

    async fn controls_changed(&self, guild_id: Id<GuildMarker>, mode: LoopMode) {
        // repost with the current track; edits do not refresh the row emoji
        let track = self
            .status_messages
            .get(&guild_id)
            .map(|s| s.track.clone());
        if let Some(track) = track {
            self.delete_status_message(guild_id).await;
            self.post_status_message(guild_id, &track, mode).await;
        }
    }
}
