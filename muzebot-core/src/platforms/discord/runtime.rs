use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use songbird::Songbird;
use songbird::shards::TwilightMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway,
    CloseFrame,
    Config,
    Event,
    EventTypeFlags,
    Intents,
    MessageSender,
    Shard,
    StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_model::application::interaction::InteractionData;
use twilight_model::gateway::payload::incoming::{MessageCreate, Ready as ReadyPayload};
use twilight_model::id::Id;
use twilight_model::id::marker::{
    ApplicationMarker, ChannelMarker, GuildMarker, InteractionMarker, UserMarker,
};

use crate::Error;
use crate::platforms::{ConnectionStatus, PlatformAuth, PlatformIntegration};

/// An inbound guild chat message, pared down to what command dispatch needs.
#[derive(Debug, Clone)]
pub struct DiscordMessageEvent {
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub user_id: Id<UserMarker>,
    pub username: String,
    pub text: String,
}

/// A component (button) interaction.
#[derive(Debug, Clone)]
pub struct DiscordInteractionEvent {
    pub application_id: Id<ApplicationMarker>,
    pub interaction_id: Id<InteractionMarker>,
    pub token: String,
    pub guild_id: Id<GuildMarker>,
    pub channel_id: Option<Id<ChannelMarker>>,
    pub user_id: Option<Id<UserMarker>>,
    pub custom_id: String,
}

/// Everything the shard runners forward to the dispatcher.
#[derive(Debug, Clone)]
pub enum DiscordEvent {
    Message(DiscordMessageEvent),
    Interaction(DiscordInteractionEvent),
    /// The bot's voice channel has no human members left.
    VoiceChannelEmpty { guild_id: Id<GuildMarker> },
}

/// The shard runner:
///   - calls `shard.next_event(...)`
///   - updates the in-memory cache and lets songbird see every event
///   - forwards chat/interaction/voice-membership events to `tx`.
async fn shard_runner(
    mut shard: Shard,
    tx: UnboundedSender<DiscordEvent>,
    songbird: Arc<Songbird>,
    cache: Arc<InMemoryCache>,
    bot_user_id: Id<UserMarker>,
) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        match item {
            Ok(event) => {
                cache.update(&event);
                songbird.process(&event).await;

                match &event {
                    Event::Ready(ready) => {
                        let data: &ReadyPayload = ready.as_ref();
                        info!(
                            "Shard {shard_id} => READY as {}#{} (ID={})",
                            data.user.name, data.user.discriminator, data.user.id
                        );
                    }
                    Event::MessageCreate(msg_create) => {
                        let msg: &MessageCreate = msg_create;
                        if msg.author.bot {
                            debug!("Ignoring bot message from {}", msg.author.name);
                            continue;
                        }
                        // players are guild-scoped; DMs have no voice session
                        let Some(guild_id) = msg.guild_id else {
                            trace!("Shard {shard_id} => DM from {} ignored", msg.author.name);
                            continue;
                        };

                        let _ = tx.send(DiscordEvent::Message(DiscordMessageEvent {
                            guild_id,
                            channel_id: msg.channel_id,
                            user_id: msg.author.id,
                            username: msg.author.name.clone(),
                            text: msg.content.clone(),
                        }));
                    }
                    Event::InteractionCreate(inter_create) => {
                        let inter = &inter_create.0;
                        let Some(InteractionData::MessageComponent(data)) = &inter.data else {
                            trace!("Shard {shard_id} => non-component interaction ignored");
                            continue;
                        };
                        let Some(guild_id) = inter.guild_id else {
                            continue;
                        };
                        let _ = tx.send(DiscordEvent::Interaction(DiscordInteractionEvent {
                            application_id: inter.application_id,
                            interaction_id: inter.id,
                            token: inter.token.clone(),
                            guild_id,
                            channel_id: inter.channel.as_ref().map(|c| c.id),
                            user_id: inter.author_id(),
                            custom_id: data.custom_id.clone(),
                        }));
                    }
                    Event::VoiceStateUpdate(update) => {
                        let Some(guild_id) = update.0.guild_id else {
                            continue;
                        };
                        if voice_channel_is_empty(&cache, guild_id, bot_user_id) {
                            debug!("Shard {shard_id} => voice channel empty in guild {guild_id}");
                            let _ = tx.send(DiscordEvent::VoiceChannelEmpty { guild_id });
                        }
                    }
                    _ => {
                        trace!("Shard {shard_id} => unhandled event: {event:?}");
                    }
                }
            }
            Err(err) => {
                error!("Shard {shard_id} => error receiving event: {err:?}");
            }
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// True when the bot sits in a voice channel whose only remaining members
/// are bots. Membership is read from the gateway cache.
fn voice_channel_is_empty(
    cache: &InMemoryCache,
    guild_id: Id<GuildMarker>,
    bot_user_id: Id<UserMarker>,
) -> bool {
    let Some(bot_state) = cache.voice_state(bot_user_id, guild_id) else {
        return false;
    };
    let channel_id = bot_state.channel_id();
    drop(bot_state);

    let Some(states) = cache.voice_channel_states(channel_id) else {
        return true;
    };
    let mut humans = 0usize;
    for state in states {
        let user_id = state.user_id();
        if user_id == bot_user_id {
            continue;
        }
        let is_bot = cache.user(user_id).map(|u| u.bot).unwrap_or(false);
        if !is_bot {
            humans += 1;
        }
    }
    humans == 0
}

/// The Discord platform connection: gateway shards, HTTP client, cache,
/// and the songbird voice manager bridged onto the same shards.
pub struct DiscordPlatform {
    pub token: String,
    pub connection_status: ConnectionStatus,

    /// Receiver for events forwarded by the shard runners. `None` until
    /// `connect()` has been called.
    pub rx: Mutex<Option<UnboundedReceiver<DiscordEvent>>>,

    pub shard_tasks: Vec<JoinHandle<()>>,
    pub shard_senders: Vec<MessageSender>,

    pub http: Option<Arc<HttpClient>>,
    pub cache: Option<Arc<InMemoryCache>>,
    pub songbird: Option<Arc<Songbird>>,
    pub bot_user_id: Option<Id<UserMarker>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            rx: Mutex::new(None),
            shard_tasks: Vec::new(),
            shard_senders: Vec::new(),
            http: None,
            cache: None,
            songbird: None,
            bot_user_id: None,
        }
    }

    /// Callers can `await` the next inbound event. We'll lock `self.rx`,
    /// get the receiver from the Option, then call `.recv()` on it if present.
    pub async fn next_event(&self) -> Option<DiscordEvent> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(r) => r.recv().await,
            None => None,
        }
    }
}

#[async_trait]
impl PlatformAuth for DiscordPlatform {
    async fn authenticate(&mut self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }
        Ok(())
    }
    async fn refresh_auth(&mut self) -> Result<(), Error> {
        Ok(())
    }
    async fn revoke_auth(&mut self) -> Result<(), Error> {
        Ok(())
    }
    async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(!self.token.is_empty())
    }
}

/// Connect, create the event channel, store it in `rx`, and spawn a shard
/// runner per recommended shard.
#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }

        let (tx, rx) = unbounded_channel::<DiscordEvent>();
        {
            let mut guard = self.rx.lock().await;
            *guard = Some(rx);
        }

        // Prepare the Twilight client:
        let http_client = Arc::new(
            ClientBuilder::new()
                .token(self.token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        self.http = Some(http_client.clone());

        // Voice needs our own user id for the songbird bridge:
        let current_user = http_client
            .current_user()
            .await
            .map_err(|e| Error::Platform(format!("current_user error: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("current_user parse error: {e}")))?;
        self.bot_user_id = Some(current_user.id);

        // Prepare the in-memory cache:
        let cache = InMemoryCache::builder()
            .resource_types(
                ResourceType::GUILD
                    | ResourceType::CHANNEL
                    | ResourceType::MESSAGE
                    | ResourceType::VOICE_STATE
                    | ResourceType::USER,
            )
            .build();
        let cache = Arc::new(cache);
        self.cache = Some(cache.clone());

        // Gateway config:
        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS
                | Intents::GUILD_MESSAGES
                | Intents::MESSAGE_CONTENT
                | Intents::GUILD_VOICE_STATES,
        );

        // Create recommended shards:
        let shards = gateway::create_recommended(&http_client, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;
        let shards: Vec<Shard> = shards.collect();

        // Bridge songbird onto the shard senders so it can drive voice
        // gateway updates itself:
        let sender_map: HashMap<u64, MessageSender> = shards
            .iter()
            .map(|shard| (shard.id().number(), shard.sender()))
            .collect();
        let songbird = Arc::new(Songbird::twilight(
            Arc::new(TwilightMap::new(sender_map)),
            current_user.id,
        ));
        self.songbird = Some(songbird.clone());

        for shard in shards {
            self.shard_senders.push(shard.sender());

            let tx_for_shard = tx.clone();
            let songbird_for_shard = songbird.clone();
            let cache_for_shard = cache.clone();

            // Spawn the shard runner:
            let handle = tokio::spawn(async move {
                shard_runner(
                    shard,
                    tx_for_shard,
                    songbird_for_shard,
                    cache_for_shard,
                    current_user.id,
                )
                .await;
            });
            self.shard_tasks.push(handle);
        }

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        // Gracefully close shards
        for sender in &self.shard_senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        // Wait for them
        for task in &mut self.shard_tasks {
            let _ = task.await;
        }

        self.shard_senders.clear();
        self.shard_tasks.clear();

        {
            let mut guard = self.rx.lock().await;
            *guard = None;
        }

        Ok(())
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error> {
        let channel_id_u64: u64 = channel
            .parse()
            .map_err(|_| Error::Platform(format!("Invalid channel ID: {channel}")))?;
        let channel_id = Id::<ChannelMarker>::new(channel_id_u64);

        if let Some(http) = &self.http {
            http.create_message(channel_id)
                .content(message)
                .await
                .map_err(|e| Error::Platform(format!("Error sending Discord message: {e:?}")))?;
        }

        Ok(())
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}
