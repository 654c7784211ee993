//! muzebot-server/src/context.rs
//!
//! Defines the main "global" context (ServerContext) for the bot server.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use muzebot_core::Error;
use muzebot_core::eventbus::EventBus;
use muzebot_core::platforms::{PlatformAuth, PlatformIntegration};
use muzebot_core::platforms::discord::{DiscordPlatform, SongbirdVoice};
use muzebot_core::resolver::YtDlpResolver;
use muzebot_core::services::command_service::CommandService;
use muzebot_core::services::lyrics::LyricsClient;
use muzebot_core::services::notifier::DiscordNotifier;
use muzebot_core::services::player_service::{PlayerHandle, PlayerService};

use crate::Args;

/// The global server context (a bag of references to the event bus, the
/// Discord platform, and the services wired on top of it).
pub struct ServerContext {
    pub event_bus: Arc<EventBus>,
    pub platform: DiscordPlatform,
    pub command_service: Arc<CommandService>,
    pub player: PlayerHandle,
}

impl ServerContext {
    /// Creates and configures the entire context: connect the platform,
    /// spawn the player service loop, wire the command dispatcher.
    pub async fn new(args: &Args) -> Result<Self, Error> {
        let event_bus = Arc::new(EventBus::new());

        // 1) Bring the Discord connection up (gateway shards + voice bridge).
        let token = args.resolve_token()?;
        let mut platform = DiscordPlatform::new(token);
        platform.authenticate().await?;
        platform.connect().await?;

        let http = platform
            .http
            .clone()
            .ok_or_else(|| Error::Platform("HTTP client missing after connect".into()))?;
        let cache = platform
            .cache
            .clone()
            .ok_or_else(|| Error::Platform("cache missing after connect".into()))?;
        let songbird = platform
            .songbird
            .clone()
            .ok_or_else(|| Error::Platform("voice manager missing after connect".into()))?;

        // 2) Player plumbing: transport events flow into the service loop.
        let reqwest_client = reqwest::Client::new();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(SongbirdVoice::new(songbird, transport_tx));
        let resolver = Arc::new(YtDlpResolver::new(reqwest_client.clone()));
        let notifier = Arc::new(DiscordNotifier::new(http.clone()));

        let (player, player_service) = PlayerService::new(
            resolver.clone(),
            transport,
            notifier.clone(),
            event_bus.clone(),
            transport_rx,
        );
        tokio::spawn(player_service.run());

        // 3) Command dispatch on top of it all.
        let lyrics = LyricsClient::new(reqwest_client, args.lyrics_api.clone());
        let command_service = Arc::new(CommandService::new(
            args.prefix.clone(),
            http,
            cache,
            player.clone(),
            resolver,
            notifier,
            lyrics,
            event_bus.clone(),
        ));

        info!("ServerContext initialized.");
        Ok(Self {
            event_bus,
            platform,
            command_service,
            player,
        })
    }
}
