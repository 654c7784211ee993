//! The run loop: drains platform events into the command dispatcher until
//! shutdown is requested (ctrl-c or a bus shutdown).

use tracing::{debug, error, info};

use muzebot_core::Error;
use muzebot_core::eventbus::BotEvent;
use muzebot_core::platforms::PlatformIntegration;
use muzebot_core::platforms::discord::DiscordEvent;

use crate::Args;
use crate::context::ServerContext;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let mut ctx = ServerContext::new(&args).await?;

    // Log player lifecycle events published on the bus.
    let mut bus_rx = ctx.event_bus.subscribe(None).await;
    tokio::spawn(async move {
        while let Some(event) = bus_rx.recv().await {
            match &event {
                BotEvent::TrackStarted { guild_id, title, loop_mode } => {
                    info!("(EventBus) guild {guild_id}: started '{title}' (loop {loop_mode})");
                }
                BotEvent::TrackFailed { guild_id, message } => {
                    info!("(EventBus) guild {guild_id}: track failed: {message}");
                }
                BotEvent::QueueEmptied { guild_id } => {
                    info!("(EventBus) guild {guild_id}: queue emptied");
                }
                other => debug!("(EventBus) {}", other.event_type()),
            }
        }
    });

    // Ctrl-C flips the bus-wide shutdown flag.
    let event_bus = ctx.event_bus.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("ctrl-c handler error: {e}");
            return;
        }
        info!("Ctrl-C received, shutting down.");
        event_bus.shutdown();
    });

    let mut shutdown_rx = ctx.event_bus.shutdown_rx.clone();
    loop {
        tokio::select! {
            maybe_event = ctx.platform.next_event() => {
                let Some(event) = maybe_event else {
                    break;
                };
                match event {
                    DiscordEvent::Message(msg) => {
                        if let Err(e) = ctx.command_service.handle_chat_line(msg).await {
                            error!("command error: {e}");
                        }
                    }
                    DiscordEvent::Interaction(evt) => {
                        if let Err(e) = ctx.command_service.handle_interaction(evt).await {
                            error!("interaction error: {e}");
                        }
                    }
                    DiscordEvent::VoiceChannelEmpty { guild_id } => {
                        if let Err(e) = ctx.player.voice_channel_empty(guild_id) {
                            error!("voice-empty dispatch error: {e}");
                        }
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Disconnecting platform.");
    ctx.platform.disconnect().await?;
    Ok(())
}
