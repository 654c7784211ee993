//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, watch};

use muzebot_common::models::LoopMode;

/// Global event type that various parts of the bot can publish or subscribe to.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// An inbound chat message that looked like a command.
    ChatMessage {
        channel: String,
        user: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A track was handed to the voice transport.
    TrackStarted {
        guild_id: u64,
        title: String,
        loop_mode: LoopMode,
    },

    /// A track could not be resolved or died during playback; it was
    /// dropped and the player advanced.
    TrackFailed { guild_id: u64, message: String },

    /// The pending queue ran dry and the player went idle.
    QueueEmptied { guild_id: u64 },

    /// Periodic heartbeat event, or anything else you broadcast.
    Tick,

    /// System-wide event for debugging or administration.
    SystemMessage(String),
}

impl BotEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::ChatMessage { .. } => "chat_message",
            BotEvent::TrackStarted { .. } => "track_started",
            BotEvent::TrackFailed { .. } => "track_failed",
            BotEvent::QueueEmptied { .. } => "queue_emptied",
            BotEvent::Tick => "tick",
            BotEvent::SystemMessage(_) => "system_message",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>` for guaranteed delivery.
///
/// - If the subscriber’s channel buffer fills, `publish` will await
///   until there's space (backpressure).
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and sending returns an error.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber’s buffer. Adjust as needed.
const DEFAULT_BUFFER_SIZE: usize = 10000;

impl EventBus {
    /// Create a new, empty event bus.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }

    /// Convenience method: publish a `ChatMessage` event.
    pub async fn publish_chat(&self, channel: &str, user: &str, text: &str) {
        let event = BotEvent::ChatMessage {
            channel: channel.to_string(),
            user: user.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.publish(event).await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish(BotEvent::Tick).await;

        let evt1 = rx1.recv().await.expect("rx1 should get event");
        let evt2 = rx2.recv().await.expect("rx2 should get event");

        assert_eq!(evt1.event_type(), "tick");
        assert_eq!(evt2.event_type(), "tick");
    }

    #[tokio::test]
    async fn test_publish_chat() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(None).await;

        bus.publish_chat("music-channel", "someone", "!play xyz").await;

        match rx.recv().await.expect("should get event") {
            BotEvent::ChatMessage { channel, user, text, .. } => {
                assert_eq!(channel, "music-channel");
                assert_eq!(user, "someone");
                assert_eq!(text, "!play xyz");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_flag() {
        let bus = EventBus::new();
        assert!(!bus.is_shutdown());
        bus.shutdown();
        assert!(bus.is_shutdown());

        let mut rx = bus.shutdown_rx.clone();
        let flagged = timeout(Duration::from_millis(100), rx.changed()).await;
        // watch::Receiver::changed resolves immediately on an already-sent value
        assert!(flagged.is_ok() || *rx.borrow());
    }
}
