// File: muzebot-common/src/models/player.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Policy governing whether a finished track re-enters the queue.
/// Exactly one mode is active at a time; modes are toggled, never combined.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    /// Replay the current track indefinitely.
    Track,
    /// Append finished tracks to the back of the queue (full-cycle repeat).
    Queue,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::Track => write!(f, "track"),
            LoopMode::Queue => write!(f, "queue"),
        }
    }
}

impl FromStr for LoopMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "track" => Ok(LoopMode::Track),
            "queue" => Ok(LoopMode::Queue),
            _ => Err(format!("Unknown loop mode: {}", s)),
        }
    }
}

/// Coarse lifecycle of a player session.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PlayerStateKind {
    /// No current track; the transport is inactive.
    Idle,
    /// A stream is being resolved for the current track.
    Preparing,
    /// The transport is actively emitting audio for the current track.
    Playing,
    /// Explicit user stop; the transport session has been torn down.
    Stopped,
}

impl fmt::Display for PlayerStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerStateKind::Idle => write!(f, "idle"),
            PlayerStateKind::Preparing => write!(f, "preparing"),
            PlayerStateKind::Playing => write!(f, "playing"),
            PlayerStateKind::Stopped => write!(f, "stopped"),
        }
    }
}
