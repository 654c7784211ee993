// File: muzebot-common/src/models/mod.rs
pub mod player;
pub mod track;

pub use player::{LoopMode, PlayerStateKind};
pub use track::Track;
