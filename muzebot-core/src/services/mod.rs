
// File: src/services/mod.rs

pub mod command_service;
pub mod lyrics;
pub mod notifier;
pub mod player_service;

pub use command_service::CommandService;
pub use player_service::{PlayerHandle, PlayerService};
