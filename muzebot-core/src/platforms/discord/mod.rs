pub mod runtime;
pub mod voice;

pub use runtime::{DiscordEvent, DiscordPlatform};
pub use voice::SongbirdVoice;
