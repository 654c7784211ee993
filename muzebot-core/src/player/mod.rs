// File: src/player/mod.rs

pub mod queue;
pub mod session;
pub mod transport;

pub use queue::PlayQueue;
pub use session::PlayerSession;
pub use transport::{AudioTransport, TransportEvent, TransportEventKind};
