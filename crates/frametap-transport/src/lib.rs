//! Memory-mapped cross-process ring transport for captured frames.
//!
//! One producer process writes frames into a fixed ring of equally sized
//! slots inside a file-backed memory mapping; one consumer process reads
//! them out, woken by a named cross-process signal. When the ring is full
//! the oldest unread frame is dropped rather than blocking the writer —
//! a live frame stream tolerates drops, not stalls.

mod channel;
mod config;
mod error;
mod layout;
mod lock;
mod signal;

pub use channel::{ChannelRole, FrameChannel};
pub use config::ChannelConfig;
pub use error::TransportError;
pub use layout::{
    ChannelHeader, SlotHeader, CHANNEL_HEADER_SIZE, CHANNEL_MAGIC, CHANNEL_VERSION,
    DEFAULT_MAX_FRAMES, DEFAULT_SLOT_SIZE, SLOT_HEADER_SIZE,
};
pub use signal::signal_name;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
