//! Error types for the ring transport.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur on the ring transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Backing file could not be created or opened.
    #[error("failed to open channel backing file {}: {source}", .path.display())]
    Backing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Memory mapping failed.
    #[error("failed to map channel region: {0}")]
    Map(#[source] std::io::Error),

    /// Existing channel was created by an incompatible producer.
    #[error("channel magic mismatch: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    /// Existing channel uses an incompatible protocol version.
    #[error("channel version mismatch: expected {expected}, found {found}")]
    BadVersion { expected: u32, found: u32 },

    /// Channel geometry is unusable (too few slots, slots smaller than a
    /// slot header, or a region too small for its declared geometry).
    #[error("invalid channel geometry: {0}")]
    BadGeometry(String),

    /// Frame payload does not fit in a fixed slot. Slots cannot grow; a
    /// larger frame needs a channel recreated with a bigger `slot_size`.
    #[error("frame needs {required} bytes but slots hold {slot_size}")]
    FrameTooLarge { required: usize, slot_size: usize },

    /// Wake signal could not be created or opened.
    #[error("wake signal error: {0}")]
    Signal(String),
}
