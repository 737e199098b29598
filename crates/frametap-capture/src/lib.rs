//! Backbuffer-to-CPU frame extraction.
//!
//! The extractor turns a live swap chain's current backbuffer into a
//! [`FrameBuffer`](frametap_types::FrameBuffer) via a reusable staging
//! texture, then hands the frame to an in-process callback and the ring
//! transport, synchronously on the calling (render) thread. Hook
//! installation itself is an external collaborator reached through the
//! [`PresentHook`] trait.
//!
//! The real extractor exists on Windows; other targets compile a stub with
//! the same API so the rest of the workspace builds everywhere.

mod error;
mod hook;
mod staging;

#[cfg(windows)]
mod extractor;
#[cfg(windows)]
pub use extractor::FrameExtractor;

#[cfg(not(windows))]
mod stub;
#[cfg(not(windows))]
pub use stub::FrameExtractor;

pub use error::CaptureError;
pub use hook::{PresentCallback, PresentHook, SwapChainHandle};
pub use staging::StagingDesc;

use std::sync::Arc;

use parking_lot::Mutex;

use frametap_transport::FrameChannel;
use frametap_types::FrameBuffer;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Callback receiving each extracted frame on the render thread.
pub type FrameCallback = Box<dyn Fn(&FrameBuffer) + Send + Sync>;

/// Shared handle to the channel the extractor writes into.
pub type SharedChannel = Arc<Mutex<FrameChannel>>;
