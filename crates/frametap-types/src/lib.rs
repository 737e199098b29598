//! Shared frame types for the frametap capture pipeline.
//!
//! This crate defines the value types exchanged between the capture side,
//! the ring transport, and in-process consumers: the captured frame itself
//! and its pixel-format tag.

mod format;
mod frame;

pub use format::PixelFormat;
pub use frame::FrameBuffer;
