//! Non-Windows stub extractor so the workspace builds everywhere.

use tracing::debug;

use crate::hook::SwapChainHandle;
use crate::{CaptureError, CaptureResult, FrameCallback, SharedChannel};

/// Stub extractor for targets without a swap chain to read from.
///
/// Mirrors the Windows API surface; every extraction fails with
/// [`CaptureError::NotSupported`].
#[allow(dead_code)]
pub struct FrameExtractor {
    frame_callback: Option<FrameCallback>,
    channel: Option<SharedChannel>,
}

impl FrameExtractor {
    /// Create an extractor with nothing bound.
    pub fn new() -> Self {
        debug!("frame extractor stub created (non-Windows target)");
        Self {
            frame_callback: None,
            channel: None,
        }
    }

    /// No device exists to bind on this platform.
    pub fn is_initialized(&self) -> bool {
        false
    }

    /// Set the callback receiving each extracted frame, replacing any
    /// previous one.
    pub fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.frame_callback = Some(callback);
    }

    /// Attach the ring channel frames are written into after the callback
    /// runs.
    pub fn attach_channel(&mut self, channel: SharedChannel) {
        self.channel = Some(channel);
    }

    /// Always fails; there is no backbuffer to extract here.
    pub fn extract_frame(&mut self, _swap_chain: &SwapChainHandle) -> CaptureResult<()> {
        Err(CaptureError::NotSupported)
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}
