//! Narrow interface to the external hook-installation collaborator.
//!
//! Locating target modules, patching vtables, and spotting newly created
//! swap chains all happen outside this workspace. This crate only consumes
//! the result: a per-present notification carrying the swap-chain handle.

use std::sync::Arc;

/// Opaque swap-chain handle delivered with each present event.
#[cfg(windows)]
pub type SwapChainHandle = windows::Win32::Graphics::Dxgi::IDXGISwapChain;

/// Opaque swap-chain handle delivered with each present event.
///
/// Stand-in for targets without a swap chain; only the Windows extractor
/// can do anything with one.
#[cfg(not(windows))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapChainHandle;

/// Callback invoked on every present event.
///
/// Runs inside foreign call stacks owned by the host application; it must
/// not unwind and must not block.
pub type PresentCallback = Arc<dyn Fn(&SwapChainHandle) + Send + Sync>;

/// The hook-installation service, consumed as a callback registry.
pub trait PresentHook: Send + Sync {
    /// Register a callback fired on every present event.
    fn register_present_callback(&self, callback: PresentCallback);

    /// Drop all registered callbacks; present events stop being forwarded.
    fn clear_present_callbacks(&self);

    /// Attempt to install the hook against a live swap chain right now.
    /// Returns whether a target was found; a miss is not fatal, since
    /// registered callbacks still fire once the host creates a swap chain.
    fn try_install(&self) -> bool;
}
