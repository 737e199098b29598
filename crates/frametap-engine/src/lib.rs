//! Capture orchestration for the frametap pipeline.
//!
//! This crate wires one [`FrameExtractor`](frametap_capture::FrameExtractor)
//! and one [`FrameChannel`](frametap_transport::FrameChannel) to a hook
//! collaborator's present events. [`CaptureOrchestrator`] is an ordinary,
//! explicitly constructed object; the module-level functions below hold
//! the single process-wide instance for hosts that need a flat
//! initialize/shutdown surface, and nothing else in the workspace touches
//! it.

mod error;
mod metrics;
mod orchestrator;
mod registry;

pub use error::EngineError;
pub use metrics::{CaptureMetrics, MetricsSnapshot, Operation};
pub use orchestrator::CaptureOrchestrator;
pub use registry::{CallbackHandle, CallbackRegistry};

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use frametap_capture::{FrameCallback, PresentHook};
use frametap_transport::ChannelConfig;

/// Result type for orchestration operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The one process-wide orchestrator, owned by the composition functions
/// below.
static INSTANCE: Mutex<Option<Arc<CaptureOrchestrator>>> = Mutex::new(None);

/// Compose and initialize the process-wide capture pipeline. Idempotent;
/// returns whether the pipeline is up.
pub fn initialize(hook: Arc<dyn PresentHook>, config: ChannelConfig) -> bool {
    let mut instance = INSTANCE.lock();
    if let Some(orchestrator) = instance.as_ref() {
        return orchestrator.initialize().is_ok();
    }

    let orchestrator = Arc::new(CaptureOrchestrator::new(hook, config));
    match orchestrator.initialize() {
        Ok(()) => {
            *instance = Some(orchestrator);
            true
        }
        Err(e) => {
            error!(error = %e, "capture pipeline initialization failed");
            false
        }
    }
}

/// Tear down the process-wide pipeline. Idempotent; a no-op when nothing
/// is initialized.
pub fn shutdown() {
    if let Some(orchestrator) = INSTANCE.lock().take() {
        orchestrator.shutdown();
    }
}

/// Whether the process-wide pipeline is initialized.
pub fn is_initialized() -> bool {
    INSTANCE
        .lock()
        .as_ref()
        .map(|orchestrator| orchestrator.is_initialized())
        .unwrap_or(false)
}

/// Register an in-process frame observer with the process-wide pipeline.
/// Returns `None` before [`initialize`].
pub fn register_frame_callback(callback: FrameCallback) -> Option<CallbackHandle> {
    INSTANCE
        .lock()
        .as_ref()
        .map(|orchestrator| orchestrator.register_frame_callback(callback))
}

/// Tombstone a previously registered observer of the process-wide
/// pipeline.
pub fn unregister_frame_callback(handle: CallbackHandle) {
    if let Some(orchestrator) = INSTANCE.lock().as_ref() {
        orchestrator.unregister_frame_callback(handle);
    }
}
