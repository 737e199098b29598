//! Error types for capture orchestration.

use thiserror::Error;

use frametap_capture::CaptureError;
use frametap_transport::TransportError;

/// Errors that can occur while composing the capture pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ring transport failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Frame extraction failure.
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),
}
