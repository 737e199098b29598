//! Error types for frame extraction.

use thiserror::Error;

/// Errors that can occur during frame extraction.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Windows API error.
    #[error("Windows API error: {message}")]
    WindowsApi {
        message: String,
        #[cfg(windows)]
        #[source]
        source: Option<windows::core::Error>,
    },

    /// Extractor used before `initialize` bound a device and context.
    #[error("frame extractor not initialized")]
    NotInitialized,

    /// Frame extraction is not available on this platform.
    #[error("frame extraction not supported on this platform")]
    NotSupported,
}

#[cfg(windows)]
impl From<windows::core::Error> for CaptureError {
    fn from(err: windows::core::Error) -> Self {
        Self::WindowsApi {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}
