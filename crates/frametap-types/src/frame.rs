//! Captured frame type.

use bytes::Bytes;

use crate::format::PixelFormat;

/// One captured frame, packaged for delivery.
///
/// Created fresh on every extraction and never mutated afterwards. `data`
/// holds `height * stride` bytes; the stride is the mapped row pitch
/// reported by the device, which may exceed `width * 4`.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Bytes per row.
    pub stride: u32,

    /// Pixel format of the payload.
    pub format: PixelFormat,

    /// Capture time in wall-clock milliseconds since the Unix epoch,
    /// monotonically non-decreasing per producer.
    pub timestamp_ms: u64,

    /// Monotonically increasing sequence number, per producer.
    pub sequence: u64,

    /// Pixel data, `height * stride` bytes.
    pub data: Bytes,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new(
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        timestamp_ms: u64,
        sequence: u64,
        data: Bytes,
    ) -> Self {
        Self {
            width,
            height,
            stride,
            format,
            timestamp_ms,
            sequence,
            data,
        }
    }

    /// Expected payload size for the given geometry.
    pub fn expected_len(height: u32, stride: u32) -> usize {
        height as usize * stride as usize
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    /// Validate that the payload matches the frame geometry.
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::expected_len(self.height, self.stride)
    }
}
