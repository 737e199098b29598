//! Frame extraction from a live swap chain (Windows).

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_CPU_ACCESS_READ,
    D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::IDXGISwapChain;

use frametap_types::{FrameBuffer, PixelFormat};

use crate::staging::{decide, CacheDecision, StagingDesc};
use crate::{CaptureError, CaptureResult, FrameCallback, SharedChannel};

/// Extracts CPU-readable frames from a swap chain's backbuffer.
///
/// Holds non-owning (reference-counted) device and context handles bound
/// by [`initialize`](Self::initialize), and at most one staging texture at
/// a time, reused while the backbuffer geometry stays the same. All work
/// happens synchronously on the caller's thread.
pub struct FrameExtractor {
    device: Option<ID3D11Device>,
    context: Option<ID3D11DeviceContext>,
    staging: Option<(ID3D11Texture2D, StagingDesc)>,
    sequence: u64,
    last_timestamp_ms: u64,
    last_unsupported_format: Option<u32>,
    frame_callback: Option<FrameCallback>,
    channel: Option<SharedChannel>,
}

impl FrameExtractor {
    /// Create an extractor with nothing bound.
    pub fn new() -> Self {
        Self {
            device: None,
            context: None,
            staging: None,
            sequence: 0,
            last_timestamp_ms: 0,
            last_unsupported_format: None,
            frame_callback: None,
            channel: None,
        }
    }

    /// Bind the device and context used for staging copies. The extractor
    /// shares ownership of the interfaces (released again on drop or
    /// rebind) but never destroys them. Resets the sequence counter.
    pub fn initialize(
        &mut self,
        device: &ID3D11Device,
        context: &ID3D11DeviceContext,
    ) -> CaptureResult<()> {
        self.device = Some(device.clone());
        self.context = Some(context.clone());
        self.sequence = 0;
        info!("frame extractor initialized");
        Ok(())
    }

    /// Whether `initialize` has bound a device and context.
    pub fn is_initialized(&self) -> bool {
        self.device.is_some() && self.context.is_some()
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

    /// Capture the swap chain's current backbuffer as a [`FrameBuffer`]
    /// and deliver it to the callback and the attached channel.
    ///
    /// Any failure before the frame is packaged aborts the extraction; a
    /// partial frame never reaches a callback or the transport.
    pub fn extract_frame(&mut self, swap_chain: &IDXGISwapChain) -> CaptureResult<()> {
        let (device, context) = match (&self.device, &self.context) {
            (Some(device), Some(context)) => (device.clone(), context.clone()),
            _ => return Err(CaptureError::NotInitialized),
        };

        let backbuffer: ID3D11Texture2D = unsafe { swap_chain.GetBuffer(0)? };
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { backbuffer.GetDesc(&mut desc) };
        let wanted = StagingDesc {
            width: desc.Width,
            height: desc.Height,
            format: desc.Format.0 as u32,
        };

        let staging = self.ensure_staging(&device, wanted)?;

        // Device-side copy; no CPU involvement until the map below.
        unsafe { context.CopyResource(&staging, &backbuffer) };

        let mapped = unsafe {
            let mut mapped: D3D11_MAPPED_SUBRESOURCE = std::mem::zeroed();
            context.Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
            mapped
        };

        let stride = mapped.RowPitch;
        let total = wanted.height as usize * stride as usize;
        let mut data = vec![0u8; total];
        unsafe {
            let src = std::slice::from_raw_parts(mapped.pData as *const u8, total);
            data.copy_from_slice(src);
            // The staging texture must not stay mapped past this call.
            context.Unmap(&staging, 0);
        }

        let format = self.classify_format(wanted.format);
        let timestamp_ms = self.next_timestamp();
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let frame = FrameBuffer::new(
            wanted.width,
            wanted.height,
            stride,
            format,
            timestamp_ms,
            sequence,
            Bytes::from(data),
        );
        trace!(
            sequence,
            width = frame.width,
            height = frame.height,
            "frame extracted"
        );

        if let Some(callback) = &self.frame_callback {
            callback(&frame);
        }
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.lock().write_frame(&frame) {
                warn!(error = %e, "failed to write frame to channel");
            }
        }
        Ok(())
    }

    /// Reuse the cached staging texture when the backbuffer geometry
    /// matches, otherwise release it and create a fresh one. A failed
    /// creation leaves nothing cached.
    fn ensure_staging(
        &mut self,
        device: &ID3D11Device,
        wanted: StagingDesc,
    ) -> CaptureResult<ID3D11Texture2D> {
        if let CacheDecision::Reuse = decide(self.staging.as_ref().map(|(_, d)| d), &wanted) {
            if let Some((texture, _)) = &self.staging {
                return Ok(texture.clone());
            }
        }

        self.staging = None;
        let texture = create_staging_texture(device, &wanted)?;
        debug!(
            width = wanted.width,
            height = wanted.height,
            format = wanted.format,
            "created staging texture"
        );
        self.staging = Some((texture.clone(), wanted));
        Ok(texture)
    }

    /// Classify the backbuffer format against the consumer-compatible
    /// allowlist. Unsupported formats are logged once per format change
    /// and passed through unmodified; there is no conversion path.
    fn classify_format(&mut self, raw: u32) -> PixelFormat {
        let format = PixelFormat::from_dxgi(raw);
        if format.is_consumer_compatible() {
            self.last_unsupported_format = None;
        } else if self.last_unsupported_format != Some(raw) {
            warn!(format = raw, "unsupported backbuffer format, passing through unconverted");
            self.last_unsupported_format = Some(raw);
        }
        format
    }

    /// Wall-clock milliseconds, clamped non-decreasing against the
    /// previous frame to absorb clock steps.
    fn next_timestamp(&mut self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let timestamp = now_ms.max(self.last_timestamp_ms);
        self.last_timestamp_ms = timestamp;
        timestamp
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn create_staging_texture(
    device: &ID3D11Device,
    wanted: &StagingDesc,
) -> CaptureResult<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: wanted.width,
        Height: wanted.height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT(wanted.format as i32),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let mut texture = None;
    unsafe {
        device.CreateTexture2D(&desc, None, Some(&mut texture))?;
    }
    texture.ok_or_else(|| CaptureError::WindowsApi {
        message: "CreateTexture2D returned no staging texture".to_string(),
        source: None,
    })
}
