//! Pixel format tags.

/// Raw DXGI format values for the formats the pipeline recognizes.
const DXGI_R8G8B8A8_TYPELESS: u32 = 27;
const DXGI_R8G8B8A8_UNORM: u32 = 28;
const DXGI_R8G8B8A8_UNORM_SRGB: u32 = 29;
const DXGI_B8G8R8A8_UNORM: u32 = 87;
const DXGI_B8G8R8A8_TYPELESS: u32 = 90;
const DXGI_B8G8R8A8_UNORM_SRGB: u32 = 91;

/// Pixel format of a captured frame.
///
/// The named variants are the closed set of 4-byte-per-pixel backbuffer
/// formats that consumers can use without conversion. Anything else travels
/// as [`PixelFormat::Other`] with the raw DXGI tag, unmodified; the pipeline
/// classifies formats but never converts pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// DXGI_FORMAT_R8G8B8A8_UNORM.
    Rgba8,
    /// DXGI_FORMAT_R8G8B8A8_TYPELESS.
    Rgba8Typeless,
    /// DXGI_FORMAT_R8G8B8A8_UNORM_SRGB.
    Rgba8Srgb,
    /// DXGI_FORMAT_B8G8R8A8_UNORM.
    Bgra8,
    /// DXGI_FORMAT_B8G8R8A8_TYPELESS.
    Bgra8Typeless,
    /// DXGI_FORMAT_B8G8R8A8_UNORM_SRGB.
    Bgra8Srgb,
    /// Any other format, carrying the raw DXGI value.
    Other(u32),
}

impl PixelFormat {
    /// Map a raw DXGI format value to a pixel format tag.
    pub fn from_dxgi(raw: u32) -> Self {
        match raw {
            DXGI_R8G8B8A8_UNORM => Self::Rgba8,
            DXGI_R8G8B8A8_TYPELESS => Self::Rgba8Typeless,
            DXGI_R8G8B8A8_UNORM_SRGB => Self::Rgba8Srgb,
            DXGI_B8G8R8A8_UNORM => Self::Bgra8,
            DXGI_B8G8R8A8_TYPELESS => Self::Bgra8Typeless,
            DXGI_B8G8R8A8_UNORM_SRGB => Self::Bgra8Srgb,
            other => Self::Other(other),
        }
    }

    /// The raw DXGI format value, as written to the wire.
    pub fn to_dxgi(self) -> u32 {
        match self {
            Self::Rgba8 => DXGI_R8G8B8A8_UNORM,
            Self::Rgba8Typeless => DXGI_R8G8B8A8_TYPELESS,
            Self::Rgba8Srgb => DXGI_R8G8B8A8_UNORM_SRGB,
            Self::Bgra8 => DXGI_B8G8R8A8_UNORM,
            Self::Bgra8Typeless => DXGI_B8G8R8A8_TYPELESS,
            Self::Bgra8Srgb => DXGI_B8G8R8A8_UNORM_SRGB,
            Self::Other(raw) => raw,
        }
    }

    /// Whether consumers can use this format without conversion.
    pub fn is_consumer_compatible(self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dxgi_round_trip() {
        for raw in [27, 28, 29, 87, 90, 91] {
            assert_eq!(PixelFormat::from_dxgi(raw).to_dxgi(), raw);
        }
    }

    #[test]
    fn test_known_formats_are_compatible() {
        assert!(PixelFormat::from_dxgi(28).is_consumer_compatible()); // RGBA8
        assert!(PixelFormat::from_dxgi(87).is_consumer_compatible()); // BGRA8
        assert!(PixelFormat::from_dxgi(91).is_consumer_compatible()); // BGRA8 sRGB
    }

    #[test]
    fn test_unknown_format_passes_through_raw_value() {
        // DXGI_FORMAT_R10G10B10A2_UNORM is outside the allowlist
        let format = PixelFormat::from_dxgi(24);
        assert_eq!(format, PixelFormat::Other(24));
        assert!(!format.is_consumer_compatible());
        assert_eq!(format.to_dxgi(), 24);
    }
}
