//! Staging-texture cache key.
//!
//! The extractor holds at most one staging texture, keyed on the
//! backbuffer geometry. Only one capture target is active at a time, so
//! this is a single-entry cache: reuse on an exact match, release and
//! recreate on any change.

/// Geometry and format of a staging texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingDesc {
    /// Texture width in pixels.
    pub width: u32,
    /// Texture height in pixels.
    pub height: u32,
    /// Raw DXGI format tag.
    pub format: u32,
}

/// What to do with the cached staging texture for a new backbuffer.
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheDecision {
    /// The cached texture matches; reuse it.
    Reuse,
    /// No cached texture, or geometry/format changed; release and
    /// recreate.
    Recreate,
}

#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn decide(cached: Option<&StagingDesc>, wanted: &StagingDesc) -> CacheDecision {
    match cached {
        Some(desc) if desc == wanted => CacheDecision::Reuse,
        _ => CacheDecision::Recreate,
    }
}
