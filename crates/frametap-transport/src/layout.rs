//! Shared-region wire layout.
//!
//! The mapped region is a [`ChannelHeader`] followed immediately by
//! `max_frames` contiguous fixed-size slots, each a [`SlotHeader`] plus up
//! to `slot_size - SLOT_HEADER_SIZE` payload bytes. The layout is
//! `#[repr(C)]` and must match byte-for-byte across processes; the tests
//! below pin every offset.

use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Identifies a frametap channel region ("FTAP").
pub const CHANNEL_MAGIC: u32 = 0x4654_4150;

/// Protocol version; attach rejects any mismatch.
pub const CHANNEL_VERSION: u32 = 1;

/// Default ring capacity (one slot stays unused to distinguish full from
/// empty, so this buffers up to three frames).
pub const DEFAULT_MAX_FRAMES: u32 = 4;

/// Default slot capacity: a 1920x1080 4-byte-per-pixel frame plus the slot
/// header.
pub const DEFAULT_SLOT_SIZE: u32 = 1920 * 1080 * 4 + SLOT_HEADER_SIZE as u32;

/// Size of the channel header in bytes.
pub const CHANNEL_HEADER_SIZE: usize = mem::size_of::<ChannelHeader>();

/// Size of a slot header in bytes.
pub const SLOT_HEADER_SIZE: usize = mem::size_of::<SlotHeader>();

/// Control header at the start of the mapped region.
///
/// The non-atomic fields are written once by the creating process before
/// any consumer can observe the region and are read-only afterwards. The
/// atomic fields are only mutated under the region lock, except `sequence`
/// which is a plain counter.
#[repr(C)]
pub struct ChannelHeader {
    /// Magic constant, [`CHANNEL_MAGIC`].
    pub magic: u32,
    /// Protocol version, [`CHANNEL_VERSION`].
    pub version: u32,
    /// Total mapped size in bytes.
    pub region_size: u32,
    /// Byte offset of the first slot.
    pub slots_offset: u32,
    /// Number of slots in the ring.
    pub max_frames: u32,
    /// Fixed size of each slot, header included.
    pub slot_size: u32,
    /// Region lock word; see `lock::RegionLock`.
    pub lock_word: AtomicU32,
    /// Index of the next slot to write, in `[0, max_frames)`.
    pub producer_index: AtomicU32,
    /// Index of the next slot to read, in `[0, max_frames)`.
    pub consumer_index: AtomicU32,
    /// Reserved; keeps `sequence` 8-byte aligned.
    pub _reserved: u32,
    /// Global frame sequence counter, post-incremented per write.
    pub sequence: AtomicU64,
}

/// Per-slot header at the start of each slot's span.
///
/// `payload_len` never exceeds `slot_size - SLOT_HEADER_SIZE`; a write
/// that would violate this is rejected before any bytes are copied.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SlotHeader {
    /// Sequence number drawn from the channel's global counter.
    pub sequence: u64,
    /// Capture timestamp, wall-clock milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Raw DXGI pixel format tag.
    pub format: u32,
    /// Payload bytes following this header.
    pub payload_len: u32,
    /// Reserved, written as zero.
    pub flags: u32,
}

/// Total region size for the given geometry.
pub fn region_size(max_frames: u32, slot_size: u32) -> usize {
    CHANNEL_HEADER_SIZE + max_frames as usize * slot_size as usize
}

/// Largest payload a slot of the given size can carry.
pub fn max_payload(slot_size: u32) -> usize {
    slot_size as usize - SLOT_HEADER_SIZE
}
