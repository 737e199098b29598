//! The frame channel: a mapped ring of fixed slots.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use memmap2::MmapMut;
use tracing::{info, trace, warn};

use frametap_types::{FrameBuffer, PixelFormat};

use crate::config::ChannelConfig;
use crate::error::TransportError;
use crate::layout::{
    self, ChannelHeader, SlotHeader, CHANNEL_HEADER_SIZE, CHANNEL_MAGIC, CHANNEL_VERSION,
    SLOT_HEADER_SIZE,
};
use crate::lock::RegionLock;
use crate::signal::FrameSignal;
use crate::TransportResult;

/// How this process ended up with the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// This process created the region and wrote its header.
    Creator,
    /// This process attached to a region another process created.
    Attached,
}

/// A cross-process frame channel over a file-backed memory mapping.
///
/// [`FrameChannel::open`] attaches to an existing channel by name or
/// creates it. Exactly one producer is assumed; the producer calls
/// [`write_frame`](Self::write_frame), the consumer loops
/// [`wait_for_frame`](Self::wait_for_frame) / [`read_frame`](Self::read_frame).
/// The region lives as long as any process keeps the channel open; the
/// backing file itself persists until removed.
pub struct FrameChannel {
    map: MmapMut,
    signal: FrameSignal,
    name: String,
    path: PathBuf,
    role: ChannelRole,
}

impl std::fmt::Debug for FrameChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameChannel")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl FrameChannel {
    /// Open the channel named in `config`, creating it if it does not
    /// exist yet. Attach validates magic and version exactly and fails
    /// hard on any mismatch.
    pub fn open(config: &ChannelConfig) -> TransportResult<Self> {
        let path = config.backing_path();
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => Self::attach(config, file, path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::create(config, path),
            Err(e) => Err(TransportError::Backing { path, source: e }),
        }
    }

    fn create(config: &ChannelConfig, path: PathBuf) -> TransportResult<Self> {
        if config.max_frames < 2 {
            return Err(TransportError::BadGeometry(format!(
                "max_frames must be at least 2, got {}",
                config.max_frames
            )));
        }
        if config.slot_size as usize <= SLOT_HEADER_SIZE {
            return Err(TransportError::BadGeometry(format!(
                "slot_size {} leaves no payload room past the {SLOT_HEADER_SIZE}-byte slot header",
                config.slot_size
            )));
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            // Lost a create race; the winner initializes the header.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .map_err(|e| TransportError::Backing {
                        path: path.clone(),
                        source: e,
                    })?;
                return Self::attach(config, file, path);
            }
            Err(e) => return Err(TransportError::Backing { path, source: e }),
        };

        let region_len = layout::region_size(config.max_frames, config.slot_size);
        file.set_len(region_len as u64)
            .map_err(|e| TransportError::Backing {
                path: path.clone(),
                source: e,
            })?;
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(TransportError::Map)?;

        let header = map.as_mut_ptr() as *mut ChannelHeader;
        unsafe {
            (*header).magic = CHANNEL_MAGIC;
            (*header).version = CHANNEL_VERSION;
            (*header).region_size = region_len as u32;
            (*header).slots_offset = CHANNEL_HEADER_SIZE as u32;
            (*header).max_frames = config.max_frames;
            (*header).slot_size = config.slot_size;
            (*header).lock_word = AtomicU32::new(0);
            (*header).producer_index = AtomicU32::new(0);
            (*header).consumer_index = AtomicU32::new(0);
            (*header)._reserved = 0;
            (*header).sequence = AtomicU64::new(0);
        }

        let signal = FrameSignal::open(&config.name)?;
        info!(
            name = %config.name,
            max_frames = config.max_frames,
            slot_size = config.slot_size,
            region = region_len,
            "created frame channel"
        );
        Ok(Self {
            map,
            signal,
            name: config.name.clone(),
            path,
            role: ChannelRole::Creator,
        })
    }

    fn attach(config: &ChannelConfig, file: File, path: PathBuf) -> TransportResult<Self> {
        let len = file
            .metadata()
            .map_err(|e| TransportError::Backing {
                path: path.clone(),
                source: e,
            })?
            .len() as usize;
        if len < CHANNEL_HEADER_SIZE {
            return Err(TransportError::BadGeometry(format!(
                "region is {len} bytes, smaller than the {CHANNEL_HEADER_SIZE}-byte channel header"
            )));
        }

        let map = unsafe { MmapMut::map_mut(&file) }.map_err(TransportError::Map)?;

        // Validate before touching anything else; an error here drops the
        // mapping on return.
        let (max_frames, slot_size) = {
            let header = unsafe { &*(map.as_ptr() as *const ChannelHeader) };
            if header.magic != CHANNEL_MAGIC {
                return Err(TransportError::BadMagic {
                    expected: CHANNEL_MAGIC,
                    found: header.magic,
                });
            }
            if header.version != CHANNEL_VERSION {
                return Err(TransportError::BadVersion {
                    expected: CHANNEL_VERSION,
                    found: header.version,
                });
            }
            let slots_end = header.slots_offset as usize
                + header.max_frames as usize * header.slot_size as usize;
            if header.max_frames < 2
                || header.slot_size as usize <= SLOT_HEADER_SIZE
                || slots_end > map.len()
            {
                return Err(TransportError::BadGeometry(format!(
                    "header declares {} slots of {} bytes at offset {} in a {}-byte region",
                    header.max_frames,
                    header.slot_size,
                    header.slots_offset,
                    map.len()
                )));
            }
            (header.max_frames, header.slot_size)
        };

        let signal = FrameSignal::open(&config.name)?;
        info!(
            name = %config.name,
            max_frames,
            slot_size,
            "attached to existing frame channel"
        );
        Ok(Self {
            map,
            signal,
            name: config.name.clone(),
            path,
            role: ChannelRole::Attached,
        })
    }

    /// Publish one frame into the ring.
    ///
    /// If the ring is full the oldest unread frame is discarded first; the
    /// writer never blocks on a slow consumer. A payload larger than the
    /// fixed slot fails before any bytes are copied or indices move.
    pub fn write_frame(&mut self, frame: &FrameBuffer) -> TransportResult<()> {
        let payload = frame.data.as_ref();
        let required = SLOT_HEADER_SIZE + payload.len();
        let (max_frames, slot_size, slots_offset) = self.geometry();
        if required > slot_size as usize {
            return Err(TransportError::FrameTooLarge {
                required,
                slot_size: slot_size as usize,
            });
        }

        let base = self.map.as_mut_ptr();
        let header = unsafe { &*(base as *const ChannelHeader) };
        {
            let _guard = RegionLock::new(&header.lock_word).lock();

            let producer = header.producer_index.load(Ordering::Relaxed);
            let consumer = header.consumer_index.load(Ordering::Relaxed);
            if (producer + 1) % max_frames == consumer {
                // Full: discard the oldest unread frame instead of blocking.
                header
                    .consumer_index
                    .store((consumer + 1) % max_frames, Ordering::Relaxed);
                trace!(slot = consumer, "ring full, dropping oldest frame");
            }

            let sequence = header.sequence.fetch_add(1, Ordering::Relaxed);
            let slot_header = SlotHeader {
                sequence,
                timestamp_ms: frame.timestamp_ms,
                width: frame.width,
                height: frame.height,
                stride: frame.stride,
                format: frame.format.to_dxgi(),
                payload_len: payload.len() as u32,
                flags: 0,
            };
            unsafe {
                let slot =
                    base.add(slots_offset as usize + producer as usize * slot_size as usize);
                // Slot boundaries are not necessarily 8-byte aligned.
                ptr::write_unaligned(slot as *mut SlotHeader, slot_header);
                ptr::copy_nonoverlapping(payload.as_ptr(), slot.add(SLOT_HEADER_SIZE), payload.len());
            }
            header
                .producer_index
                .store((producer + 1) % max_frames, Ordering::Release);
        }

        // Signal strictly after the lock is released, so a woken reader
        // never observes a half-updated index under the lock it takes next.
        if let Err(e) = self.signal.signal() {
            warn!(error = %e, "failed to signal new frame");
        }
        Ok(())
    }

    /// Take the oldest unread frame out of the ring, or `Ok(None)` if the
    /// ring is empty. An empty read mutates nothing.
    pub fn read_frame(&mut self) -> TransportResult<Option<FrameBuffer>> {
        let (max_frames, slot_size, slots_offset) = self.geometry();
        let base = self.map.as_mut_ptr();
        let header = unsafe { &*(base as *const ChannelHeader) };

        let _guard = RegionLock::new(&header.lock_word).lock();

        let producer = header.producer_index.load(Ordering::Acquire);
        let consumer = header.consumer_index.load(Ordering::Relaxed);
        if producer == consumer {
            return Ok(None);
        }

        let slot =
            unsafe { base.add(slots_offset as usize + consumer as usize * slot_size as usize) };
        let slot_header = unsafe { ptr::read_unaligned(slot as *const SlotHeader) };
        let capacity = slot_size as usize - SLOT_HEADER_SIZE;
        if slot_header.payload_len as usize > capacity {
            // Writers never publish this; the region is corrupt.
            return Err(TransportError::BadGeometry(format!(
                "slot {} declares {} payload bytes, capacity is {}",
                consumer, slot_header.payload_len, capacity
            )));
        }

        let mut data = vec![0u8; slot_header.payload_len as usize];
        unsafe {
            ptr::copy_nonoverlapping(slot.add(SLOT_HEADER_SIZE), data.as_mut_ptr(), data.len());
        }
        header
            .consumer_index
            .store((consumer + 1) % max_frames, Ordering::Release);

        Ok(Some(FrameBuffer::new(
            slot_header.width,
            slot_header.height,
            slot_header.stride,
            PixelFormat::from_dxgi(slot_header.format),
            slot_header.timestamp_ms,
            slot_header.sequence,
            Bytes::from(data),
        )))
    }

    /// Block until the producer signals a new frame, up to `timeout`
    /// (`None` waits forever, a zero duration polls). Returns whether the
    /// signal fired; either way the caller must still call
    /// [`read_frame`](Self::read_frame) and handle emptiness.
    pub fn wait_for_frame(&self, timeout: Option<Duration>) -> bool {
        let signaled = self.signal.wait(timeout);
        if !signaled {
            trace!(name = %self.name, "no frame signal within timeout");
        }
        signaled
    }

    /// Number of frames currently buffered and unread.
    pub fn pending_frames(&self) -> u32 {
        let header = self.header();
        let _guard = RegionLock::new(&header.lock_word).lock();
        let producer = header.producer_index.load(Ordering::Relaxed);
        let consumer = header.consumer_index.load(Ordering::Relaxed);
        (producer + header.max_frames - consumer) % header.max_frames
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file.
    pub fn backing_path(&self) -> &Path {
        &self.path
    }

    /// Whether this process created the region or attached to it.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Number of ring slots; one stays unused to distinguish full from
    /// empty.
    pub fn max_frames(&self) -> u32 {
        self.header().max_frames
    }

    /// Fixed slot size in bytes, slot header included.
    pub fn slot_size(&self) -> u32 {
        self.header().slot_size
    }

    /// Largest payload one slot can carry.
    pub fn max_payload(&self) -> usize {
        layout::max_payload(self.slot_size())
    }

    fn header(&self) -> &ChannelHeader {
        unsafe { &*(self.map.as_ptr() as *const ChannelHeader) }
    }

    fn geometry(&self) -> (u32, u32, u32) {
        let header = self.header();
        (header.max_frames, header.slot_size, header.slots_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Seek, SeekFrom, Write};
    use std::thread;

    use tempfile::TempDir;

    fn test_config(dir: &TempDir, tag: &str, max_frames: u32, slot_size: u32) -> ChannelConfig {
        ChannelConfig {
            name: format!("frametap_test_{}_{}", std::process::id(), tag),
            max_frames,
            slot_size,
            directory: Some(dir.path().to_path_buf()),
        }
    }

    fn test_frame(tag: u8) -> FrameBuffer {
        // 4x2 BGRA frame with a padded stride and a recognizable payload.
        let data: Vec<u8> = (0..32u8).map(|i| i.wrapping_add(tag)).collect();
        FrameBuffer::new(4, 2, 16, PixelFormat::Bgra8, 1_000 + tag as u64, 0, data.into())
    }

    const SMALL_SLOT: u32 = SLOT_HEADER_SIZE as u32 + 64;

    #[test]
    fn test_create_then_attach() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "create_attach", 4, SMALL_SLOT);

        let creator = FrameChannel::open(&config).unwrap();
        assert_eq!(creator.role(), ChannelRole::Creator);
        assert_eq!(creator.max_frames(), 4);
        assert_eq!(creator.slot_size(), SMALL_SLOT);

        let attached = FrameChannel::open(&config).unwrap();
        assert_eq!(attached.role(), ChannelRole::Attached);
        assert_eq!(attached.max_frames(), 4);
        assert_eq!(attached.max_payload(), 64);
    }

    #[test]
    fn test_fifo_order_and_payload_identity() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "fifo", 8, SMALL_SLOT);
        let mut channel = FrameChannel::open(&config).unwrap();

        for tag in 0..3u8 {
            channel.write_frame(&test_frame(tag)).unwrap();
        }

        for tag in 0..3u8 {
            let frame = channel.read_frame().unwrap().expect("frame available");
            assert_eq!(frame.sequence, tag as u64);
            assert_eq!(frame.data, test_frame(tag).data);
        }
        assert!(channel.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_slot_metadata_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "metadata", 4, SMALL_SLOT);
        let mut channel = FrameChannel::open(&config).unwrap();

        channel.write_frame(&test_frame(7)).unwrap();
        let frame = channel.read_frame().unwrap().unwrap();
        assert_eq!(frame.width, 4);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.stride, 16);
        assert_eq!(frame.format, PixelFormat::Bgra8);
        assert_eq!(frame.timestamp_ms, 1_007);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_full_ring_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "drop_oldest", 4, SMALL_SLOT);
        let mut channel = FrameChannel::open(&config).unwrap();

        // Fill the three usable slots with sequences 0..=2, then one more.
        for tag in 0..5u8 {
            channel.write_frame(&test_frame(tag)).unwrap();
        }

        // Sequences 0 and 1 were overwritten; 2, 3, 4 remain in order.
        for expected in 2..5u64 {
            let frame = channel.read_frame().unwrap().expect("frame available");
            assert_eq!(frame.sequence, expected);
            assert_eq!(frame.data, test_frame(expected as u8).data);
        }
        assert!(channel.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_fourth_write_drops_sequence_zero() {
        // max_frames = 4 leaves three usable slots; the fourth write
        // evicts sequence 0, so the first read returns sequence 1.
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "scenario", 4, SMALL_SLOT);
        let mut channel = FrameChannel::open(&config).unwrap();

        for tag in 0..4u8 {
            channel.write_frame(&test_frame(tag)).unwrap();
        }

        for expected in 1..4u64 {
            let frame = channel.read_frame().unwrap().expect("frame available");
            assert_eq!(frame.sequence, expected);
            assert_eq!(frame.data, test_frame(expected as u8).data);
        }
        assert!(channel.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_read_empty_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "empty", 4, SMALL_SLOT);
        let mut channel = FrameChannel::open(&config).unwrap();

        assert!(channel.read_frame().unwrap().is_none());
        assert_eq!(channel.pending_frames(), 0);

        // Indices were untouched: the next write is still sequence 0.
        channel.write_frame(&test_frame(0)).unwrap();
        let frame = channel.read_frame().unwrap().unwrap();
        assert_eq!(frame.sequence, 0);
    }

    #[test]
    fn test_oversized_frame_rejected_before_any_effect() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "oversized", 4, SMALL_SLOT);
        let mut channel = FrameChannel::open(&config).unwrap();

        channel.write_frame(&test_frame(0)).unwrap();

        let huge = FrameBuffer::new(
            16,
            16,
            16,
            PixelFormat::Bgra8,
            0,
            0,
            vec![0xAAu8; 256].into(),
        );
        match channel.write_frame(&huge) {
            Err(TransportError::FrameTooLarge { required, slot_size }) => {
                assert_eq!(required, SLOT_HEADER_SIZE + 256);
                assert_eq!(slot_size, SMALL_SLOT as usize);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }

        // The failed write left indices and the buffered frame untouched.
        assert_eq!(channel.pending_frames(), 1);
        let frame = channel.read_frame().unwrap().unwrap();
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.data, test_frame(0).data);
    }

    #[test]
    fn test_attach_rejects_corrupt_magic() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "magic", 4, SMALL_SLOT);
        let channel = FrameChannel::open(&config).unwrap();
        let path = channel.backing_path().to_path_buf();
        drop(channel);

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&0xDEAD_BEEFu32.to_ne_bytes()).unwrap();
        drop(file);

        match FrameChannel::open(&config) {
            Err(TransportError::BadMagic { expected, found }) => {
                assert_eq!(expected, CHANNEL_MAGIC);
                assert_eq!(found, 0xDEAD_BEEF);
            }
            other => panic!("expected BadMagic, got {other:?}"),
        }
    }

    #[test]
    fn test_attach_rejects_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "version", 4, SMALL_SLOT);
        let channel = FrameChannel::open(&config).unwrap();
        let path = channel.backing_path().to_path_buf();
        drop(channel);

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(4)).unwrap();
        file.write_all(&(CHANNEL_VERSION + 1).to_ne_bytes()).unwrap();
        drop(file);

        match FrameChannel::open(&config) {
            Err(TransportError::BadVersion { expected, found }) => {
                assert_eq!(expected, CHANNEL_VERSION);
                assert_eq!(found, CHANNEL_VERSION + 1);
            }
            other => panic!("expected BadVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        let dir = TempDir::new().unwrap();

        let too_few = test_config(&dir, "one_slot", 1, SMALL_SLOT);
        assert!(matches!(
            FrameChannel::open(&too_few),
            Err(TransportError::BadGeometry(_))
        ));

        let no_payload = test_config(&dir, "tiny_slot", 4, SLOT_HEADER_SIZE as u32);
        assert!(matches!(
            FrameChannel::open(&no_payload),
            Err(TransportError::BadGeometry(_))
        ));
    }

    #[test]
    fn test_cross_instance_producer_consumer() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "threads", 32, SMALL_SLOT);
        const COUNT: u64 = 20;

        // Create before spawning so the producer attaches.
        let mut consumer = FrameChannel::open(&config).unwrap();

        let producer_config = config.clone();
        let producer = thread::spawn(move || {
            let mut channel = FrameChannel::open(&producer_config).unwrap();
            assert_eq!(channel.role(), ChannelRole::Attached);
            for tag in 0..COUNT {
                channel.write_frame(&test_frame(tag as u8)).unwrap();
            }
        });

        let mut received = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while received.len() < COUNT as usize {
            assert!(std::time::Instant::now() < deadline, "consumer timed out");
            consumer.wait_for_frame(Some(Duration::from_millis(100)));
            while let Some(frame) = consumer.read_frame().unwrap() {
                received.push(frame);
            }
        }
        producer.join().unwrap();

        // 32 slots comfortably hold 20 frames: nothing dropped, exact order.
        for (i, frame) in received.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64);
            assert_eq!(frame.data, test_frame(i as u8).data);
        }
    }
}
