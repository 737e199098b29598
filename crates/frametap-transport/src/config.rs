//! Channel configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::layout::{DEFAULT_MAX_FRAMES, DEFAULT_SLOT_SIZE};

/// Configuration for opening a frame channel.
///
/// Geometry (`max_frames`, `slot_size`) only applies when this process
/// creates the channel; attaching to an existing channel takes the
/// geometry from its header. There is no in-place resize — a channel with
/// different geometry is a new channel under a new name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Process-wide unique channel name. The backing file and the wake
    /// signal name are both derived from it.
    pub name: String,

    /// Number of ring slots (default: 4, buffering up to 3 frames).
    pub max_frames: u32,

    /// Fixed slot size in bytes, slot header included (default: a
    /// 1920x1080 RGBA frame plus the slot header).
    pub slot_size: u32,

    /// Directory for the backing file (default: the system temporary
    /// directory).
    pub directory: Option<PathBuf>,
}

impl ChannelConfig {
    /// Configuration with default geometry for the given channel name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Path of the file backing the mapped region.
    pub fn backing_path(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("{}.ring", self.name))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "frametap_frames".to_string(),
            max_frames: DEFAULT_MAX_FRAMES,
            slot_size: DEFAULT_SLOT_SIZE,
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_path_derives_from_name() {
        let config = ChannelConfig::with_name("session42");
        assert!(config
            .backing_path()
            .to_string_lossy()
            .ends_with("session42.ring"));
    }

    #[test]
    fn test_directory_override() {
        let config = ChannelConfig {
            directory: Some(PathBuf::from("/dev/shm")),
            ..ChannelConfig::with_name("fast")
        };
        assert_eq!(config.backing_path(), PathBuf::from("/dev/shm/fast.ring"));
    }
}
