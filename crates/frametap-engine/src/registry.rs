//! In-process frame observer registry.

use parking_lot::Mutex;
use tracing::{debug, warn};

use frametap_capture::FrameCallback;
use frametap_types::FrameBuffer;

/// Stable handle returned by [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(usize);

/// Append-only list of frame observers with tombstoned removal.
///
/// Handles are indices into the list. Unregistering replaces the slot with
/// a tombstone instead of erasing it, so handles held elsewhere never go
/// stale or alias a different callback.
pub struct CallbackRegistry {
    slots: Mutex<Vec<Option<FrameCallback>>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Add an observer; the returned handle stays valid until
    /// [`clear`](Self::clear).
    pub fn register(&self, callback: FrameCallback) -> CallbackHandle {
        let mut slots = self.slots.lock();
        slots.push(Some(callback));
        let handle = CallbackHandle(slots.len() - 1);
        debug!(handle = handle.0, "frame callback registered");
        handle
    }

    /// Tombstone an observer. Unknown or already-removed handles are
    /// ignored with a warning.
    pub fn unregister(&self, handle: CallbackHandle) {
        let mut slots = self.slots.lock();
        match slots.get_mut(handle.0) {
            Some(slot) => {
                *slot = None;
                debug!(handle = handle.0, "frame callback unregistered");
            }
            None => warn!(handle = handle.0, "unregister of unknown callback handle"),
        }
    }

    /// Invoke every live observer with the frame, in registration order.
    pub fn deliver(&self, frame: &FrameBuffer) {
        let slots = self.slots.lock();
        for callback in slots.iter().flatten() {
            callback(frame);
        }
    }

    /// Number of live (non-tombstoned) observers.
    pub fn active(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// Drop all observers; existing handles become meaningless.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
