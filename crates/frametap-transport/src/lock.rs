//! Cross-process region lock.
//!
//! A single exclusive lock serializes all index mutation and slot access in
//! the shared region. Reads take it too: a read advances the consumer
//! index, so it is a write at the index level and a shared/reader form
//! would race. The lock word lives in the mapped header so both processes
//! contend on the same atomic; holders only ever cover bounded memory
//! copies, never I/O or the wake signal.

use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Exclusive lock over a shared-region lock word.
pub(crate) struct RegionLock<'a> {
    word: &'a AtomicU32,
}

impl<'a> RegionLock<'a> {
    pub(crate) fn new(word: &'a AtomicU32) -> Self {
        Self { word }
    }

    /// Acquire the lock, spinning briefly before yielding the thread.
    pub(crate) fn lock(&self) -> RegionGuard<'a> {
        let mut spins = 0u32;
        while self
            .word
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins = spins.wrapping_add(1);
            if spins % 64 == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
        RegionGuard { word: self.word }
    }
}

/// Guard releasing the region lock on drop.
pub(crate) struct RegionGuard<'a> {
    word: &'a AtomicU32,
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }
}
