//! Capture metrics and operation timing.
//!
//! Fire-and-forget observability: components record into atomic counters
//! and scoped timers, and nothing here ever influences control flow or
//! fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::trace;

/// Counters for the capture pipeline.
#[derive(Default)]
pub struct CaptureMetrics {
    frames_extracted: AtomicU64,
    extraction_failures: AtomicU64,
}

impl CaptureMetrics {
    /// Create a zeroed collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful extraction.
    pub fn record_frame_extracted(&self) {
        self.frames_extracted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed or aborted extraction.
    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Start a scoped timer; the elapsed time is traced when the returned
    /// guard drops.
    pub fn start_operation(&self, name: &'static str) -> Operation {
        Operation {
            name,
            start: Instant::now(),
        }
    }

    /// Current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames successfully extracted.
    pub frames_extracted: u64,
    /// Extractions that failed or were aborted.
    pub extraction_failures: u64,
}

/// Scoped operation timer handed out by
/// [`CaptureMetrics::start_operation`].
pub struct Operation {
    name: &'static str,
    start: Instant,
}

impl Drop for Operation {
    fn drop(&mut self) {
        trace!(
            operation = self.name,
            elapsed_us = self.start.elapsed().as_micros() as u64,
            "operation finished"
        );
    }
}
