//! Consumer process for a frametap channel.
//!
//! Attaches to (or creates) the named channel, then loops: wait for the
//! producer's wake signal, drain whatever frames are buffered, and report
//! throughput once a second.
//!
//! Usage: `frametap-reader [channel-name] [max-frames]`

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use frametap_transport::{ChannelConfig, FrameChannel};

/// How long one wait on the wake signal lasts before re-polling.
const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(name) => ChannelConfig::with_name(name),
        None => ChannelConfig::default(),
    };
    let max_frames: Option<u64> = match args.next() {
        Some(raw) => Some(raw.parse().context("max-frames must be an integer")?),
        None => None,
    };

    let mut channel = FrameChannel::open(&config)
        .with_context(|| format!("opening channel '{}'", config.name))?;
    info!(
        channel = %channel.name(),
        role = ?channel.role(),
        slots = channel.max_frames(),
        slot_payload = channel.max_payload(),
        "channel open, waiting for frames"
    );

    let mut total: u64 = 0;
    let mut total_bytes: u64 = 0;
    let mut last_sequence: Option<u64> = None;
    let mut window_start = Instant::now();
    let mut window_frames: u64 = 0;

    loop {
        channel.wait_for_frame(Some(WAIT_TIMEOUT));

        while let Some(frame) = channel.read_frame()? {
            if let Some(previous) = last_sequence {
                let gap = frame.sequence.saturating_sub(previous + 1);
                if gap > 0 {
                    debug!(gap, "producer dropped frames while we lagged");
                }
            }
            last_sequence = Some(frame.sequence);
            total += 1;
            window_frames += 1;
            total_bytes += frame.payload_len() as u64;

            if total == 1 {
                info!(
                    width = frame.width,
                    height = frame.height,
                    stride = frame.stride,
                    format = ?frame.format,
                    "first frame received"
                );
            }
        }

        if window_start.elapsed() >= Duration::from_secs(1) {
            if window_frames > 0 {
                let fps = window_frames as f64 / window_start.elapsed().as_secs_f64();
                info!(total, fps = format!("{fps:.1}"), "receiving");
            }
            window_start = Instant::now();
            window_frames = 0;
        }

        if let Some(limit) = max_frames {
            if total >= limit {
                break;
            }
        }
    }

    info!(total, total_bytes, "done");
    Ok(())
}
