//! Time utilities for the session clock and relay uptime

use std::time::{Duration, Instant};

/// Process start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Frame duration for a given frame rate
pub fn frame_duration(frame_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / frame_rate.max(1) as u64)
}

/// Monotonic game clock.
///
/// Advanced only by the frame loop so timers and hazard rise never drift
/// apart, and tests can drive it deterministically. Timers read whole
/// milliseconds; the sub-millisecond remainder is carried between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionClock {
    now_us: u64,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_us / 1000
    }

    /// Advance the clock, returning the elapsed seconds as f32
    pub fn advance(&mut self, dt: Duration) -> f32 {
        self.now_us += dt.as_micros() as u64;
        dt.as_secs_f32()
    }
}
