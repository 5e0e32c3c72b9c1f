//! Monotonic time source.
//!
//! Timestamps and rate-limit windows are derived from milliseconds since
//! process start, never from the wall clock.

use std::time::Instant;

/// Source of monotonic milliseconds.
pub trait MonotonicClock: Send + Sync {
    /// Milliseconds elapsed since the clock was created.
    fn ticks_ms(&self) -> u64;
}

/// Clock backed by [`std::time::Instant`].
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn ticks_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
