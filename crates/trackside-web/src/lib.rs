#![forbid(unsafe_code)]

//! `trackside-web` runs the scene engine inside a host-driven page.
//!
//! Design goals:
//! - **Host-driven I/O**: the embedding page pushes scenes, delta batches,
//!   resize signals, and clicks; nothing here registers timers itself.
//! - **Deterministic time**: the host advances a monotonic clock explicitly.
//! - **No blocking / no threads**: suitable for `wasm32-unknown-unknown`.
//!
//! [`CanvasHost`](host::CanvasHost) is the single entry point the page calls
//! from its interval timer, resize observer, and poll timer.
//! [`RecordingSurface`](recording::RecordingSurface) stands in for the
//! drawing library in tests and replays.

pub mod host;
#[cfg(feature = "payload-parser")]
pub mod payload;
pub mod recording;

use core::time::Duration;

use web_time::Instant;

pub use host::{CanvasHost, DEFAULT_REPORT_CAPACITY, StepResult};
#[cfg(feature = "payload-parser")]
pub use payload::{PayloadError, TickPayload, decode_scene, decode_tick};
pub use recording::{FailOn, RecordedOp, RecordingSurface, SlotView, SurfaceOp};

/// Deterministic monotonic clock controlled by the host.
///
/// The engine works on [`Instant`]s, so the clock anchors its offset to an
/// origin taken at construction.
#[derive(Debug, Clone, Copy)]
pub struct DeterministicClock {
    origin: Instant,
    now: Duration,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            now: Duration::ZERO,
        }
    }

    /// Set current monotonic time. Never moves backwards.
    pub fn set(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }

    /// Time since the clock started.
    #[must_use]
    pub const fn now_mono(&self) -> Duration {
        self.now
    }

    /// Current time as an engine instant.
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.origin + self.now
    }
}

impl Default for DeterministicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_and_never_rewinds() {
        let mut clock = DeterministicClock::new();
        let start = clock.instant();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_mono(), Duration::from_millis(250));
        clock.set(Duration::from_millis(100));
        assert_eq!(clock.now_mono(), Duration::from_millis(250));
        assert_eq!(clock.instant() - start, Duration::from_millis(250));
    }
}
