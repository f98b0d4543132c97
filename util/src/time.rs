//! Time utilities and the process clock service
//!
//! The [`Clock`] is a process-wide service object created by the executable
//! and handed to every task. It provides a monotonic `now()` for interval
//! arithmetic and `since_epoch()` for message timestamps. Only the time
//! synchronisation authority may call `set_epoch`, which must be idempotent
//! under repeated application.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Epoch adjustments smaller than this are ignored, making repeated
/// `set_epoch` calls with the same source time a no-op.
const EPOCH_SET_TOLERANCE_S: f64 = 0.5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Monotonic process clock with an adjustable epoch offset.
pub struct Clock {
    inner: Mutex<ClockInner>,
}

enum ClockInner {
    /// Wall clock: monotonic instant anchor plus epoch offset.
    Monotonic { start: Instant, epoch_at_start: f64 },

    /// Manually stepped clock for deterministic tests and simulation.
    Manual { now: f64, epoch_at_start: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Clock {
    /// Create a monotonic clock anchored at the current instant, with the
    /// epoch offset initialised from the system time.
    pub fn monotonic() -> Self {
        let epoch_at_start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            inner: Mutex::new(ClockInner::Monotonic {
                start: Instant::now(),
                epoch_at_start,
            }),
        }
    }

    /// Create a manually stepped clock starting at zero.
    pub fn manual() -> Self {
        Self {
            inner: Mutex::new(ClockInner::Manual {
                now: 0.0,
                epoch_at_start: 0.0,
            }),
        }
    }

    /// Seconds elapsed since the clock was created. Monotonic.
    pub fn now(&self) -> f64 {
        match *self.inner.lock().unwrap_or_else(|p| p.into_inner()) {
            ClockInner::Monotonic { start, .. } => start.elapsed().as_secs_f64(),
            ClockInner::Manual { now, .. } => now,
        }
    }

    /// Seconds since the Unix epoch.
    pub fn since_epoch(&self) -> f64 {
        match *self.inner.lock().unwrap_or_else(|p| p.into_inner()) {
            ClockInner::Monotonic {
                start,
                epoch_at_start,
            } => epoch_at_start + start.elapsed().as_secs_f64(),
            ClockInner::Manual {
                now,
                epoch_at_start,
            } => epoch_at_start + now,
        }
    }

    /// Set the epoch time so that `since_epoch()` reads `epoch` now.
    ///
    /// Adjustments below [`EPOCH_SET_TOLERANCE_S`] are ignored, so applying
    /// the same synchronisation repeatedly has no further effect.
    pub fn set_epoch(&self, epoch: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        match *inner {
            ClockInner::Monotonic {
                start,
                ref mut epoch_at_start,
            } => {
                let new_offset = epoch - start.elapsed().as_secs_f64();
                if (new_offset - *epoch_at_start).abs() > EPOCH_SET_TOLERANCE_S {
                    *epoch_at_start = new_offset;
                }
            }
            ClockInner::Manual {
                now,
                ref mut epoch_at_start,
            } => {
                let new_offset = epoch - now;
                if (new_offset - *epoch_at_start).abs() > EPOCH_SET_TOLERANCE_S {
                    *epoch_at_start = new_offset;
                }
            }
        }
    }

    /// Advance a manual clock by `dt` seconds. No effect on monotonic clocks.
    pub fn advance(&self, dt: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        if let ClockInner::Manual { ref mut now, .. } = *inner {
            *now += dt;
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a chrono duration into seconds, or `None` on overflow.
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
