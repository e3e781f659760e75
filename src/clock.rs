//! Time sources for the profiler
//!
//! Every timestamp the engine records is a floating point millisecond value
//! read from a [`Clock`]. Production code uses [`SystemClock`]; tests and the
//! CLI demo use [`ManualClock`] so timings are exact and reproducible.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic millisecond time source
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary, fixed origin
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually advanced clock
///
/// Clones share the same underlying time, so a workload can hold one handle
/// and advance it while the profiler reads another.
///
/// # Example
/// ```
/// use frametrack::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let handle = clock.clone();
/// handle.advance(10.0);
/// assert_eq!(clock.now_ms(), 10.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `delta_ms`
    pub fn advance(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms);
    }

    /// Jump to an absolute time
    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}
