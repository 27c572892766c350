//! Monotonic time source abstraction
//!
//! All timeout arithmetic in the framework goes through [`Clock`] so that
//! tests can drive time manually instead of sleeping. Time is expressed as
//! a [`Duration`] since an arbitrary per-clock epoch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;
}

/// Shared handle to a clock, cloned into every timed component.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`Instant`]. Epoch is the moment of construction.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Create a new system clock.
    #[inline]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Create a shared system clock.
    #[inline]
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a shared manual clock starting at zero.
    #[inline]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Advance the clock by the given amount.
    #[inline]
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Set the clock to an absolute value. Never moves time backwards.
    pub fn set(&self, to: Duration) {
        let mut now = self.now.lock();
        if to > *now {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}
