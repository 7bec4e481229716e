//! Time source for bounded waits

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Clock used by the shutdown wait loop
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block the calling context for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            slept: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
    }

    /// Total time spent in `sleep`
    pub fn slept(&self) -> Duration {
        *self.slept.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        *self.slept.lock() += duration;
    }
}
