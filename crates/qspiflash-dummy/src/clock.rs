//! Clock that only moves when someone sleeps on it

use std::cell::Cell;
use std::time::Duration;

use qspiflash_core::Clock;

/// Manually advanced clock
///
/// `sleep` advances time instead of blocking, by at least `min_step`, so a
/// poll loop with a 30 second budget finishes in a few thousand
/// iterations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<Duration>,
    min_step: Duration,
}

impl ManualClock {
    /// Clock at zero advancing at least 1 ms per sleep
    pub fn new() -> Self {
        Self::with_min_step(Duration::from_millis(1))
    }

    /// Clock at zero advancing at least `min_step` per sleep
    pub fn with_min_step(min_step: Duration) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            min_step,
        }
    }

    /// Time slept so far
    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }

    /// Move time forward by `d`
    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get().saturating_add(d));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.max(self.min_step));
    }
}
