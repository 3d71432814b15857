//! Monotonic time source for bounded polling
//!
//! Every busy-wait in the driver is bounded by a [`Deadline`] computed from a
//! [`Clock`], so the bound holds in wall-clock time no matter how long each
//! sleep actually takes. Tests inject a manual clock to make 30 second
//! budgets expire instantly.

use core::time::Duration;

/// A monotonic clock with a blocking sleep
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed origin
    fn now(&self) -> Duration;

    /// Block the calling thread for (at least) `d`
    fn sleep(&self, d: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
}

/// A point in time after which a poll loop gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Duration,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after<C: Clock + ?Sized>(clock: &C, budget: Duration) -> Self {
        Self {
            at: clock.now().saturating_add(budget),
        }
    }

    /// Whether the deadline has passed
    pub fn expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now() >= self.at
    }
}

/// Clock backed by `std::time::Instant` and `std::thread::sleep`
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}
