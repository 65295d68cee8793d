//! Wall-clock abstraction.
//!
//! Timed groups compare the current time against their last refresh. The
//! time source is injected so rotation can be tested, replayed, or driven by
//! a server-authoritative clock instead of the local system time.

use std::cell::Cell;

use chrono::{DateTime, TimeDelta, Utc};

/// A source of the current UTC time.
pub trait Clock {
    /// Return the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Used in tests and when replaying a recorded session.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// The time reported by [`Clock::now`].
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    /// Move the clock forward (or backward, for a negative delta).
    ///
    /// Saturates at the representable range instead of overflowing.
    pub fn advance(&self, delta: TimeDelta) {
        let current = self.now.get();
        let next = current
            .checked_add_signed(delta)
            .unwrap_or(if delta < TimeDelta::zero() {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });
        self.now.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
