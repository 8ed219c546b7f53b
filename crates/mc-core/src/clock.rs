//! A monotonic, injectable source of UTC timestamps.
//!
//! Every store that timestamps an entity takes a `&dyn Clock` rather than
//! calling `Utc::now()` directly, so tests can pin time deterministically
//! (spec.md §9 Open Question (ii) — ticker jitter and timestamp assertions
//! must be reproducible under test).

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock — wraps [`Utc::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns the same instant until advanced.
///
/// Gated behind the `testing` feature (or this crate's own `#[cfg(test)]`
/// builds): gives deterministic timestamps for schedule/lease/lock expiry
/// assertions, and must never be reachable from a production build.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct StepClock {
    micros: AtomicI64,
}

#[cfg(any(test, feature = "testing"))]
impl StepClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
        }
    }

    /// Advance the clock by `delta` and return the new instant.
    pub fn advance(&self, delta: chrono::Duration) -> DateTime<Utc> {
        let added = delta.num_microseconds().unwrap_or(0);
        let new_micros = self.micros.fetch_add(added, Ordering::SeqCst) + added;
        DateTime::from_timestamp_micros(new_micros).expect("valid timestamp")
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.micros.load(Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).expect("valid timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn step_clock_holds_until_advanced() {
        let start = Utc::now();
        let clock = StepClock::new(start);
        assert_eq!(clock.now(), clock.now());
        let advanced = clock.advance(chrono::Duration::seconds(5));
        assert_eq!(clock.now(), advanced);
        assert!(clock.now() > start);
    }
}
