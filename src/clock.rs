//! Wall-clock time as seen by the transactor.
//!
//! Every transaction stamps a `:db/txInstant` datom with the `Instant` the
//! transactor observed at the moment it ran. Tests substitute `MockClock` so
//! that transaction instants are deterministic and comparable.

use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(pub i64);

impl Instant {
    pub const EPOCH: Instant = Instant(0);
}

impl std::fmt::Display for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Reads the system clock. This is the `Clock` a persistent connection uses
/// outside of tests.
#[derive(Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Instant(millis as i64)
    }
}

/// A clock whose value advances by one millisecond on every read, so that
/// transactions in the same test produce distinct, ordered instants without
/// depending on real wall-clock time.
pub struct MockClock {
    now: AtomicI64,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: AtomicI64::new(0),
        }
    }

    pub fn at(instant: i64) -> Self {
        Self {
            now: AtomicI64::new(instant),
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant(self.now.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_on_every_read() {
        let clock = MockClock::new();
        assert_eq!(Instant(0), clock.now());
        assert_eq!(Instant(1), clock.now());
        assert_eq!(Instant(2), clock.now());
    }
}
