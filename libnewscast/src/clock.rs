//! Wall-clock abstraction
//!
//! Everything that depends on "now" (same-day filtering, quota windows, ledger
//! dates) reads it through a [`Clock`], so tests can pin time across day and
//! window boundaries.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock backed by `Utc::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable clock for tests
///
/// Clones share the same instant, so a test can keep one handle while the
/// orchestrator owns another.
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use libnewscast::clock::{Clock, MockClock};
///
/// let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
/// let clock = MockClock::new(start);
/// clock.advance(Duration::minutes(1));
/// assert_eq!(clock.now(), start + Duration::minutes(1));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap();
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock().unwrap() = to;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }
}
