//! Deterministic clock for repository tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

/// A clock that only moves when told to.
///
/// Every call to [`TestClock::now`] advances the time by one millisecond, so
/// consecutive mutations get distinct, ordered timestamps.
#[derive(Debug)]
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
            + Duration::milliseconds(123);
        Self { now: Mutex::new(start) }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        *now += Duration::milliseconds(1);
        *now
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}
