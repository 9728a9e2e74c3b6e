//! Time abstraction for testability.
//!
//! Reminder thresholds and outgoing `Date:` headers depend on the current
//! time, so everything that needs it goes through a [`Clock`].
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use maildrop_core::time::{Clock, FixedClock};
//!
//! let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
//! assert_eq!(clock.today().to_string(), "2024-03-01");
//! ```

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Abstraction over wall-clock time.
///
/// In production, use [`SystemClock`]. In tests, use [`FixedClock`] to pin
/// time to a known instant.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Returns the time elapsed since `since`, clamped at zero.
    fn age_of(&self, since: DateTime<Utc>) -> TimeDelta {
        (self.now() - since).max(TimeDelta::zero())
    }
}

/// System clock that uses real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant that can be advanced manually.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
