//! Host-local wall clock.
//!
//! Both contexts read "now" through [`Clock`] so that tick decisions can be
//! driven deterministically in tests. No timezone conversion happens anywhere:
//! the naive local date and time are what the device reports.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock whose reading only changes when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

/// String form of a calendar date as persisted in the day markers.
pub fn date_marker(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
