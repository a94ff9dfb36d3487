//! Reminder time and the per-tick firing decision.
//!
//! A tick fires only when the current minute equals the configured reminder
//! minute exactly and this context has not already sent a reminder today.
//! Missed minutes are not caught up.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::date_marker;
use crate::error::ParseError;
use crate::store::{keys, LocalStore};

/// Time of day with minute resolution, written as `HH:MM` (24h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ParseError> {
        if hour > 23 || minute > 59 {
            return Err(ParseError::ReminderTime(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    /// Minute of `now`, seconds dropped.
    pub fn of(now: NaiveDateTime) -> Self {
        Self {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn matches(&self, now: NaiveDateTime) -> bool {
        Self::of(now) == *self
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self {
            hour: 18,
            minute: 30,
        }
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::ReminderTime(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

/// Which execution context a last-reminder marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerScope {
    Foreground,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Current minute differs from the reminder minute.
    NotDue,
    /// Minute matched but this context already reminded today.
    AlreadySent,
    Fired,
}

/// At-most-once-per-day guard for one context.
#[derive(Debug, Clone, Copy)]
pub struct ReminderGate {
    key: &'static str,
}

impl ReminderGate {
    /// `shared` makes every scope use the foreground key, so the two
    /// contexts dedupe against each other (last write wins).
    pub fn new(scope: MarkerScope, shared: bool) -> Self {
        let key = match (scope, shared) {
            (MarkerScope::Worker, false) => keys::WORKER_LAST_REMINDER_SENT,
            _ => keys::LAST_REMINDER_SENT,
        };
        Self { key }
    }

    /// Unreadable markers count as "not sent": a duplicate reminder is
    /// preferred over a missed one.
    pub fn sent_on(&self, store: &dyn LocalStore, today: NaiveDate) -> bool {
        match store.get(self.key) {
            Ok(marker) => marker.as_deref() == Some(date_marker(today).as_str()),
            Err(err) => {
                warn!(key = self.key, %err, "cannot read reminder marker");
                false
            }
        }
    }

    pub fn mark_sent(&self, store: &dyn LocalStore, today: NaiveDate) {
        if let Err(err) = store.set(self.key, &date_marker(today)) {
            warn!(key = self.key, %err, "cannot persist reminder marker");
        }
    }

    /// Runs one tick: calls `dispatch` and records today's marker when due.
    pub fn evaluate(
        &self,
        store: &dyn LocalStore,
        now: NaiveDateTime,
        reminder_time: ReminderTime,
        dispatch: impl FnOnce(),
    ) -> TickOutcome {
        if !reminder_time.matches(now) {
            return TickOutcome::NotDue;
        }
        let today = now.date();
        if self.sent_on(store, today) {
            debug!(key = self.key, "reminder already sent today");
            return TickOutcome::AlreadySent;
        }
        dispatch();
        self.mark_sent(store, today);
        TickOutcome::Fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 17)
            .unwrap()
    }

    #[test]
    fn parses_and_formats_hh_mm() {
        let time: ReminderTime = "08:05".parse().unwrap();
        assert_eq!((time.hour(), time.minute()), (8, 5));
        assert_eq!(time.to_string(), "08:05");
        assert_eq!("7:30".parse::<ReminderTime>().unwrap().to_string(), "07:30");
        for bad in ["24:00", "12:60", "1230", "12:5", "ab:cd", "", "+8:00", "08:+5", "-1:00"] {
            assert!(bad.parse::<ReminderTime>().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let time = ReminderTime::new(9, 15).unwrap();
        assert_eq!(serde_json::to_string(&time).unwrap(), "\"09:15\"");
        let back: ReminderTime = serde_json::from_str("\"09:15\"").unwrap();
        assert_eq!(back, time);
        assert!(serde_json::from_str::<ReminderTime>("\"9h15\"").is_err());
    }

    #[test]
    fn fires_once_per_day() {
        let store = MemoryStore::new();
        let gate = ReminderGate::new(MarkerScope::Foreground, false);
        let time = ReminderTime::new(8, 0).unwrap();
        let mut fired = 0;

        assert_eq!(
            gate.evaluate(&store, at(1, 8, 0), time, || fired += 1),
            TickOutcome::Fired
        );
        assert_eq!(
            gate.evaluate(&store, at(1, 8, 0), time, || fired += 1),
            TickOutcome::AlreadySent
        );
        assert_eq!(
            gate.evaluate(&store, at(1, 8, 1), time, || fired += 1),
            TickOutcome::NotDue
        );
        assert_eq!(
            gate.evaluate(&store, at(2, 8, 0), time, || fired += 1),
            TickOutcome::Fired
        );
        assert_eq!(fired, 2);
    }

    #[test]
    fn per_context_markers_are_independent() {
        let store = MemoryStore::new();
        let time = ReminderTime::new(8, 0).unwrap();
        let foreground = ReminderGate::new(MarkerScope::Foreground, false);
        let worker = ReminderGate::new(MarkerScope::Worker, false);

        assert_eq!(foreground.evaluate(&store, at(1, 8, 0), time, || {}), TickOutcome::Fired);
        assert_eq!(worker.evaluate(&store, at(1, 8, 0), time, || {}), TickOutcome::Fired);
    }

    #[test]
    fn shared_marker_dedupes_across_contexts() {
        let store = MemoryStore::new();
        let time = ReminderTime::new(8, 0).unwrap();
        let foreground = ReminderGate::new(MarkerScope::Foreground, true);
        let worker = ReminderGate::new(MarkerScope::Worker, true);

        assert_eq!(foreground.evaluate(&store, at(1, 8, 0), time, || {}), TickOutcome::Fired);
        assert_eq!(
            worker.evaluate(&store, at(1, 8, 0), time, || {}),
            TickOutcome::AlreadySent
        );
    }
}
