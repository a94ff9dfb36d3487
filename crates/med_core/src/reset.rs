//! Daily reset of the "taken" flags.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::clock::date_marker;
use crate::medication::DailyStatus;
use crate::store::{keys, LocalStore, LocalStoreExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Cleared,
    Unchanged,
}

/// `true` when the stored reset marker is not `today`. An unreadable marker
/// counts as stale.
pub fn is_stale(store: &dyn LocalStore, today: NaiveDate) -> bool {
    match store.get(keys::LAST_RESET) {
        Ok(marker) => marker.as_deref() != Some(date_marker(today).as_str()),
        Err(err) => {
            warn!(%err, "cannot read last reset marker");
            true
        }
    }
}

/// Clears and persists `status` when the calendar day changed since the last
/// reset, then records `today` as the reset date. Idempotent within a day.
///
/// Must run before anything reads `status` for display or reminders.
pub fn apply_daily_reset(
    store: &dyn LocalStore,
    status: &mut DailyStatus,
    today: NaiveDate,
) -> ResetOutcome {
    if !is_stale(store, today) {
        return ResetOutcome::Unchanged;
    }
    status.clear();
    if let Err(err) = store.set_json(keys::DAILY_STATUS, &*status) {
        warn!(%err, "cannot persist cleared daily status");
    }
    if let Err(err) = store.set(keys::LAST_RESET, &date_marker(today)) {
        warn!(%err, "cannot persist last reset marker");
    }
    info!(today = %today, "daily status reset for new day");
    ResetOutcome::Cleared
}

/// Read-only variant for contexts that must not write the reset: drops the
/// flags in memory when they belong to an earlier day.
pub fn discard_if_stale(store: &dyn LocalStore, status: &mut DailyStatus, today: NaiveDate) {
    if is_stale(store, today) {
        status.clear();
    }
}
