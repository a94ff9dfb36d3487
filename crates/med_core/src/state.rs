use chrono::NaiveDate;
use tracing::warn;

use crate::error::StoreError;
use crate::medication::{DailyStatus, MedicationList, Progress};
use crate::notifications::ReminderSummary;
use crate::reminder::ReminderTime;
use crate::reset::{apply_daily_reset, ResetOutcome};
use crate::store::{keys, LocalStore, LocalStoreExt};

/// Application state owned by the foreground view. Loaded from the store on
/// activation and written back after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub medications: MedicationList,
    pub status: DailyStatus,
    pub reminder_time: ReminderTime,
}

impl AppState {
    /// Reads every key independently. Missing, unreadable or malformed values
    /// fall back to their defaults.
    pub fn load(store: &dyn LocalStore, default_time: ReminderTime) -> Self {
        let medications = match store.get_json::<Vec<String>>(keys::MEDICATIONS) {
            Ok(names) => MedicationList::from_names(names.unwrap_or_default()),
            Err(err) => {
                warn!(%err, "cannot load medication list");
                MedicationList::new()
            }
        };
        let status = match store.get_json::<DailyStatus>(keys::DAILY_STATUS) {
            Ok(status) => status.unwrap_or_default(),
            Err(err) => {
                warn!(%err, "cannot load daily status");
                DailyStatus::new()
            }
        };
        let reminder_time = match store.get(keys::REMINDER_TIME) {
            Ok(Some(raw)) => raw.parse::<ReminderTime>().unwrap_or_else(|err| {
                warn!(%err, "ignoring stored reminder time");
                default_time
            }),
            Ok(None) => default_time,
            Err(err) => {
                warn!(%err, "cannot load reminder time");
                default_time
            }
        };
        Self {
            medications,
            status,
            reminder_time,
        }
    }

    /// Loads and applies the daily reset before anything reads the status.
    pub fn activate(
        store: &dyn LocalStore,
        default_time: ReminderTime,
        today: NaiveDate,
    ) -> (Self, ResetOutcome) {
        let mut state = Self::load(store, default_time);
        let outcome = apply_daily_reset(store, &mut state.status, today);
        (state, outcome)
    }

    /// Writes list, status and reminder time as three separate keys.
    pub fn save(&self, store: &dyn LocalStore) -> Result<(), StoreError> {
        store.set_json(keys::MEDICATIONS, &self.medications)?;
        store.set_json(keys::DAILY_STATUS, &self.status)?;
        store.set(keys::REMINDER_TIME, &self.reminder_time.to_string())?;
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.medications, &self.status)
    }

    pub fn summary(&self) -> Option<ReminderSummary> {
        ReminderSummary::compute(&self.medications, &self.status)
    }
}
