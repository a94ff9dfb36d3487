//! Reminder and test-notification dispatch as seen from the foreground view.
//!
//! Delivery goes through the background worker whenever one is reachable so
//! the notification does not depend on the view being visible. Only when no
//! worker path exists does the view show the notification itself.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ChannelError, NotificationError};
use crate::medication::{DailyStatus, MedicationList};
use crate::notifications::{
    NotificationRequest, NotificationSink, PermissionHandle, ReminderSummary,
};
use crate::reminder::ReminderTime;

/// Sending side of the foreground-to-worker channel.
pub trait WorkerRoute: Send + Sync {
    fn schedule_reminder(&self, reminder_time: ReminderTime) -> Result<(), ChannelError>;
    fn test_notification(&self) -> Result<(), ChannelError>;
    fn send_reminder(&self, summary: ReminderSummary) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing left to take, or no medications at all.
    NothingOutstanding,
    PermissionNotGranted,
    RoutedToWorker(Option<ReminderSummary>),
    ShownDirectly(Option<ReminderSummary>),
    /// The direct path failed too; deferred to the next tick.
    Failed(NotificationError),
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, Self::RoutedToWorker(_) | Self::ShownDirectly(_))
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    permission: PermissionHandle,
    direct: Arc<dyn NotificationSink>,
    worker: Option<Arc<dyn WorkerRoute>>,
}

impl Dispatcher {
    pub fn new(permission: PermissionHandle, direct: Arc<dyn NotificationSink>) -> Self {
        Self {
            permission,
            direct,
            worker: None,
        }
    }

    pub fn with_worker(mut self, worker: Arc<dyn WorkerRoute>) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Computes what is left to take and, when anything is, delivers a reminder.
    pub fn dispatch_reminder(
        &self,
        medications: &MedicationList,
        status: &DailyStatus,
    ) -> DispatchOutcome {
        let Some(summary) = ReminderSummary::compute(medications, status) else {
            info!(
                total = medications.len(),
                "all medications taken or none configured, no reminder"
            );
            return DispatchOutcome::NothingOutstanding;
        };
        info!(
            remaining = summary.remaining.len(),
            total = summary.total,
            "sending reminder"
        );

        if !self.permission.get().is_granted() {
            warn!(permission = %self.permission.get(), "notification permission not granted");
            return DispatchOutcome::PermissionNotGranted;
        }

        if let Some(worker) = &self.worker {
            match worker.send_reminder(summary.clone()) {
                Ok(()) => return DispatchOutcome::RoutedToWorker(Some(summary)),
                Err(err) => warn!(%err, "falling back to direct reminder"),
            }
        }

        match self.direct.show(NotificationRequest::reminder(&summary)) {
            Ok(()) => DispatchOutcome::ShownDirectly(Some(summary)),
            Err(err) => {
                warn!(%err, "reminder delivery failed");
                DispatchOutcome::Failed(err)
            }
        }
    }

    /// Fires the fixed confirmation regardless of medication state.
    pub fn dispatch_test(&self) -> DispatchOutcome {
        if !self.permission.get().is_granted() {
            warn!(permission = %self.permission.get(), "enable notifications before testing");
            return DispatchOutcome::PermissionNotGranted;
        }

        if let Some(worker) = &self.worker {
            match worker.test_notification() {
                Ok(()) => return DispatchOutcome::RoutedToWorker(None),
                Err(err) => warn!(%err, "falling back to direct test notification"),
            }
        }

        match self.direct.show(NotificationRequest::test()) {
            Ok(()) => DispatchOutcome::ShownDirectly(None),
            Err(err) => {
                warn!(%err, "test notification delivery failed");
                DispatchOutcome::Failed(err)
            }
        }
    }

    /// Tells the worker about a new reminder time. Returns `false` when no
    /// worker took the message.
    pub fn schedule_reminder(&self, reminder_time: ReminderTime) -> bool {
        let Some(worker) = &self.worker else {
            debug!("no background worker, reminder runs in the view only");
            return false;
        };
        match worker.schedule_reminder(reminder_time) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "cannot reschedule worker reminder");
                false
            }
        }
    }
}
