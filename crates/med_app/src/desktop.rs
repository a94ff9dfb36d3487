//! Desktop notifications through the freedesktop / platform notification service.

use med_core::error::NotificationError;
use med_core::notifications::{NotificationRequest, NotificationSink, APP_TITLE};
use notify_rust::{Notification, Timeout};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopSink;

impl NotificationSink for DesktopSink {
    fn show(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        let mut notification = Notification::new();
        notification
            .appname(APP_TITLE)
            .summary(&request.title)
            .body(&request.body)
            .icon("appointment-soon");
        for button in &request.actions {
            notification.action(button.action.id(), &button.title);
        }
        if request.require_interaction {
            notification.timeout(Timeout::Never);
        }
        notification
            .show()
            .map_err(|err| NotificationError::Delivery(err.to_string()))?;
        debug!(tag = %request.tag, "desktop notification shown");
        Ok(())
    }
}
