use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{NotificationError, ParseError};
use crate::medication::{DailyStatus, MedicationList};

pub const APP_TITLE: &str = "Medikamenten-Erinnerung";
pub const REMINDER_TITLE: &str = "⏰ Medikamenten-Erinnerung";
pub const REMINDER_TAG: &str = "medication-reminder";
pub const TEST_TAG: &str = "test-notification";
pub const ICON: &str = "./icon-192.png";
pub const APP_URL: &str = "./";

const REMINDER_VIBRATION: [u32; 5] = [200, 100, 200, 100, 200];
const TEST_VIBRATION: [u32; 3] = [200, 100, 200];

/// Outstanding medications for a reminder. Only built when something is left to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSummary {
    pub remaining: Vec<String>,
    pub total: usize,
    pub completed: usize,
}

impl ReminderSummary {
    /// Returns `None` when there is nothing to remind about: no medications,
    /// or every listed medication is marked taken.
    pub fn compute(medications: &MedicationList, status: &DailyStatus) -> Option<Self> {
        let total = medications.len();
        let remaining: Vec<String> = medications
            .iter()
            .filter(|name| !status.is_taken(name))
            .map(str::to_string)
            .collect();
        let completed = total - remaining.len();
        if total == 0 || completed == total {
            return None;
        }
        Some(Self {
            remaining,
            total,
            completed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    View,
    Dismiss,
}

impl NotificationAction {
    pub fn id(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Dismiss => "dismiss",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::View => "Anzeigen",
            Self::Dismiss => "Schließen",
        }
    }
}

impl FromStr for NotificationAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "view" => Ok(Self::View),
            "dismiss" => Ok(Self::Dismiss),
            other => Err(ParseError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub action: NotificationAction,
    pub title: String,
}

impl From<NotificationAction> for ActionButton {
    fn from(action: NotificationAction) -> Self {
        Self {
            action,
            title: action.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub icon: String,
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    pub actions: Vec<ActionButton>,
    pub url: Option<String>,
}

impl NotificationRequest {
    /// Reminder listing the outstanding medications by name.
    pub fn reminder(summary: &ReminderSummary) -> Self {
        let body = format!(
            "Sie haben noch {} von {} Medikament(en) zu nehmen:\n{}",
            summary.remaining.len(),
            summary.total,
            summary.remaining.join(", ")
        );
        Self::reminder_with_body(body)
    }

    /// Reminder for when only the stored state was available and names are not listed.
    pub fn generic_reminder() -> Self {
        Self::reminder_with_body(
            "Es ist Zeit für Ihre Medikamente. Öffnen Sie die App, um zu sehen, was noch fehlt."
                .to_string(),
        )
    }

    /// Fixed confirmation used to validate permission and delivery.
    pub fn test() -> Self {
        Self {
            title: APP_TITLE.to_string(),
            body: "Test-Benachrichtigung erfolgreich! 🎉".to_string(),
            tag: TEST_TAG.to_string(),
            icon: ICON.to_string(),
            require_interaction: false,
            vibrate: TEST_VIBRATION.to_vec(),
            actions: Vec::new(),
            url: None,
        }
    }

    fn reminder_with_body(body: String) -> Self {
        Self {
            title: REMINDER_TITLE.to_string(),
            body,
            tag: REMINDER_TAG.to_string(),
            icon: ICON.to_string(),
            require_interaction: true,
            vibrate: REMINDER_VIBRATION.to_vec(),
            actions: vec![
                NotificationAction::View.into(),
                NotificationAction::Dismiss.into(),
            ],
            url: Some(APP_URL.to_string()),
        }
    }
}

/// Host notification permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// Not asked yet.
    #[default]
    Default,
}

impl Permission {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    pub fn status_line(self) -> &'static str {
        match self {
            Self::Granted => "Status: ✅ Benachrichtigungen aktiviert",
            Self::Denied => {
                "Status: ❌ Benachrichtigungen blockiert (in Browsereinstellungen ändern)"
            }
            Self::Default => "Status: ⚠️ Benachrichtigungen nicht aktiviert",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        })
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "default" | "prompt" => Ok(Self::Default),
            other => Err(format!("unknown permission state `{other}`")),
        }
    }
}

/// Permission state shared by every context of one host.
#[derive(Debug, Clone, Default)]
pub struct PermissionHandle(Arc<RwLock<Permission>>);

impl PermissionHandle {
    pub fn new(permission: Permission) -> Self {
        Self(Arc::new(RwLock::new(permission)))
    }

    pub fn get(&self) -> Permission {
        *self.0.read()
    }

    /// Applies the user's answer to a permission prompt. Only an unanswered
    /// prompt can change; a denial sticks until changed in host settings.
    pub fn resolve(&self, answer: Permission) -> Permission {
        let mut current = self.0.write();
        if *current == Permission::Default {
            *current = answer;
        }
        *current
    }

    pub fn set(&self, permission: Permission) {
        *self.0.write() = permission;
    }
}

/// Platform-specific notification adapters implement this trait.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: NotificationRequest) -> Result<(), NotificationError>;

    fn close(&self, _tag: &str) {}
}

/// Sink that only writes the notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show(&self, notification: NotificationRequest) -> Result<(), NotificationError> {
        tracing::info!(
            title = %notification.title,
            tag = %notification.tag,
            body = %notification.body,
            "notification shown"
        );
        Ok(())
    }
}

/// Sink that keeps every shown notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<NotificationRequest>>,
    closed: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<NotificationRequest> {
        self.shown.lock().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().clone()
    }

    pub fn count_tagged(&self, tag: &str) -> usize {
        self.shown.lock().iter().filter(|n| n.tag == tag).count()
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, notification: NotificationRequest) -> Result<(), NotificationError> {
        self.shown.lock().push(notification);
        Ok(())
    }

    fn close(&self, tag: &str) {
        self.closed.lock().push(tag.to_string());
    }
}
