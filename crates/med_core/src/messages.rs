//! Tagged records exchanged between the foreground view and the background worker.

use serde::{Deserialize, Serialize};

use crate::notifications::ReminderSummary;
use crate::reminder::ReminderTime;

/// Foreground to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Re-arm the worker's tick loop for a new reminder time.
    #[serde(rename_all = "camelCase")]
    ScheduleReminder { reminder_time: ReminderTime },
    TestNotification,
    /// Show a reminder with exactly this data.
    SendReminder(ReminderSummary),
}

impl WorkerMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ScheduleReminder { .. } => "SCHEDULE_REMINDER",
            Self::TestNotification => "TEST_NOTIFICATION",
            Self::SendReminder(_) => "SEND_REMINDER",
        }
    }
}

/// Worker to foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Reload the store and run the reminder dispatch with live state.
    CheckReminderNow,
}

impl ClientMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CheckReminderNow => "CHECK_REMINDER_NOW",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn worker_messages_use_wire_tags() {
        let schedule = WorkerMessage::ScheduleReminder {
            reminder_time: "09:15".parse().unwrap(),
        };
        let value = serde_json::to_value(&schedule).unwrap();
        assert_eq!(value, json!({ "type": "SCHEDULE_REMINDER", "reminderTime": "09:15" }));
        assert_eq!(value["type"], schedule.tag());

        let test = serde_json::to_value(WorkerMessage::TestNotification).unwrap();
        assert_eq!(test, json!({ "type": "TEST_NOTIFICATION" }));

        let send: WorkerMessage = serde_json::from_value(json!({
            "type": "SEND_REMINDER",
            "remaining": ["Aspirin"],
            "total": 2,
            "completed": 1
        }))
        .unwrap();
        assert_eq!(
            send,
            WorkerMessage::SendReminder(ReminderSummary {
                remaining: vec!["Aspirin".into()],
                total: 2,
                completed: 1,
            })
        );
    }

    #[test]
    fn client_message_tag() {
        let value = serde_json::to_value(ClientMessage::CheckReminderNow).unwrap();
        assert_eq!(value, json!({ "type": "CHECK_REMINDER_NOW" }));
        assert_eq!(ClientMessage::CheckReminderNow.tag(), "CHECK_REMINDER_NOW");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(serde_json::from_value::<WorkerMessage>(json!({ "type": "SYNC" })).is_err());
    }
}
