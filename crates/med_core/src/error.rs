//! Error types shared by both execution contexts.

use crate::notifications::Permission;

/// Failure reading or writing the local key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid reminder time `{0}`, expected HH:MM")]
    ReminderTime(String),

    #[error("medication name must not be empty")]
    EmptyName,

    #[error("medication `{0}` is already in the list")]
    DuplicateName(String),

    #[error("unknown notification action `{0}`")]
    UnknownAction(String),
}

/// Failure to produce a user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification permission is {0}")]
    PermissionNotGranted(Permission),

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// The background worker dropped its inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("background worker is not reachable")]
    WorkerGone,
}
