use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A locally stored notification. The wire format (camelCase fields,
/// SCREAMING_SNAKE_CASE kinds) matches the records the Linguify server
/// produces, so blobs written by either side deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Producer-side constructor: fresh id, unread, created now, no expiry.
    /// The expiry is filled in later by `lifecycle::process_new`.
    pub fn new(
        kind: NotificationKind,
        priority: NotificationPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            priority,
            title: title.into(),
            message: message.into(),
            is_read: false,
            created_at: Utc::now(),
            expires_at: None,
            data: serde_json::Value::Null,
            actions: Vec::new(),
        }
    }
}

/// Fields a stored notification may be patched with after creation.
/// `created_at`, `priority` and `kind` are immutable by contract.
#[derive(Debug, Clone, Default)]
pub struct NotificationPatch {
    pub is_read: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    LessonReminder,
    Flashcard,
    Achievement,
    Reminder,
    System,
    Announcement,
}

impl NotificationKind {
    /// Per-kind storage ceiling enforced by the lifecycle maintenance pass.
    pub fn max_stored(self) -> usize {
        match self {
            NotificationKind::Achievement => 20,
            NotificationKind::Reminder | NotificationKind::Announcement => 5,
            _ => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

impl NotificationPriority {
    pub fn weight(self) -> f64 {
        match self {
            NotificationPriority::Low => 1.0,
            NotificationPriority::Medium => 2.0,
            NotificationPriority::High => 3.0,
        }
    }

    /// How long a notification of this priority lives when the producer did
    /// not set an explicit expiry.
    pub fn default_ttl(self) -> Duration {
        match self {
            NotificationPriority::Low => Duration::days(7),
            NotificationPriority::Medium => Duration::days(14),
            NotificationPriority::High => Duration::days(30),
        }
    }
}

/// A user-triggerable action attached to a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Api,
    Dismiss,
}

/// Browser-issued push subscription, correlated to server records by
/// `endpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscriptionData {
    pub endpoint: String,
    pub keys: PushSubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}
