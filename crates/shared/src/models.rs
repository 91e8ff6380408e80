//! Payload models carried over the real-time channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    #[default]
    Info,
    Warning,
    Error,
    Success,
    /// Any kind this client does not know yet; shown like a plain notice.
    #[serde(other)]
    Unknown,
}

/// A notification as delivered by `notification:new`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Partial notification fanned out by `notification:broadcast`.
///
/// The receiver fills in identity, read flag and timestamp when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NotificationDraft {
    /// User id stamped on broadcasts until the server supplies a real one.
    pub const PLACEHOLDER_USER: &'static str = "current-user";

    /// Complete the draft into an unread notification.
    pub fn complete(self) -> Notification {
        Notification {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: self
                .user_id
                .unwrap_or_else(|| Self::PLACEHOLDER_USER.to_string()),
            kind: self.kind,
            title: self.title,
            message: self.message,
            read: false,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            data: self.data,
        }
    }
}

/// Payload of `notification:read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRead {
    pub id: String,
}

/// Payload of the generic `notification` system event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemNotice {
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub message: String,
}
