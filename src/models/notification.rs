//! In-app notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{text_enum, ResourceType};

text_enum!(NotificationKind {
    Assignment => "assignment",
    Mention => "mention",
    Edit => "edit",
    Comment => "comment",
    Deadline => "deadline",
    Approval => "approval",
    System => "system",
});

text_enum!(NotificationStatus {
    Unread => "unread",
    Read => "read",
    Archived => "archived",
});

text_enum!(Channel {
    App => "app",
    Email => "email",
    AppAndEmail => "app_and_email",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub status: NotificationStatus,
    pub channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be stored.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub resource: Option<(ResourceType, String)>,
    pub channel: Channel,
}

impl NewNotification {
    pub fn new(
        recipient_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            resource: None,
            channel: Channel::App,
        }
    }

    pub fn on(mut self, resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        self.resource = Some((resource_type, resource_id.into()));
        self
    }

    pub fn via(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Relative link to the linked resource.
    pub fn action_url(&self) -> Option<String> {
        self.resource.as_ref().map(|(kind, id)| match kind {
            ResourceType::Project => format!("/projects/{}", id),
            ResourceType::Task => format!("/tasks/{}", id),
            ResourceType::Timesheet => format!("/timesheets/{}", id),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    #[serde(default)]
    pub status: Option<NotificationStatus>,
    #[serde(default)]
    pub kind: Option<NotificationKind>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Notification page plus the unread counter shown in badges.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub items: Vec<Notification>,
    pub total: i64,
    pub unread: i64,
}
