//! Comments attached to projects, tasks or timesheet entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::text_enum;

text_enum!(ResourceType {
    Project => "project",
    Task => "task",
    Timesheet => "timesheet",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub author_id: String,
    pub body: String,
    /// Members resolved from `@name` tokens in the body
    pub mention_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub body: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

/// Body for editing a comment or posting a reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBodyRequest {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentQuery {
    pub resource_type: ResourceType,
    pub resource_id: String,
}
