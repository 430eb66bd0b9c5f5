//! Task model: one level of subtasks, dependencies and attachments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{text_enum, ChangeRecord, Priority};

text_enum!(TaskStatus {
    Todo => "todo",
    InProgress => "in_progress",
    Paused => "paused",
    InReview => "in_review",
    Done => "done",
    Cancelled => "cancelled",
});

impl TaskStatus {
    /// Done and cancelled tasks no longer carry load.
    pub fn is_open(&self) -> bool {
        !matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_ids: Vec<String>,
    pub estimated_hours: f64,
    /// Maintained by the timesheet roll-up only
    pub actual_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<NaiveDate>,
    /// Completion percentage, 0..=100
    pub progress: i64,
    pub dependency_ids: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
    pub history: Vec<ChangeRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Task {
    pub fn is_assigned_to(&self, member_id: &str) -> bool {
        self.assignee_ids.iter().any(|m| m == member_id)
    }

    /// Planned end passed while the task is still open.
    pub fn is_late(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.planned_end.is_some_and(|end| end < today)
    }
}

/// Request body for creating a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub planned_start: Option<NaiveDate>,
    #[serde(default)]
    pub planned_end: Option<NaiveDate>,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub dependency_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_status() -> TaskStatus {
    TaskStatus::Todo
}

fn default_priority() -> Priority {
    Priority::Normal
}

/// Request body for updating a task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignee_ids: Option<Vec<String>>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub planned_start: Option<NaiveDate>,
    #[serde(default)]
    pub planned_end: Option<NaiveDate>,
    #[serde(default)]
    pub actual_start: Option<NaiveDate>,
    #[serde(default)]
    pub actual_end: Option<NaiveDate>,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub dependency_ids: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for `PUT /tasks/{id}/progress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub progress: i64,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for attaching a file reference to a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub name: String,
    pub url: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
    #[serde(default)]
    pub size: i64,
}

fn default_mime() -> String {
    "application/octet-stream".to_string()
}

/// Query parameters for listing tasks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Only top-level tasks when true
    #[serde(default)]
    pub root_only: bool,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}
