//! Timesheet entry model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{double_option, text_enum};

text_enum!(TimesheetStatus {
    Draft => "draft",
    Submitted => "submitted",
    Approved => "approved",
    Rejected => "rejected",
});

/// Hours accepted on a single entry.
pub const MIN_ENTRY_HOURS: f64 = 0.25;
pub const MAX_ENTRY_HOURS: f64 = 24.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetEntry {
    pub id: String,
    pub member_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub date: NaiveDate,
    pub hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TimesheetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_comment: Option<String>,
    /// Cost charged to the project when the entry was approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_cost: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimesheetEntry {
    pub fn is_approved(&self) -> bool {
        self.status == TimesheetStatus::Approved
    }

    /// The recorded charge, or `hours * hourly_rate` when none was recorded.
    pub fn charged_cost(&self, hourly_rate: f64) -> f64 {
        self.approved_cost
            .unwrap_or_else(|| self.hours * hourly_rate.max(0.0))
    }
}

/// Request body for creating an entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimesheetRequest {
    /// Defaults to the acting member
    #[serde(default)]
    pub member_id: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub date: NaiveDate,
    pub hours: f64,
    #[serde(default)]
    pub description: Option<String>,
    /// Draft or submitted
    #[serde(default)]
    pub status: Option<TimesheetStatus>,
}

/// Request body for updating a non-approved entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimesheetRequest {
    /// `null` detaches the entry from its task
    #[serde(default, deserialize_with = "double_option")]
    pub task_id: Option<Option<String>>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub hours: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Draft or submitted
    #[serde(default)]
    pub status: Option<TimesheetStatus>,
}

/// Request body for approving an entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub comment: Option<String>,
}

/// Request body for rejecting an entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub comment: String,
}

/// Query parameters for listing entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetFilter {
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<TimesheetStatus>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Optional inclusive date range for time statistics.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| f <= date) && self.to.map_or(true, |t| date <= t)
    }
}
