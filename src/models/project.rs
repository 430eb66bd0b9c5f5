//! Project model with milestones and modification history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{text_enum, ChangeRecord};

text_enum!(ProjectStatus {
    Planning => "planning",
    InProgress => "in_progress",
    Paused => "paused",
    Done => "done",
    Cancelled => "cancelled",
    Archived => "archived",
});

impl ProjectStatus {
    /// Statuses counted as active in KPIs.
    pub const ACTIVE: [ProjectStatus; 3] = [
        ProjectStatus::Planning,
        ProjectStatus::InProgress,
        ProjectStatus::Paused,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Cancelled and archived projects are frozen.
    pub fn is_closed(&self) -> bool {
        matches!(self, ProjectStatus::Cancelled | ProjectStatus::Archived)
    }
}

text_enum!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

/// A dated checkpoint within a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub planned_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_date: Option<NaiveDate>,
    #[serde(default)]
    pub reached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub planned_start: NaiveDate,
    pub planned_end: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<NaiveDate>,
    pub allocated_budget: f64,
    /// Maintained by the timesheet roll-up only
    pub consumed_budget: f64,
    pub lead_id: String,
    pub member_ids: Vec<String>,
    pub milestones: Vec<Milestone>,
    pub tags: Vec<String>,
    pub history: Vec<ChangeRecord>,
    /// Blueprint for new projects; kept out of lists and reports
    #[serde(default)]
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Project {
    /// Lead or assigned member.
    pub fn involves(&self, member_id: &str) -> bool {
        self.lead_id == member_id || self.member_ids.iter().any(|m| m == member_id)
    }
}

/// Request body for creating a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    /// Generated as `PROJ-nnnn` when absent
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: ProjectStatus,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub planned_start: NaiveDate,
    pub planned_end: NaiveDate,
    #[serde(default)]
    pub allocated_budget: f64,
    /// Defaults to the acting member
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Planning
}

fn default_priority() -> Priority {
    Priority::Normal
}

/// Request body for updating a project.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub planned_start: Option<NaiveDate>,
    #[serde(default)]
    pub planned_end: Option<NaiveDate>,
    #[serde(default)]
    pub actual_start: Option<NaiveDate>,
    #[serde(default)]
    pub actual_end: Option<NaiveDate>,
    #[serde(default)]
    pub allocated_budget: Option<f64>,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub member_ids: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for duplicating a project, saving it as a template or
/// instantiating a template.
///
/// Dates move with `planned_start`; everything else comes from the source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyProjectRequest {
    /// Defaults to "Copy of <source name>"
    #[serde(default)]
    pub name: Option<String>,
    /// Generated as `PROJ-nnnn` when absent
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub planned_start: Option<NaiveDate>,
}

/// Request body for adding a milestone.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMilestoneRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub planned_date: NaiveDate,
}

/// Request body for updating a milestone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMilestoneRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub planned_date: Option<NaiveDate>,
    #[serde(default)]
    pub actual_date: Option<NaiveDate>,
    #[serde(default)]
    pub reached: Option<bool>,
}

/// Query parameters for listing projects.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub lead_id: Option<String>,
    /// Projects the member leads or is assigned to
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}
