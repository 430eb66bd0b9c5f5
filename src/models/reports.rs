//! Report and dashboard payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Priority, ProjectStatus, TaskStatus};
use crate::analytics::budget::{BudgetStatus, HoursBucket};
use crate::analytics::workload::Workload;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalKpis {
    pub total_projects: i64,
    pub active_projects: i64,
    pub done_projects: i64,
    pub late_projects: i64,
    pub total_tasks: i64,
    pub done_tasks: i64,
    pub late_tasks: i64,
    pub active_members: i64,
    pub hours_this_month: f64,
    pub allocated_budget: f64,
    pub consumed_budget: f64,
    pub budget_used_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LateProject {
    pub project_id: String,
    pub name: String,
    pub late_days: i64,
    pub is_overrun: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadedMember {
    pub member_id: String,
    pub name: String,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityProject {
    pub project_id: String,
    pub name: String,
    pub priority: Priority,
    pub status: ProjectStatus,
    pub progress: f64,
    pub budget_used_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPerformance {
    pub member_id: String,
    pub name: String,
    pub active_projects: i64,
    pub assigned_tasks: usize,
    pub done_tasks: usize,
    pub completion_rate: f64,
    pub hours_this_month: f64,
    pub current_load: f64,
    pub availability: f64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorDashboard {
    pub kpis: GlobalKpis,
    pub late_projects: Vec<LateProject>,
    pub overloaded_members: Vec<OverloadedMember>,
    pub priority_projects: Vec<PriorityProject>,
    pub performance: Vec<MemberPerformance>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadProject {
    pub project_id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub progress: f64,
    pub done_tasks: usize,
    pub total_tasks: usize,
    pub budget_used_pct: f64,
    pub days_remaining: i64,
    pub is_late: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Late,
    Budget,
    Task,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDashboard {
    pub projects: Vec<LeadProject>,
    pub pending_timesheets: i64,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTask {
    pub task_id: String,
    pub title: String,
    pub project_name: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_end: Option<NaiveDate>,
    pub progress: i64,
    pub is_late: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProject {
    pub project_id: String,
    pub name: String,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deadline {
    pub task_id: String,
    pub title: String,
    pub planned_end: NaiveDate,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDashboard {
    pub tasks: Vec<MemberTask>,
    pub projects: Vec<MemberProject>,
    pub hours_this_month: f64,
    pub hours_this_week: f64,
    pub open_tasks: usize,
    pub done_tasks: usize,
    pub deadlines: Vec<Deadline>,
}

/// Dashboard variant chosen by the acting member's role.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dashboard {
    Director(DirectorDashboard),
    Lead(LeadDashboard),
    Member(MemberDashboard),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LateReportRow {
    pub project_id: String,
    pub name: String,
    pub planned_end: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<NaiveDate>,
    pub late_days: i64,
    pub late_tasks: usize,
    pub total_tasks: usize,
    pub late_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetReportRow {
    pub name: String,
    pub code: String,
    #[serde(flatten)]
    pub budget: BudgetStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayHours {
    pub date: NaiveDate,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_hours: f64,
    pub by_day: Vec<DayHours>,
    pub by_project: Vec<HoursBucket>,
    pub by_member: Vec<HoursBucket>,
}

/// Query parameters for the time report; defaults to the current month.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeReportQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    pub member_id: String,
    pub active_projects: i64,
    pub active_tasks: usize,
    pub done_tasks: usize,
    pub workload: Workload,
    pub planned_leaves: usize,
    pub ongoing_leaves: usize,
}

/// Query parameter selecting the workload reference date.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Query parameter overriding a workload threshold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThresholdQuery {
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub projects_total: i64,
    pub projects_active: i64,
    pub tasks_total: i64,
    pub members_total: i64,
    pub timesheets_total: i64,
    pub comments_total: i64,
    pub notifications_total: i64,
    pub audit_logs_total: i64,
    pub database_size_mb: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    /// Archived notifications older than this are removed
    #[serde(default)]
    pub notifications_older_than_days: Option<u32>,
    #[serde(default)]
    pub audit_logs_older_than_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub notifications_deleted: u64,
    pub audit_logs_deleted: u64,
}
