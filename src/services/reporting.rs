//! Role dashboards, global KPIs and portfolio reports.
//!
//! Every payload is assembled from the analytics functions and count queries.
//! A storage failure anywhere aborts the whole payload as a reporting error.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};

use super::{authorize, members::team_workloads, today};
use crate::analytics::budget::{budget_status, time_breakdown};
use crate::analytics::progress::{project_progress, schedule, ProjectProgress};
use crate::analytics::workload::week_bounds;
use crate::analytics::{percent, round2};
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    Alert, AlertKind, BudgetReportRow, Dashboard, DayHours, Deadline, DirectorDashboard,
    GlobalKpis, LateProject, LateReportRow, LeadDashboard, LeadProject, MemberDashboard,
    MemberPerformance, MemberProject, MemberTask, OverloadedMember, Priority, PriorityProject,
    Project, Role, Task, TaskStatus, TimeReport, TimeReportQuery,
};
use crate::rbac::Permission;
use crate::AppState;

const TOP_LATE: usize = 5;
const TOP_OVERLOADED: usize = 5;
const TOP_PRIORITY: usize = 5;
const TOP_PERFORMANCE: usize = 10;
const MAX_ALERTS: usize = 10;
const MEMBER_TASKS: usize = 10;
const MEMBER_PROJECTS: usize = 5;
const DEADLINE_DAYS: i64 = 7;
const MAX_DEADLINES: usize = 5;

/// Dashboard for the acting member's role.
pub async fn dashboard(state: &AppState, principal: &Principal) -> Result<Dashboard, AppError> {
    let today = today();
    let result = match principal.role {
        Role::Admin | Role::Director => director_dashboard(state, today)
            .await
            .map(Dashboard::Director),
        Role::Lead => lead_dashboard(state, &principal.member_id, today)
            .await
            .map(Dashboard::Lead),
        Role::Member | Role::Observer => member_dashboard(state, &principal.member_id, today)
            .await
            .map(Dashboard::Member),
    };
    result.map_err(AppError::into_reporting)
}

pub async fn kpis(state: &AppState, principal: &Principal) -> Result<GlobalKpis, AppError> {
    authorize(state, principal, Permission::ReportsRead).await?;
    global_kpis(state, today())
        .await
        .map_err(AppError::into_reporting)
}

/// Every project's progress, most advanced first.
pub async fn progress_report(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<ProjectProgress>, AppError> {
    authorize(state, principal, Permission::ReportsRead).await?;
    let result = async {
        let today = today();
        let projects = state.repo.list_all_projects().await?;
        let tasks = state.repo.list_all_tasks().await?;
        let mut rows: Vec<ProjectProgress> = projects
            .iter()
            .map(|p| project_progress(p, &tasks, today))
            .collect();
        rows.sort_by(|a, b| b.progress.total_cmp(&a.progress));
        Ok::<_, AppError>(rows)
    }
    .await;
    result.map_err(AppError::into_reporting)
}

/// Late projects with their late task share, latest first.
pub async fn late_report(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<LateReportRow>, AppError> {
    authorize(state, principal, Permission::ReportsRead).await?;
    let result = async {
        let today = today();
        let projects = state.repo.list_all_projects().await?;
        let tasks = state.repo.list_all_tasks().await?;
        let by_project = group_by_project(&tasks);

        let mut rows: Vec<LateReportRow> = projects
            .iter()
            .filter_map(|p| {
                let sched = schedule(p.planned_end, p.status, today);
                if !sched.is_late {
                    return None;
                }
                let own = by_project.get(p.id.as_str()).map_or(&[][..], Vec::as_slice);
                let late_tasks = own.iter().filter(|t| t.is_late(today)).count();
                Some(LateReportRow {
                    project_id: p.id.clone(),
                    name: p.name.clone(),
                    planned_end: p.planned_end,
                    actual_end: p.actual_end,
                    late_days: sched.late_days,
                    late_tasks,
                    total_tasks: own.len(),
                    late_pct: round2(percent(late_tasks as f64, own.len() as f64)),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.late_days.cmp(&a.late_days));
        Ok::<_, AppError>(rows)
    }
    .await;
    result.map_err(AppError::into_reporting)
}

/// Budget consumption of every project, highest usage first.
pub async fn budget_report(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<BudgetReportRow>, AppError> {
    authorize(state, principal, Permission::ReportsFinancial).await?;
    let result = async {
        let mut rows: Vec<BudgetReportRow> = state
            .repo
            .list_all_projects()
            .await?
            .into_iter()
            .map(|p| BudgetReportRow {
                budget: budget_status(&p),
                name: p.name,
                code: p.code,
            })
            .collect();
        rows.sort_by(|a, b| b.budget.used_pct.total_cmp(&a.budget.used_pct));
        Ok::<_, AppError>(rows)
    }
    .await;
    result.map_err(AppError::into_reporting)
}

/// Performance of every active member, best completion rate first.
pub async fn performance_report(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<MemberPerformance>, AppError> {
    authorize(state, principal, Permission::ReportsRead).await?;
    member_performance(state, today())
        .await
        .map_err(AppError::into_reporting)
}

/// Approved hours between `from` and `to` (the current month by default).
pub async fn time_report(
    state: &AppState,
    principal: &Principal,
    query: TimeReportQuery,
) -> Result<TimeReport, AppError> {
    authorize(state, principal, Permission::ReportsRead).await?;
    let today = today();
    let from = query.from.unwrap_or_else(|| month_start(today));
    let to = query.to.unwrap_or(today);
    if from > to {
        return Err(AppError::Validation(
            "Report start must not be after its end".to_string(),
        ));
    }

    let result = async {
        let entries = state
            .repo
            .list_approved_entries(None, None, Some(from), Some(to))
            .await?;
        let members = state
            .repo
            .list_all_members()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect::<HashMap<_, _>>();
        let projects = state
            .repo
            .list_all_projects()
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect::<HashMap<_, _>>();

        let breakdown = time_breakdown(&entries, &members, &projects);
        Ok::<_, AppError>(TimeReport {
            from,
            to,
            total_hours: breakdown.total_hours,
            by_day: breakdown
                .by_day
                .into_iter()
                .map(|(date, hours)| DayHours { date, hours })
                .collect(),
            by_project: breakdown.by_project,
            by_member: breakdown.by_member,
        })
    }
    .await;
    result.map_err(AppError::into_reporting)
}

async fn global_kpis(state: &AppState, today: NaiveDate) -> Result<GlobalKpis, AppError> {
    let counts = state.repo.portfolio_counts(today).await?;
    let hours = state
        .repo
        .sum_approved_hours(None, month_start(today), today)
        .await?;

    Ok(GlobalKpis {
        total_projects: counts.total_projects,
        active_projects: counts.active_projects,
        done_projects: counts.done_projects,
        late_projects: counts.late_projects,
        total_tasks: counts.total_tasks,
        done_tasks: counts.done_tasks,
        late_tasks: counts.late_tasks,
        active_members: counts.active_members,
        hours_this_month: round2(hours),
        allocated_budget: round2(counts.allocated_budget),
        consumed_budget: round2(counts.consumed_budget),
        budget_used_pct: round2(percent(counts.consumed_budget, counts.allocated_budget)),
    })
}

async fn director_dashboard(
    state: &AppState,
    today: NaiveDate,
) -> Result<DirectorDashboard, AppError> {
    let kpis = global_kpis(state, today).await?;
    let projects = state.repo.list_all_projects().await?;
    let tasks = state.repo.list_all_tasks().await?;

    let mut late_projects: Vec<LateProject> = projects
        .iter()
        .filter_map(|p| {
            let sched = schedule(p.planned_end, p.status, today);
            sched.is_late.then(|| LateProject {
                project_id: p.id.clone(),
                name: p.name.clone(),
                late_days: sched.late_days,
                is_overrun: budget_status(p).is_overrun,
            })
        })
        .collect();
    late_projects.sort_by(|a, b| b.late_days.cmp(&a.late_days));
    late_projects.truncate(TOP_LATE);

    let mut loads: Vec<_> = team_workloads(state, today, state.config.thresholds)
        .await?
        .into_iter()
        .filter(|w| w.overloaded)
        .collect();
    loads.sort_by(|a, b| b.utilization_pct.total_cmp(&a.utilization_pct));
    let overloaded_members = loads
        .into_iter()
        .take(TOP_OVERLOADED)
        .map(|w| OverloadedMember {
            member_id: w.member_id,
            name: w.member_name,
            utilization_pct: w.utilization_pct,
        })
        .collect();

    let mut urgent: Vec<&Project> = projects
        .iter()
        .filter(|p| p.status.is_active() && priority_rank(p.priority) > 0)
        .collect();
    urgent.sort_by(|a, b| {
        priority_rank(b.priority)
            .cmp(&priority_rank(a.priority))
            .then(b.created_at.cmp(&a.created_at))
    });
    let priority_projects = urgent
        .into_iter()
        .take(TOP_PRIORITY)
        .map(|p| PriorityProject {
            project_id: p.id.clone(),
            name: p.name.clone(),
            priority: p.priority,
            status: p.status,
            progress: project_progress(p, &tasks, today).progress,
            budget_used_pct: budget_status(p).used_pct,
        })
        .collect();

    let mut performance = member_performance(state, today).await?;
    performance.truncate(TOP_PERFORMANCE);

    Ok(DirectorDashboard {
        kpis,
        late_projects,
        overloaded_members,
        priority_projects,
        performance,
    })
}

async fn lead_dashboard(
    state: &AppState,
    member_id: &str,
    today: NaiveDate,
) -> Result<LeadDashboard, AppError> {
    let led: Vec<Project> = state
        .repo
        .list_projects_for_member(member_id)
        .await?
        .into_iter()
        .filter(|p| p.lead_id == member_id && p.status.is_active())
        .collect();

    let mut projects = Vec::with_capacity(led.len());
    let mut alerts = Vec::new();
    for project in &led {
        let tasks = state.repo.list_project_tasks(&project.id).await?;
        let progress = project_progress(project, &tasks, today);
        let late_tasks = tasks.iter().filter(|t| t.is_late(today)).count();
        alerts.extend(project_alerts(project, late_tasks, today));
        projects.push(LeadProject {
            project_id: project.id.clone(),
            name: project.name.clone(),
            status: project.status,
            progress: progress.progress,
            done_tasks: progress.done_tasks,
            total_tasks: progress.total_tasks,
            budget_used_pct: budget_status(project).used_pct,
            days_remaining: progress.schedule.days_remaining,
            is_late: progress.schedule.is_late,
        });
    }
    alerts.truncate(MAX_ALERTS);

    let ids: Vec<String> = led.iter().map(|p| p.id.clone()).collect();
    let pending_timesheets = state.repo.count_submitted_timesheets(&ids).await?;

    Ok(LeadDashboard {
        projects,
        pending_timesheets,
        alerts,
    })
}

async fn member_dashboard(
    state: &AppState,
    member_id: &str,
    today: NaiveDate,
) -> Result<MemberDashboard, AppError> {
    let mut tasks = state.repo.list_tasks_assigned_to(member_id).await?;
    let projects = state.repo.list_projects_for_member(member_id).await?;
    let names: HashMap<&str, &str> = projects
        .iter()
        .map(|p| (p.id.as_str(), p.name.as_str()))
        .collect();

    let open_tasks = tasks.iter().filter(|t| t.status.is_open()).count();
    let done_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count();

    let horizon = today + Duration::days(DEADLINE_DAYS);
    let mut deadlines: Vec<Deadline> = tasks
        .iter()
        .filter(|t| t.status.is_open())
        .filter_map(|t| {
            let end = t.planned_end?;
            (end >= today && end <= horizon).then(|| Deadline {
                task_id: t.id.clone(),
                title: t.title.clone(),
                planned_end: end,
                days_remaining: (end - today).num_days(),
            })
        })
        .collect();
    deadlines.sort_by_key(|d| d.planned_end);
    deadlines.truncate(MAX_DEADLINES);

    // Undated tasks sort last.
    tasks.sort_by_key(|t| (t.planned_end.is_none(), t.planned_end));
    let member_tasks = tasks
        .iter()
        .take(MEMBER_TASKS)
        .map(|t| MemberTask {
            task_id: t.id.clone(),
            title: t.title.clone(),
            project_name: names
                .get(t.project_id.as_str())
                .map_or_else(|| t.project_id.clone(), |n| n.to_string()),
            status: t.status,
            priority: t.priority,
            planned_end: t.planned_end,
            progress: t.progress,
            is_late: t.is_late(today),
        })
        .collect();

    let (week_start, week_end) = week_bounds(today);
    let hours_this_month = state
        .repo
        .sum_approved_hours(Some(member_id), month_start(today), today)
        .await?;
    let hours_this_week = state
        .repo
        .sum_approved_hours(Some(member_id), week_start, week_end)
        .await?;

    Ok(MemberDashboard {
        tasks: member_tasks,
        projects: projects
            .iter()
            .take(MEMBER_PROJECTS)
            .map(|p| MemberProject {
                project_id: p.id.clone(),
                name: p.name.clone(),
                status: p.status,
            })
            .collect(),
        hours_this_month: round2(hours_this_month),
        hours_this_week: round2(hours_this_week),
        open_tasks,
        done_tasks,
        deadlines,
    })
}

async fn member_performance(
    state: &AppState,
    today: NaiveDate,
) -> Result<Vec<MemberPerformance>, AppError> {
    let projects = state.repo.list_all_projects().await?;
    let tasks = state.repo.list_all_tasks().await?;
    let month_entries = state
        .repo
        .list_approved_entries(None, None, Some(month_start(today)), Some(today))
        .await?;
    let workloads = team_workloads(state, today, state.config.thresholds).await?;

    let mut rows: Vec<MemberPerformance> = workloads
        .into_iter()
        .map(|w| {
            let id = w.member_id.as_str();
            let active_projects = projects
                .iter()
                .filter(|p| p.status.is_active() && p.involves(id))
                .count() as i64;
            let assigned: Vec<&Task> = tasks.iter().filter(|t| t.is_assigned_to(id)).collect();
            let done = assigned
                .iter()
                .filter(|t| t.status == TaskStatus::Done)
                .count();
            let hours: f64 = month_entries
                .iter()
                .filter(|e| e.member_id == id)
                .map(|e| e.hours)
                .sum();

            MemberPerformance {
                active_projects,
                assigned_tasks: assigned.len(),
                done_tasks: done,
                completion_rate: round2(percent(done as f64, assigned.len() as f64)),
                hours_this_month: round2(hours),
                current_load: w.estimated_load,
                availability: w.availability,
                utilization_pct: w.utilization_pct,
                member_id: w.member_id,
                name: w.member_name,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.completion_rate.total_cmp(&a.completion_rate));
    Ok(rows)
}

/// Late, overrun and late-task alerts for one led project.
fn project_alerts(project: &Project, late_tasks: usize, today: NaiveDate) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let sched = schedule(project.planned_end, project.status, today);
    if sched.is_late {
        alerts.push(Alert {
            kind: AlertKind::Late,
            message: format!(
                "Project \"{}\" is {} days late",
                project.name, sched.late_days
            ),
            project_id: project.id.clone(),
        });
    }
    if budget_status(project).is_overrun {
        alerts.push(Alert {
            kind: AlertKind::Budget,
            message: format!("Project \"{}\" is over budget", project.name),
            project_id: project.id.clone(),
        });
    }
    if late_tasks > 0 {
        alerts.push(Alert {
            kind: AlertKind::Task,
            message: format!(
                "{} late task(s) in project \"{}\"",
                late_tasks, project.name
            ),
            project_id: project.id.clone(),
        });
    }
    alerts
}

/// High and critical projects surface on the director dashboard.
fn priority_rank(priority: Priority) -> u8 {
    match priority {
        Priority::Critical => 2,
        Priority::High => 1,
        Priority::Normal | Priority::Low => 0,
    }
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.day0() as i64)
}

fn group_by_project(tasks: &[Task]) -> HashMap<&str, Vec<&Task>> {
    let mut grouped: HashMap<&str, Vec<&Task>> = HashMap::new();
    for task in tasks {
        grouped.entry(task.project_id.as_str()).or_default().push(task);
    }
    grouped
}
