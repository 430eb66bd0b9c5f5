//! Member management, leave periods and workload queries.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};

use super::{authorize, check_version, deny, load_member, record_audit, today};
use crate::analytics::budget::{member_time_stats, MemberTimeStats};
use crate::analytics::workload::{self, week_bounds, Workload};
use crate::auth::Principal;
use crate::config::WorkloadThresholds;
use crate::errors::AppError;
use crate::models::{
    AuditAction, ChangeSet, CreateMemberRequest, DateRange, LeavePeriod, LeaveRequest,
    LeaveStatus, Member, MemberFilter, MemberStats, MemberStatus, NewAuditLog, Page, PageQuery,
    ProjectStatus, Role, TaskStatus, UpdateMemberRequest,
};
use crate::rbac::Permission;
use crate::AppState;

const MAX_WEEKLY_HOURS: f64 = 168.0;

/// Create the first administrator. Only allowed while no member exists.
pub async fn setup(state: &AppState, request: CreateMemberRequest) -> Result<Member, AppError> {
    if state.repo.count_members().await? > 0 {
        return Err(AppError::Validation(
            "Setup has already been completed".to_string(),
        ));
    }

    let mut member = new_member(request)?;
    member.role = Role::Admin;
    member.status = MemberStatus::Active;
    state.repo.insert_member(&member).await?;

    tracing::info!(member_id = %member.id, "Initial administrator created");
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "members")
            .document(&member.id)
            .actor(&member.id)
            .metadata(serde_json::json!({ "setup": true })),
    )
    .await;
    Ok(member)
}

pub async fn list(
    state: &AppState,
    principal: &Principal,
    filter: MemberFilter,
) -> Result<Page<Member>, AppError> {
    authorize(state, principal, Permission::MembersRead).await?;
    let (limit, offset) = PageQuery {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve(state.config.page_size);

    let (members, total) = state.repo.list_members(&filter, limit, offset).await?;
    Ok(Page::new(members, total, limit, offset))
}

/// A member may always read their own record.
pub async fn get(state: &AppState, principal: &Principal, id: &str) -> Result<Member, AppError> {
    if !principal.is(id) {
        authorize(state, principal, Permission::MembersRead).await?;
    }
    load_member(state, id).await
}

pub async fn create(
    state: &AppState,
    principal: &Principal,
    request: CreateMemberRequest,
) -> Result<Member, AppError> {
    authorize(state, principal, Permission::MembersCreate).await?;

    let member = new_member(request)?;
    if state.repo.find_member_by_email(&member.email).await?.is_some() {
        return Err(AppError::Duplicate(format!(
            "Email {} is already in use",
            member.email
        )));
    }
    state.repo.insert_member(&member).await?;

    tracing::info!(member_id = %member.id, "Member created");
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "members")
            .document(&member.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(member)
}

/// Update a member. Without `members:update`, members may edit only their own
/// contact details and skills.
pub async fn update(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: UpdateMemberRequest,
) -> Result<Member, AppError> {
    let privileged = principal.can(Permission::MembersUpdate);
    if !privileged && !principal.is(id) {
        authorize(state, principal, Permission::MembersUpdate).await?;
    }
    if !privileged
        && (request.role.is_some()
            || request.secondary_roles.is_some()
            || request.status.is_some()
            || request.hourly_rate.is_some()
            || request.weekly_availability.is_some())
    {
        return Err(deny(
            state,
            principal,
            "members",
            "Role, status, rate and availability require members:update".to_string(),
        )
        .await);
    }

    let existing = load_member(state, id).await?;
    check_version(request.expected_version, existing.version)?;

    let mut member = existing.clone();
    if let Some(first_name) = request.first_name {
        member.first_name = required_text(&first_name, "First name")?;
    }
    if let Some(last_name) = request.last_name {
        member.last_name = required_text(&last_name, "Last name")?;
    }
    if let Some(email) = request.email {
        let email = normalize_email(&email)?;
        if email != existing.email {
            if state.repo.find_member_by_email(&email).await?.is_some() {
                return Err(AppError::Duplicate(format!(
                    "Email {} is already in use",
                    email
                )));
            }
            member.email = email;
        }
    }
    if request.phone.is_some() {
        member.phone = request.phone;
    }
    if let Some(role) = request.role {
        member.role = role;
    }
    if let Some(secondary) = request.secondary_roles {
        member.secondary_roles = secondary;
    }
    if let Some(status) = request.status {
        member.status = status;
    }
    if request.hire_date.is_some() {
        member.hire_date = request.hire_date;
    }
    if let Some(skills) = request.skills {
        member.skills = skills;
    }
    if let Some(rate) = request.hourly_rate {
        member.hourly_rate = rate;
    }
    if let Some(availability) = request.weekly_availability {
        member.weekly_availability = availability;
    }
    validate_figures(&member)?;

    let mut changes = ChangeSet::new(&principal.member_id, Utc::now());
    changes.track("firstName", &existing.first_name, &member.first_name);
    changes.track("lastName", &existing.last_name, &member.last_name);
    changes.track("email", &existing.email, &member.email);
    changes.track("phone", &existing.phone, &member.phone);
    changes.track("role", &existing.role, &member.role);
    changes.track(
        "secondaryRoles",
        &existing.secondary_roles,
        &member.secondary_roles,
    );
    changes.track("status", &existing.status, &member.status);
    changes.track("hireDate", &existing.hire_date, &member.hire_date);
    changes.track("skills", &existing.skills, &member.skills);
    changes.track("hourlyRate", &existing.hourly_rate, &member.hourly_rate);
    changes.track(
        "weeklyAvailability",
        &existing.weekly_availability,
        &member.weekly_availability,
    );
    if changes.is_empty() {
        return Ok(existing);
    }

    let member = state.repo.update_member(member).await?;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "members")
            .document(&member.id)
            .actor(&principal.member_id)
            .changes(changes.into_records()),
    )
    .await;
    Ok(member)
}

/// Delete a member that is no longer attached to any project or task.
pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    authorize(state, principal, Permission::MembersDelete).await?;
    if principal.is(id) {
        return Err(AppError::Validation(
            "Members cannot delete themselves".to_string(),
        ));
    }

    let member = load_member(state, id).await?;
    let (projects, tasks) = state.repo.member_assignments(id).await?;
    if projects > 0 || tasks > 0 {
        return Err(AppError::Validation(format!(
            "Member {} is still assigned to {} project(s) and {} task(s)",
            id, projects, tasks
        )));
    }

    state.repo.delete_member(id).await?;
    tracing::info!(member_id = id, "Member deleted");
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Delete, "members")
            .document(id)
            .actor(&principal.member_id)
            .snapshot(&member),
    )
    .await;
    Ok(())
}

pub async fn add_leave(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: LeaveRequest,
) -> Result<Member, AppError> {
    ensure_self_or(state, principal, id, Permission::MembersUpdate).await?;
    let mut member = load_member(state, id).await?;

    let leave = LeavePeriod::from(request);
    check_leave(&member.leaves, &leave, None)?;
    member.leaves.push(leave);

    save_leaves(state, principal, member).await
}

pub async fn update_leave(
    state: &AppState,
    principal: &Principal,
    id: &str,
    index: usize,
    request: LeaveRequest,
) -> Result<Member, AppError> {
    ensure_self_or(state, principal, id, Permission::MembersUpdate).await?;
    let mut member = load_member(state, id).await?;
    if index >= member.leaves.len() {
        return Err(AppError::NotFound(format!(
            "Leave {} of member {} not found",
            index, id
        )));
    }

    let leave = LeavePeriod::from(request);
    check_leave(&member.leaves, &leave, Some(index))?;
    member.leaves[index] = leave;

    save_leaves(state, principal, member).await
}

pub async fn delete_leave(
    state: &AppState,
    principal: &Principal,
    id: &str,
    index: usize,
) -> Result<Member, AppError> {
    ensure_self_or(state, principal, id, Permission::MembersUpdate).await?;
    let mut member = load_member(state, id).await?;
    if index >= member.leaves.len() {
        return Err(AppError::NotFound(format!(
            "Leave {} of member {} not found",
            index, id
        )));
    }
    member.leaves.remove(index);

    save_leaves(state, principal, member).await
}

/// Workload of a member for the week containing `date` (today by default).
pub async fn workload(
    state: &AppState,
    principal: &Principal,
    id: &str,
    date: Option<NaiveDate>,
) -> Result<Workload, AppError> {
    ensure_self_or(state, principal, id, Permission::MembersRead).await?;
    let member = load_member(state, id).await?;
    member_workload(state, &member, date.unwrap_or_else(today), state.config.thresholds).await
}

pub async fn stats(state: &AppState, principal: &Principal, id: &str) -> Result<MemberStats, AppError> {
    ensure_self_or(state, principal, id, Permission::MembersRead).await?;
    let member = load_member(state, id).await?;

    let projects = state.repo.list_projects_for_member(id).await?;
    let active_projects = projects
        .iter()
        .filter(|p| matches!(p.status, ProjectStatus::Planning | ProjectStatus::InProgress))
        .count() as i64;

    let tasks = state.repo.list_tasks_assigned_to(id).await?;
    let active_tasks = tasks.iter().filter(|t| t.status.is_open()).count();
    let done_tasks = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count();

    let count_leaves = |status: LeaveStatus| member.leaves.iter().filter(|l| l.status == status).count();

    Ok(MemberStats {
        member_id: member.id.clone(),
        active_projects,
        active_tasks,
        done_tasks,
        workload: member_workload(state, &member, today(), state.config.thresholds).await?,
        planned_leaves: count_leaves(LeaveStatus::Planned),
        ongoing_leaves: count_leaves(LeaveStatus::Ongoing),
    })
}

pub async fn time_stats(
    state: &AppState,
    principal: &Principal,
    id: &str,
    range: DateRange,
) -> Result<MemberTimeStats, AppError> {
    ensure_self_or(state, principal, id, Permission::MembersRead).await?;
    let member = load_member(state, id).await?;

    let entries = state
        .repo
        .list_approved_entries(Some(id), None, range.from, range.to)
        .await?;

    let projects = state
        .repo
        .list_all_projects()
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect::<HashMap<_, _>>();
    let task_ids: Vec<String> = entries.iter().filter_map(|e| e.task_id.clone()).collect();
    let tasks = state
        .repo
        .get_tasks(&task_ids)
        .await?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect::<HashMap<_, _>>();

    Ok(member_time_stats(&member, &entries, &projects, &tasks))
}

/// Active members above the overload threshold, most loaded first.
pub async fn overloaded(
    state: &AppState,
    principal: &Principal,
    threshold: Option<f64>,
) -> Result<Vec<Workload>, AppError> {
    authorize(state, principal, Permission::MembersRead).await?;
    let mut thresholds = state.config.thresholds;
    if let Some(t) = threshold {
        thresholds.overload_pct = t;
    }

    let mut loads: Vec<Workload> = team_workloads(state, today(), thresholds)
        .await?
        .into_iter()
        .filter(|w| w.overloaded)
        .collect();
    loads.sort_by(|a, b| b.utilization_pct.total_cmp(&a.utilization_pct));
    Ok(loads)
}

/// Active members with some load below the underload threshold, least loaded first.
pub async fn underloaded(
    state: &AppState,
    principal: &Principal,
    threshold: Option<f64>,
) -> Result<Vec<Workload>, AppError> {
    authorize(state, principal, Permission::MembersRead).await?;
    let mut thresholds = state.config.thresholds;
    if let Some(t) = threshold {
        thresholds.underload_pct = t;
    }

    let mut loads: Vec<Workload> = team_workloads(state, today(), thresholds)
        .await?
        .into_iter()
        .filter(|w| w.underloaded)
        .collect();
    loads.sort_by(|a, b| a.utilization_pct.total_cmp(&b.utilization_pct));
    Ok(loads)
}

/// Workload of one member, loading only that member's tasks and week entries.
pub(crate) async fn member_workload(
    state: &AppState,
    member: &Member,
    reference: NaiveDate,
    thresholds: WorkloadThresholds,
) -> Result<Workload, AppError> {
    let (week_start, week_end) = week_bounds(reference);
    let tasks = state.repo.list_tasks_assigned_to(&member.id).await?;
    let entries = state
        .repo
        .list_approved_entries(Some(&member.id), None, Some(week_start), Some(week_end))
        .await?;
    Ok(workload::compute(member, &tasks, &entries, reference, thresholds))
}

/// Workloads of every active member, from one pass over open tasks and week entries.
pub(crate) async fn team_workloads(
    state: &AppState,
    reference: NaiveDate,
    thresholds: WorkloadThresholds,
) -> Result<Vec<Workload>, AppError> {
    let (week_start, week_end) = week_bounds(reference);
    let members = state.repo.list_active_members().await?;
    let tasks = state.repo.list_open_tasks().await?;
    let entries = state
        .repo
        .list_approved_entries(None, None, Some(week_start), Some(week_end))
        .await?;

    Ok(members
        .iter()
        .map(|m| workload::compute(m, &tasks, &entries, reference, thresholds))
        .collect())
}

async fn ensure_self_or(
    state: &AppState,
    principal: &Principal,
    id: &str,
    permission: Permission,
) -> Result<(), AppError> {
    if principal.is(id) {
        Ok(())
    } else {
        authorize(state, principal, permission).await
    }
}

async fn save_leaves(
    state: &AppState,
    principal: &Principal,
    member: Member,
) -> Result<Member, AppError> {
    let member = state.repo.update_member(member).await?;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "members")
            .document(&member.id)
            .actor(&principal.member_id)
            .metadata(serde_json::json!({ "leaves": member.leaves.len() })),
    )
    .await;
    Ok(member)
}

/// Validate a leave against the member's other leaves; `replacing` skips the edited slot.
fn check_leave(
    leaves: &[LeavePeriod],
    leave: &LeavePeriod,
    replacing: Option<usize>,
) -> Result<(), AppError> {
    if leave.end < leave.start {
        return Err(AppError::Validation(
            "Leave end must not precede its start".to_string(),
        ));
    }
    if !leave.is_active() {
        return Ok(());
    }

    let clash = leaves
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != replacing)
        .any(|(_, other)| other.is_active() && other.overlaps(leave));
    if clash {
        return Err(AppError::Validation(format!(
            "Leave {} - {} overlaps an existing leave",
            leave.start, leave.end
        )));
    }
    Ok(())
}

fn new_member(request: CreateMemberRequest) -> Result<Member, AppError> {
    let now = Utc::now();
    let member = Member {
        id: uuid::Uuid::new_v4().to_string(),
        first_name: required_text(&request.first_name, "First name")?,
        last_name: required_text(&request.last_name, "Last name")?,
        email: normalize_email(&request.email)?,
        phone: request.phone,
        role: request.role,
        secondary_roles: request.secondary_roles,
        status: request.status,
        hire_date: request.hire_date,
        skills: request.skills,
        hourly_rate: request.hourly_rate,
        weekly_availability: request.weekly_availability,
        leaves: Vec::new(),
        created_at: now,
        updated_at: now,
        version: 1,
    };
    validate_figures(&member)?;
    Ok(member)
}

fn validate_figures(member: &Member) -> Result<(), AppError> {
    if member.hourly_rate < 0.0 {
        return Err(AppError::Validation(
            "Hourly rate must not be negative".to_string(),
        ));
    }
    if !(0.0..=MAX_WEEKLY_HOURS).contains(&member.weekly_availability) {
        return Err(AppError::Validation(format!(
            "Weekly availability must be between 0 and {} hours",
            MAX_WEEKLY_HOURS
        )));
    }
    Ok(())
}

fn required_text(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::Validation(format!("Invalid email address: {}", email)));
    }
    Ok(email)
}
