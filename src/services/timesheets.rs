//! Timesheet entries and their approval workflow.
//!
//! Approval, rejection and deletion move the project's consumed budget and the
//! task's actual hours in the same transaction as the status change.

use chrono::{NaiveDate, Utc};

use super::{authorize, deny, load_member, load_project, load_timesheet, notify, record_audit, today};
use crate::analytics::budget::RollupDelta;
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    ApproveRequest, AuditAction, CreateTimesheetRequest, NewAuditLog, NewNotification,
    NotificationKind, Page, PageQuery, Project, RejectRequest, ResourceType, TimesheetEntry,
    TimesheetFilter, TimesheetStatus, UpdateTimesheetRequest, MAX_ENTRY_HOURS, MIN_ENTRY_HOURS,
};
use crate::rbac::Permission;
use crate::AppState;

/// Validators and executives see every entry; others only their own.
pub async fn list(
    state: &AppState,
    principal: &Principal,
    mut filter: TimesheetFilter,
) -> Result<Page<TimesheetEntry>, AppError> {
    authorize(state, principal, Permission::TimesheetsRead).await?;
    if !sees_all(principal) {
        filter.member_id = Some(principal.member_id.clone());
    }
    let (limit, offset) = PageQuery {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve(state.config.page_size);

    let (entries, total) = state.repo.list_timesheets(&filter, limit, offset).await?;
    Ok(Page::new(entries, total, limit, offset))
}

pub async fn get(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<TimesheetEntry, AppError> {
    authorize(state, principal, Permission::TimesheetsRead).await?;
    let entry = load_timesheet(state, id).await?;
    if !sees_all(principal) && !principal.is(&entry.member_id) {
        return Err(deny(
            state,
            principal,
            "timesheets",
            format!("Timesheet entry {} belongs to another member", id),
        )
        .await);
    }
    Ok(entry)
}

pub async fn create(
    state: &AppState,
    principal: &Principal,
    request: CreateTimesheetRequest,
) -> Result<TimesheetEntry, AppError> {
    authorize(state, principal, Permission::TimesheetsCreate).await?;

    let member_id = request
        .member_id
        .unwrap_or_else(|| principal.member_id.clone());
    if !principal.is(&member_id) && !principal.is_admin() {
        return Err(deny(
            state,
            principal,
            "timesheets",
            "Only administrators can book time for another member".to_string(),
        )
        .await);
    }

    let status = request.status.unwrap_or(TimesheetStatus::Draft);
    check_initial_status(status)?;

    let now = Utc::now();
    let entry = TimesheetEntry {
        id: uuid::Uuid::new_v4().to_string(),
        member_id,
        project_id: request.project_id,
        task_id: request.task_id,
        date: request.date,
        hours: request.hours,
        description: request.description,
        status,
        approver_id: None,
        approved_at: None,
        approval_comment: None,
        approved_cost: None,
        created_at: now,
        updated_at: now,
    };
    validate_entry(state, &entry).await?;

    state.repo.insert_timesheet(&entry).await?;
    tracing::info!(
        entry_id = %entry.id,
        member_id = %entry.member_id,
        hours = entry.hours,
        "Timesheet entry created"
    );
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Create, "timesheets")
            .document(&entry.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(entry)
}

/// Edit an entry that has not been approved. Status may only move between draft and submitted.
pub async fn update(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: UpdateTimesheetRequest,
) -> Result<TimesheetEntry, AppError> {
    authorize(state, principal, Permission::TimesheetsUpdate).await?;
    let existing = load_timesheet(state, id).await?;
    ensure_owner(state, principal, &existing).await?;
    if existing.is_approved() {
        return Err(AppError::ImmutableState(format!(
            "Timesheet entry {} is approved and can no longer be edited",
            id
        )));
    }

    let mut entry = existing.clone();
    if let Some(task_id) = request.task_id {
        entry.task_id = task_id;
    }
    if let Some(date) = request.date {
        entry.date = date;
    }
    if let Some(hours) = request.hours {
        entry.hours = hours;
    }
    if request.description.is_some() {
        entry.description = request.description;
    }
    if let Some(status) = request.status {
        check_initial_status(status)?;
        entry.status = status;
    }
    entry.updated_at = Utc::now();
    validate_entry(state, &entry).await?;

    state.repo.update_timesheet(&entry, existing.status).await?;
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "timesheets")
            .document(&entry.id)
            .actor(&principal.member_id),
    )
    .await;
    Ok(entry)
}

/// Hand a draft or rejected entry in for approval.
pub async fn submit(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<TimesheetEntry, AppError> {
    authorize(state, principal, Permission::TimesheetsUpdate).await?;
    let existing = load_timesheet(state, id).await?;
    ensure_owner(state, principal, &existing).await?;

    match existing.status {
        TimesheetStatus::Draft | TimesheetStatus::Rejected => {}
        TimesheetStatus::Approved => {
            return Err(AppError::ImmutableState(format!(
                "Timesheet entry {} is already approved",
                id
            )))
        }
        TimesheetStatus::Submitted => {
            return Err(AppError::Validation(format!(
                "Timesheet entry {} is already submitted",
                id
            )))
        }
    }

    let mut entry = existing.clone();
    entry.status = TimesheetStatus::Submitted;
    entry.updated_at = Utc::now();
    state
        .repo
        .transition_timesheet(&entry, existing.status, None)
        .await?;

    record_transition(state, principal, &entry).await;
    Ok(entry)
}

/// Approve an entry and charge its cost to the project.
pub async fn approve(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: ApproveRequest,
) -> Result<TimesheetEntry, AppError> {
    authorize(state, principal, Permission::TimesheetsValidate).await?;
    let existing = load_timesheet(state, id).await?;
    if existing.is_approved() {
        return Err(AppError::ImmutableState(format!(
            "Timesheet entry {} is already approved",
            id
        )));
    }
    let member = load_member(state, &existing.member_id).await?;
    load_project(state, &existing.project_id).await?;

    let now = Utc::now();
    let mut entry = existing.clone();
    entry.status = TimesheetStatus::Approved;
    entry.approver_id = Some(principal.member_id.clone());
    entry.approved_at = Some(now);
    entry.approval_comment = request.comment.filter(|c| !c.trim().is_empty());
    entry.updated_at = now;

    let delta = RollupDelta::approve(entry.hours, member.hourly_rate);
    entry.approved_cost = Some(delta.cost);
    state
        .repo
        .transition_timesheet(&entry, existing.status, Some(delta))
        .await?;

    tracing::info!(
        entry_id = %entry.id,
        cost = delta.cost,
        hours = delta.hours,
        "Timesheet entry approved"
    );
    notify_member(
        state,
        &entry,
        "Timesheet approved",
        format!(
            "{} approved {} hour(s) booked on {}",
            principal.name, entry.hours, entry.date
        ),
    )
    .await;
    record_transition(state, principal, &entry).await;
    Ok(entry)
}

/// Reject an entry; an approved entry gives its cost back to the project.
pub async fn reject(
    state: &AppState,
    principal: &Principal,
    id: &str,
    request: RejectRequest,
) -> Result<TimesheetEntry, AppError> {
    authorize(state, principal, Permission::TimesheetsValidate).await?;
    let comment = request.comment.trim().to_string();
    if comment.is_empty() {
        return Err(AppError::Validation(
            "A comment is required to reject a timesheet entry".to_string(),
        ));
    }

    let existing = load_timesheet(state, id).await?;
    if existing.status == TimesheetStatus::Rejected {
        return Err(AppError::Validation(format!(
            "Timesheet entry {} is already rejected",
            id
        )));
    }
    let delta = revert_delta(state, &existing).await?;

    let now = Utc::now();
    let mut entry = existing.clone();
    entry.status = TimesheetStatus::Rejected;
    entry.approver_id = Some(principal.member_id.clone());
    entry.approved_at = None;
    entry.approved_cost = None;
    entry.approval_comment = Some(comment.clone());
    entry.updated_at = now;

    state
        .repo
        .transition_timesheet(&entry, existing.status, delta)
        .await?;

    tracing::info!(entry_id = %entry.id, reverted = delta.is_some(), "Timesheet entry rejected");
    notify_member(
        state,
        &entry,
        "Timesheet rejected",
        format!(
            "{} rejected your entry of {}: {}",
            principal.name, entry.date, comment
        ),
    )
    .await;
    record_transition(state, principal, &entry).await;
    Ok(entry)
}

/// Delete an entry. Approved entries can only be removed by validators and are reverted.
pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    authorize(state, principal, Permission::TimesheetsDelete).await?;
    let entry = load_timesheet(state, id).await?;
    ensure_owner(state, principal, &entry).await?;
    if entry.is_approved() && !principal.can(Permission::TimesheetsValidate) {
        return Err(AppError::ImmutableState(format!(
            "Timesheet entry {} is approved and can no longer be deleted",
            id
        )));
    }

    let delta = revert_delta(state, &entry).await?;
    state.repo.delete_timesheet(&entry, delta).await?;

    tracing::info!(entry_id = id, reverted = delta.is_some(), "Timesheet entry deleted");
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Delete, "timesheets")
            .document(id)
            .actor(&principal.member_id)
            .snapshot(&entry),
    )
    .await;
    Ok(())
}

fn sees_all(principal: &Principal) -> bool {
    principal.is_executive() || principal.can(Permission::TimesheetsValidate)
}

/// Owners manage their entries; administrators manage everyone's.
async fn ensure_owner(
    state: &AppState,
    principal: &Principal,
    entry: &TimesheetEntry,
) -> Result<(), AppError> {
    if principal.is(&entry.member_id) || principal.is_admin() {
        return Ok(());
    }
    Err(deny(
        state,
        principal,
        "timesheets",
        format!("Timesheet entry {} belongs to another member", entry.id),
    )
    .await)
}

/// The delta that undoes an approved entry's roll-up, if it was approved.
///
/// Takes back the cost recorded at approval, whatever the member's rate is now.
async fn revert_delta(
    state: &AppState,
    entry: &TimesheetEntry,
) -> Result<Option<RollupDelta>, AppError> {
    if !entry.is_approved() {
        return Ok(None);
    }
    let charged = match entry.approved_cost {
        Some(cost) => cost,
        None => entry.charged_cost(load_member(state, &entry.member_id).await?.hourly_rate),
    };
    Ok(Some(RollupDelta::revert(charged, entry.hours)))
}

fn check_initial_status(status: TimesheetStatus) -> Result<(), AppError> {
    match status {
        TimesheetStatus::Draft | TimesheetStatus::Submitted => Ok(()),
        other => Err(AppError::Validation(format!(
            "Entries cannot be set to {} directly; use the approval workflow",
            other
        ))),
    }
}

/// Field rules shared by create and update.
async fn validate_entry(state: &AppState, entry: &TimesheetEntry) -> Result<(), AppError> {
    check_hours_and_date(entry.hours, entry.date, today())?;

    load_member(state, &entry.member_id).await?;
    let project = load_project(state, &entry.project_id).await?;
    if project.is_template {
        return Err(AppError::Validation(format!(
            "Project {} is a template and takes no time entries",
            project.code
        )));
    }
    check_booking_rights(&project, &entry.member_id)?;

    if let Some(task_id) = &entry.task_id {
        let task = state
            .repo
            .get_task(task_id)
            .await?
            .ok_or_else(|| AppError::not_found("Task", task_id))?;
        if task.project_id != entry.project_id {
            return Err(AppError::Validation(format!(
                "Task {} does not belong to project {}",
                task_id, project.code
            )));
        }
        if !task.is_assigned_to(&entry.member_id) {
            return Err(AppError::Validation(format!(
                "Task {} is not assigned to member {}",
                task_id, entry.member_id
            )));
        }
    }

    match state
        .repo
        .find_timesheet_slot(&entry.member_id, &entry.project_id, entry.date)
        .await?
    {
        Some(other) if other != entry.id => Err(AppError::Duplicate(format!(
            "An entry already exists for this member, project and date ({})",
            entry.date
        ))),
        _ => Ok(()),
    }
}

fn check_hours_and_date(hours: f64, date: NaiveDate, today: NaiveDate) -> Result<(), AppError> {
    if !(MIN_ENTRY_HOURS..=MAX_ENTRY_HOURS).contains(&hours) {
        return Err(AppError::Validation(format!(
            "Hours must be between {} and {}",
            MIN_ENTRY_HOURS, MAX_ENTRY_HOURS
        )));
    }
    if date > today {
        return Err(AppError::Validation(format!(
            "Cannot book time on a future date ({})",
            date
        )));
    }
    Ok(())
}

fn check_booking_rights(project: &Project, member_id: &str) -> Result<(), AppError> {
    if project.involves(member_id) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Member {} is not assigned to project {}",
            member_id, project.code
        )))
    }
}

async fn notify_member(state: &AppState, entry: &TimesheetEntry, title: &str, message: String) {
    notify(
        state,
        vec![
            NewNotification::new(&entry.member_id, NotificationKind::Approval, title, message)
                .on(ResourceType::Timesheet, &entry.id),
        ],
    )
    .await;
}

async fn record_transition(state: &AppState, principal: &Principal, entry: &TimesheetEntry) {
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Update, "timesheets")
            .document(&entry.id)
            .actor(&principal.member_id)
            .metadata(serde_json::json!({ "status": entry.status })),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::testing::{date, project};

    #[test]
    fn test_hours_bounds() {
        let today = date(2024, 3, 10);
        assert!(check_hours_and_date(0.25, today, today).is_ok());
        assert!(check_hours_and_date(24.0, today, today).is_ok());
        assert!(check_hours_and_date(0.2, today, today).is_err());
        assert!(check_hours_and_date(24.5, today, today).is_err());
    }

    #[test]
    fn test_future_date_is_rejected() {
        let today = date(2024, 3, 10);
        assert!(check_hours_and_date(8.0, date(2024, 3, 11), today).is_err());
        assert!(check_hours_and_date(8.0, date(2024, 3, 9), today).is_ok());
    }

    #[test]
    fn test_booking_requires_involvement() {
        let mut p = project("p1", 0.0, date(2024, 6, 30));
        p.member_ids = vec!["m1".to_string()];
        assert!(check_booking_rights(&p, "m1").is_ok());
        assert!(check_booking_rights(&p, "lead").is_ok());
        assert!(check_booking_rights(&p, "m2").is_err());
    }

    #[test]
    fn test_only_draft_or_submitted_initially() {
        assert!(check_initial_status(TimesheetStatus::Draft).is_ok());
        assert!(check_initial_status(TimesheetStatus::Submitted).is_ok());
        assert!(check_initial_status(TimesheetStatus::Approved).is_err());
        assert!(check_initial_status(TimesheetStatus::Rejected).is_err());
    }
}
