//! Business operations behind the HTTP handlers.
//!
//! Every operation takes the shared state and the acting `Principal`, checks
//! permissions and pre-conditions, then talks to the repository. Notification,
//! audit and search-index side effects never fail the main operation.

pub mod admin;
pub mod comments;
pub mod members;
pub mod notifications;
pub mod projects;
pub mod reporting;
pub mod tasks;
pub mod timesheets;

use chrono::{NaiveDate, Utc};

use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    AuditAction, Member, NewAuditLog, NewNotification, Project, Task, TimesheetEntry,
};
use crate::rbac::Permission;
use crate::search::SearchKind;
use crate::AppState;

/// Fail with `Forbidden` unless the principal holds `permission`.
pub async fn authorize(
    state: &AppState,
    principal: &Principal,
    permission: Permission,
) -> Result<(), AppError> {
    if principal.can(permission) {
        return Ok(());
    }
    Err(deny(
        state,
        principal,
        permission.as_str().split(':').next().unwrap_or("unknown"),
        format!("Missing permission {}", permission),
    )
    .await)
}

/// Audit a refused operation and build the matching error.
pub async fn deny(
    state: &AppState,
    principal: &Principal,
    collection: &'static str,
    message: String,
) -> AppError {
    tracing::warn!(
        member_id = %principal.member_id,
        collection,
        "Permission denied: {}",
        message
    );
    record_audit(
        state,
        NewAuditLog::new(AuditAction::PermissionDenied, collection)
            .actor(&principal.member_id)
            .metadata(serde_json::json!({ "reason": message })),
    )
    .await;
    AppError::Forbidden(message)
}

/// Store an audit record; failures are logged only.
pub async fn record_audit(state: &AppState, entry: NewAuditLog) {
    if let Err(e) = state.repo.insert_audit_log(&entry).await {
        tracing::warn!(
            collection = entry.collection,
            action = %entry.action,
            "Failed to write audit log: {}",
            e
        );
    }
}

/// Deliver notifications; failures are logged only.
pub async fn notify(state: &AppState, batch: Vec<NewNotification>) {
    if batch.is_empty() {
        return;
    }
    match state.repo.insert_notifications(&batch).await {
        Ok(stored) => tracing::debug!(count = stored.len(), "Notifications stored"),
        Err(e) => tracing::warn!(count = batch.len(), "Failed to store notifications: {}", e),
    }
}

pub async fn index_project(state: &AppState, project: &Project) {
    if let Err(e) = state.search.index_project(project).await {
        tracing::warn!(project_id = %project.id, "Failed to index project: {}", e);
    }
}

pub async fn index_task(state: &AppState, task: &Task) {
    if let Err(e) = state.search.index_task(task).await {
        tracing::warn!(task_id = %task.id, "Failed to index task: {}", e);
    }
}

pub async fn unindex(state: &AppState, kind: SearchKind, id: &str) {
    if let Err(e) = state.search.remove(kind, id).await {
        tracing::warn!(kind = %kind, id, "Failed to remove document from index: {}", e);
    }
}

pub async fn load_member(state: &AppState, id: &str) -> Result<Member, AppError> {
    state
        .repo
        .get_member(id)
        .await?
        .ok_or_else(|| AppError::not_found("Member", id))
}

pub async fn load_project(state: &AppState, id: &str) -> Result<Project, AppError> {
    state
        .repo
        .get_project(id)
        .await?
        .ok_or_else(|| AppError::not_found("Project", id))
}

pub async fn load_task(state: &AppState, id: &str) -> Result<Task, AppError> {
    state
        .repo
        .get_task(id)
        .await?
        .ok_or_else(|| AppError::not_found("Task", id))
}

pub async fn load_timesheet(state: &AppState, id: &str) -> Result<TimesheetEntry, AppError> {
    state
        .repo
        .get_timesheet(id)
        .await?
        .ok_or_else(|| AppError::not_found("Timesheet entry", id))
}

/// Reject a stale `expected_version` before attempting the write.
pub fn check_version(expected: Option<i64>, current: i64) -> Result<(), AppError> {
    match expected {
        Some(v) if v != current => Err(AppError::Conflict {
            message: format!("Version mismatch: expected {}, found {}", v, current),
            current_version: current,
        }),
        _ => Ok(()),
    }
}

/// Ids present in `after` but not in `before`.
pub fn added_ids<'a>(before: &[String], after: &'a [String]) -> Vec<&'a String> {
    after.iter().filter(|id| !before.contains(id)).collect()
}

/// Drop duplicates while keeping first-seen order.
pub fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_version() {
        assert!(check_version(None, 4).is_ok());
        assert!(check_version(Some(4), 4).is_ok());
        match check_version(Some(3), 4) {
            Err(AppError::Conflict {
                current_version, ..
            }) => assert_eq!(current_version, 4),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_added_ids_and_dedup() {
        let before = vec!["a".to_string(), "b".to_string()];
        let after = vec!["b".to_string(), "c".to_string()];
        assert_eq!(added_ids(&before, &after), vec![&"c".to_string()]);

        let ids = dedup_ids(vec!["x".into(), "y".into(), "x".into()]);
        assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    }
}
