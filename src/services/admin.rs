//! Administration: table statistics, the audit trail and retention cleanup.

use chrono::{Duration, Utc};
use serde_json::json;

use super::{authorize, record_audit};
use crate::analytics::round2;
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{
    AdminStats, AuditAction, AuditFilter, AuditLog, CleanupReport, CleanupRequest, NewAuditLog,
    Page, PageQuery,
};
use crate::rbac::Permission;
use crate::AppState;

const DEFAULT_NOTIFICATION_RETENTION_DAYS: u32 = 30;
const DEFAULT_AUDIT_RETENTION_DAYS: u32 = 90;

pub async fn stats(state: &AppState, principal: &Principal) -> Result<AdminStats, AppError> {
    authorize(state, principal, Permission::AdminRead).await?;
    let counts = state.repo.table_counts().await?;
    let bytes = state.repo.database_size().await?;

    Ok(AdminStats {
        projects_total: counts.projects,
        projects_active: counts.active_projects,
        tasks_total: counts.tasks,
        members_total: counts.members,
        timesheets_total: counts.timesheets,
        comments_total: counts.comments,
        notifications_total: counts.notifications,
        audit_logs_total: counts.audit_logs,
        database_size_mb: bytes_to_mb(bytes),
    })
}

pub async fn audit_logs(
    state: &AppState,
    principal: &Principal,
    filter: AuditFilter,
) -> Result<Page<AuditLog>, AppError> {
    authorize(state, principal, Permission::AdminRead).await?;
    let (limit, offset) = PageQuery {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve(state.config.page_size);

    let (logs, total) = state.repo.list_audit_logs(&filter, limit, offset).await?;
    Ok(Page::new(logs, total, limit, offset))
}

/// Remove archived notifications and audit records past their retention.
pub async fn cleanup(
    state: &AppState,
    principal: &Principal,
    request: CleanupRequest,
) -> Result<CleanupReport, AppError> {
    authorize(state, principal, Permission::AdminWrite).await?;
    let notification_days = request
        .notifications_older_than_days
        .unwrap_or(DEFAULT_NOTIFICATION_RETENTION_DAYS);
    let audit_days = request
        .audit_logs_older_than_days
        .unwrap_or(DEFAULT_AUDIT_RETENTION_DAYS);

    let now = Utc::now();
    let notifications_deleted = state
        .repo
        .delete_archived_notifications_before(now - Duration::days(notification_days as i64))
        .await?;
    let audit_logs_deleted = state
        .repo
        .delete_audit_logs_before(now - Duration::days(audit_days as i64))
        .await?;

    tracing::info!(
        notifications_deleted,
        audit_logs_deleted,
        "Retention cleanup finished"
    );

    // Recorded after the purge so a zero-day audit retention keeps this entry.
    record_audit(
        state,
        NewAuditLog::new(AuditAction::Delete, "admin")
            .actor(&principal.member_id)
            .metadata(json!({
                "operation": "cleanup",
                "notificationsOlderThanDays": notification_days,
                "auditLogsOlderThanDays": audit_days,
                "notificationsDeleted": notifications_deleted,
                "auditLogsDeleted": audit_logs_deleted,
            })),
    )
    .await;

    Ok(CleanupReport {
        notifications_deleted,
        audit_logs_deleted,
    })
}

fn bytes_to_mb(bytes: i64) -> f64 {
    round2(bytes as f64 / 1024.0 / 1024.0)
}
