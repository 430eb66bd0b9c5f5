//! Administration endpoints.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{current_revision, respond, ApiResult};
use crate::auth::Principal;
use crate::models::{AdminStats, AuditFilter, AuditLog, CleanupReport, CleanupRequest, Page};
use crate::services::admin;
use crate::AppState;

/// GET /api/admin/stats
pub async fn admin_stats(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<AdminStats> {
    let revision_id = current_revision(&state).await;
    let result = admin::stats(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/admin/audit-logs
pub async fn list_audit_logs(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Page<AuditLog>> {
    let revision_id = current_revision(&state).await;
    let result = admin::audit_logs(&state, &principal, filter).await;
    respond(&state, revision_id, result).await
}

/// POST /api/admin/cleanup - Retention windows default to 30 and 90 days.
pub async fn cleanup(
    State(state): State<AppState>,
    principal: Principal,
    body: Option<Json<CleanupRequest>>,
) -> ApiResult<CleanupReport> {
    let revision_id = current_revision(&state).await;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let result = admin::cleanup(&state, &principal, request).await;
    respond(&state, revision_id, result).await
}
