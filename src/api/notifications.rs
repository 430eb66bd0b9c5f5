//! Notification inbox endpoints.

use axum::extract::{Path, Query, State};
use serde::Serialize;

use super::{current_revision, respond, ApiResult};
use crate::auth::Principal;
use crate::models::{Notification, NotificationFilter, NotificationList};
use crate::services::notifications;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<NotificationFilter>,
) -> ApiResult<NotificationList> {
    let revision_id = current_revision(&state).await;
    let result = notifications::list(&state, &principal, filter).await;
    respond(&state, revision_id, result).await
}

/// POST /api/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Notification> {
    let revision_id = current_revision(&state).await;
    let result = notifications::mark_read(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/notifications/read-all
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<MarkAllReadResponse> {
    let revision_id = current_revision(&state).await;
    let result = notifications::mark_all_read(&state, &principal)
        .await
        .map(|updated| MarkAllReadResponse { updated });
    respond(&state, revision_id, result).await
}

/// POST /api/notifications/:id/archive
pub async fn archive_notification(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Notification> {
    let revision_id = current_revision(&state).await;
    let result = notifications::archive(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;
    let result = notifications::delete(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}
