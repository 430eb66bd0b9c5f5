//! The acting member's notification inbox.
//!
//! Every member may manage their own inbox whatever their role; ownership is
//! the only gate.

use chrono::Utc;

use super::deny;
use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::{Notification, NotificationFilter, NotificationList, NotificationStatus, PageQuery};
use crate::AppState;

pub async fn list(
    state: &AppState,
    principal: &Principal,
    filter: NotificationFilter,
) -> Result<NotificationList, AppError> {
    let (limit, offset) = PageQuery {
        page: filter.page,
        page_size: filter.page_size,
    }
    .resolve(state.config.page_size);

    let (items, total) = state
        .repo
        .list_notifications(&principal.member_id, &filter, limit, offset)
        .await?;
    let unread = state
        .repo
        .count_unread_notifications(&principal.member_id)
        .await?;
    Ok(NotificationList {
        items,
        total,
        unread,
    })
}

pub async fn mark_read(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<Notification, AppError> {
    set_status(state, principal, id, NotificationStatus::Read).await
}

pub async fn archive(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<Notification, AppError> {
    set_status(state, principal, id, NotificationStatus::Archived).await
}

/// Number of notifications that were unread.
pub async fn mark_all_read(state: &AppState, principal: &Principal) -> Result<u64, AppError> {
    state
        .repo
        .mark_all_notifications_read(&principal.member_id)
        .await
}

pub async fn delete(state: &AppState, principal: &Principal, id: &str) -> Result<(), AppError> {
    own_notification(state, principal, id).await?;
    state.repo.delete_notification(id).await
}

async fn set_status(
    state: &AppState,
    principal: &Principal,
    id: &str,
    status: NotificationStatus,
) -> Result<Notification, AppError> {
    own_notification(state, principal, id).await?;

    // Archiving an unread notification also counts as reading it.
    state
        .repo
        .set_notification_status(id, status, Some(Utc::now()))
        .await?;
    own_notification(state, principal, id).await
}

async fn own_notification(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<Notification, AppError> {
    let notification = state
        .repo
        .get_notification(id)
        .await?
        .ok_or_else(|| AppError::not_found("Notification", id))?;
    if !principal.is(&notification.recipient_id) {
        return Err(deny(
            state,
            principal,
            "notifications",
            format!("Notification {} belongs to another member", id),
        )
        .await);
    }
    Ok(notification)
}
