//! Notification persistence.
//!
//! Notifications are per-member side data and do not move the revision counter.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{enum_column, optional_enum_column};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    Channel, NewNotification, Notification, NotificationFilter, NotificationKind,
    NotificationStatus, ResourceType,
};

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, kind, title, message, resource_type, \
     resource_id, action_url, status, channel, read_at, created_at";

const NOTIFICATION_FILTER: &str = "recipient_id = ?1 \
     AND (?2 IS NULL OR status = ?2) \
     AND (?3 IS NULL OR kind = ?3)";

impl Repository {
    /// Store a batch of notifications in one transaction.
    pub async fn insert_notifications(
        &self,
        batch: &[NewNotification],
    ) -> Result<Vec<Notification>, AppError> {
        let now = Utc::now();
        let mut stored = Vec::with_capacity(batch.len());
        let mut tx = self.pool.begin().await?;

        for n in batch {
            let notification = Notification {
                id: uuid::Uuid::new_v4().to_string(),
                recipient_id: n.recipient_id.clone(),
                kind: n.kind,
                title: n.title.clone(),
                message: n.message.clone(),
                resource_type: n.resource.as_ref().map(|(kind, _)| *kind),
                resource_id: n.resource.as_ref().map(|(_, id)| id.clone()),
                action_url: n.action_url(),
                status: NotificationStatus::Unread,
                channel: n.channel,
                read_at: None,
                created_at: now,
            };

            sqlx::query(&format!(
                "INSERT INTO notifications ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                NOTIFICATION_COLUMNS
            ))
            .bind(&notification.id)
            .bind(&notification.recipient_id)
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.resource_type.map(|r| r.as_str()))
            .bind(&notification.resource_id)
            .bind(&notification.action_url)
            .bind(notification.status.as_str())
            .bind(notification.channel.as_str())
            .bind(notification.read_at)
            .bind(notification.created_at)
            .execute(&mut *tx)
            .await?;

            stored.push(notification);
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// A member's notifications, newest first.
    pub async fn list_notifications(
        &self,
        recipient_id: &str,
        filter: &NotificationFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Notification>, i64), AppError> {
        let status = filter.status.map(|s| s.as_str());
        let kind = filter.kind.map(|k| k.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE {} ORDER BY created_at DESC LIMIT ?4 OFFSET ?5",
            NOTIFICATION_COLUMNS, NOTIFICATION_FILTER
        ))
        .bind(recipient_id)
        .bind(status)
        .bind(kind)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM notifications WHERE {}",
            NOTIFICATION_FILTER
        ))
        .bind(recipient_id)
        .bind(status)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let items = rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<_, _>>()?;
        Ok((items, total))
    }

    pub async fn count_unread_notifications(&self, recipient_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM notifications WHERE recipient_id = ? AND status = 'unread'",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    pub async fn get_notification(&self, id: &str) -> Result<Option<Notification>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE id = ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    /// Set the status of one notification; `read_at` is kept once set.
    pub async fn set_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        read_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = ?, read_at = COALESCE(read_at, ?) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(read_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Mark every unread notification of a member as read.
    pub async fn mark_all_notifications_read(&self, recipient_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'read', read_at = ? \
             WHERE recipient_id = ? AND status = 'unread'",
        )
        .bind(Utc::now())
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Remove archived notifications created before `cutoff`.
    pub async fn delete_archived_notifications_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE status = 'archived' AND created_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, AppError> {
    Ok(Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        kind: enum_column(row, "kind", NotificationKind::parse)?,
        title: row.get("title"),
        message: row.get("message"),
        resource_type: optional_enum_column(row, "resource_type", ResourceType::parse)?,
        resource_id: row.get("resource_id"),
        action_url: row.get("action_url"),
        status: enum_column(row, "status", NotificationStatus::parse)?,
        channel: enum_column(row, "channel", Channel::parse)?,
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    })
}
