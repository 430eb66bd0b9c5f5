//! Audit trail persistence.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{enum_column, json_column, to_json};
use super::Repository;
use crate::errors::AppError;
use crate::models::{AuditAction, AuditFilter, AuditLog, NewAuditLog};

const AUDIT_COLUMNS: &str =
    "id, action, collection, document_id, actor_id, timestamp, changes, snapshot, metadata";

// Timestamps are RFC 3339 text, so the first ten characters are the UTC day.
const AUDIT_FILTER: &str = "(?1 IS NULL OR action = ?1) \
     AND (?2 IS NULL OR collection = ?2) \
     AND (?3 IS NULL OR actor_id = ?3) \
     AND (?4 IS NULL OR document_id = ?4) \
     AND (?5 IS NULL OR substr(timestamp, 1, 10) >= ?5) \
     AND (?6 IS NULL OR substr(timestamp, 1, 10) <= ?6)";

impl Repository {
    pub async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<AuditLog, AppError> {
        let log = AuditLog {
            id: uuid::Uuid::new_v4().to_string(),
            action: entry.action,
            collection: entry.collection.to_string(),
            document_id: entry.document_id.clone(),
            actor_id: entry.actor_id.clone(),
            timestamp: Utc::now(),
            changes: entry.changes.clone(),
            snapshot: entry.snapshot.clone(),
            metadata: entry.metadata.clone(),
        };

        sqlx::query(&format!(
            "INSERT INTO audit_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        ))
        .bind(&log.id)
        .bind(log.action.as_str())
        .bind(&log.collection)
        .bind(&log.document_id)
        .bind(&log.actor_id)
        .bind(log.timestamp)
        .bind(to_json(&log.changes)?)
        .bind(log.snapshot.as_ref().map(to_json).transpose()?)
        .bind(log.metadata.as_ref().map(to_json).transpose()?)
        .execute(&self.pool)
        .await?;

        Ok(log)
    }

    /// Audit records matching `filter`, newest first.
    pub async fn list_audit_logs(
        &self,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        let action = filter.action.map(|a| a.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM audit_logs WHERE {} ORDER BY timestamp DESC LIMIT ?7 OFFSET ?8",
            AUDIT_COLUMNS, AUDIT_FILTER
        ))
        .bind(action)
        .bind(&filter.collection)
        .bind(&filter.actor_id)
        .bind(&filter.document_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM audit_logs WHERE {}",
            AUDIT_FILTER
        ))
        .bind(action)
        .bind(&filter.collection)
        .bind(&filter.actor_id)
        .bind(&filter.document_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let logs = rows.iter().map(audit_from_row).collect::<Result<_, _>>()?;
        Ok((logs, total))
    }

    pub async fn delete_audit_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditLog, AppError> {
    let snapshot: Option<String> = row.get("snapshot");
    let metadata: Option<String> = row.get("metadata");
    Ok(AuditLog {
        id: row.get("id"),
        action: enum_column(row, "action", AuditAction::parse)?,
        collection: row.get("collection"),
        document_id: row.get("document_id"),
        actor_id: row.get("actor_id"),
        timestamp: row.get("timestamp"),
        changes: json_column(row, "changes")?,
        snapshot: snapshot.map(|s| serde_json::from_str(&s)).transpose()?,
        metadata: metadata.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}
