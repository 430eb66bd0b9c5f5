//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Entity
//! operations live in sibling modules as further `impl Repository` blocks.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::errors::AppError;
use crate::models::RevisionInfo;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }
}

/// Increment the revision inside an open transaction.
pub(super) async fn bump_revision(conn: &mut SqliteConnection) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(conn)
        .await?;
    Ok(())
}

/// Error returned when a conditional `UPDATE ... AND version = ?` touched no row.
pub(super) fn concurrent_modification(current_version: Option<i64>) -> AppError {
    AppError::Conflict {
        message: "Concurrent modification detected".to_string(),
        current_version: current_version.unwrap_or(0),
    }
}

/// Map a unique-constraint violation to a duplicate error with `message`.
pub(super) fn unique_violation(err: sqlx::Error, message: impl Into<String>) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Duplicate(message.into())
        }
        _ => err.into(),
    }
}

pub(super) fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON text column, treating NULL as the default value.
pub(super) fn json_column<T: DeserializeOwned + Default>(
    row: &SqliteRow,
    column: &str,
) -> Result<T, AppError> {
    let raw: Option<String> = row.get(column);
    match raw {
        Some(s) if !s.is_empty() => Ok(serde_json::from_str(&s)?),
        _ => Ok(T::default()),
    }
}

/// Decode an enum stored as TEXT.
pub(super) fn enum_column<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, AppError> {
    let raw: String = row.get(column);
    parse(&raw).ok_or_else(|| {
        AppError::Internal(format!("Unexpected value {:?} in column {}", raw, column))
    })
}

/// Optional enum stored as nullable TEXT.
pub(super) fn optional_enum_column<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, AppError> {
    let raw: Option<String> = row.get(column);
    raw.map(|s| {
        parse(&s).ok_or_else(|| {
            AppError::Internal(format!("Unexpected value {:?} in column {}", s, column))
        })
    })
    .transpose()
}

/// Lower-cased `LIKE` pattern for a free-text filter.
pub(super) fn like_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()))
}

/// Fresh repository on a temporary database.
#[cfg(test)]
pub(super) async fn test_repository() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = super::init_database(&dir.path().join("test.sqlite"))
        .await
        .unwrap();
    (dir, Repository::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revision_starts_at_zero_and_increments() {
        let (_dir, repo) = test_repository().await;
        assert_eq!(repo.get_revision_id().await.unwrap(), 0);
        assert_eq!(repo.increment_revision().await.unwrap(), 1);
        assert_eq!(repo.get_revision_info().await.unwrap().revision_id, 1);
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(Some(" Alpha ")), Some("%alpha%".to_string()));
        assert_eq!(like_pattern(Some("  ")), None);
        assert_eq!(like_pattern(None), None);
    }
}
