//! Comment persistence.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{bump_revision, enum_column, json_column, to_json};
use super::Repository;
use crate::errors::AppError;
use crate::models::{Comment, ResourceType};

const COMMENT_COLUMNS: &str = "id, resource_type, resource_id, author_id, body, mention_ids, \
     reply_to, edited, edited_at, created_at, updated_at";

impl Repository {
    /// Comments on one resource, oldest first.
    pub async fn list_comments(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Vec<Comment>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE resource_type = ? AND resource_id = ? ORDER BY created_at",
            COMMENT_COLUMNS
        ))
        .bind(resource_type.as_str())
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(comment_from_row).collect()
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(comment_from_row).transpose()
    }

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO comments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            COMMENT_COLUMNS
        ))
        .bind(&comment.id)
        .bind(comment.resource_type.as_str())
        .bind(&comment.resource_id)
        .bind(&comment.author_id)
        .bind(&comment.body)
        .bind(to_json(&comment.mention_ids)?)
        .bind(&comment.reply_to)
        .bind(comment.edited)
        .bind(comment.edited_at)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;
        Ok(())
    }

    /// Store an edited body.
    pub async fn update_comment(&self, comment: &Comment) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE comments SET body = ?, mention_ids = ?, edited = ?, edited_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&comment.body)
        .bind(to_json(&comment.mention_ids)?)
        .bind(comment.edited)
        .bind(comment.edited_at)
        .bind(comment.updated_at)
        .bind(&comment.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Comment", &comment.id));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Delete a comment and its replies.
    pub async fn delete_comment(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Comment", id));
        }

        sqlx::query("DELETE FROM comments WHERE reply_to = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment, AppError> {
    Ok(Comment {
        id: row.get("id"),
        resource_type: enum_column(row, "resource_type", ResourceType::parse)?,
        resource_id: row.get("resource_id"),
        author_id: row.get("author_id"),
        body: row.get("body"),
        mention_ids: json_column(row, "mention_ids")?,
        reply_to: row.get("reply_to"),
        edited: row.get("edited"),
        edited_at: row.get("edited_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
