//! Task persistence.
//!
//! `actual_hours` is only ever written by the timesheet roll-up.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::repository::{
    bump_revision, concurrent_modification, enum_column, json_column, like_pattern, to_json,
};
use super::Repository;
use crate::errors::AppError;
use crate::models::{Priority, Task, TaskFilter, TaskStatus};

const TASK_COLUMNS: &str = "id, title, description, project_id, parent_id, status, priority, \
     assignee_ids, estimated_hours, actual_hours, planned_start, planned_end, actual_start, \
     actual_end, progress, dependency_ids, attachments, tags, history, created_at, updated_at, version";

const TASK_FILTER: &str = "(?1 IS NULL OR project_id = ?1) \
     AND (?2 IS NULL OR EXISTS (SELECT 1 FROM json_each(tasks.assignee_ids) WHERE value = ?2)) \
     AND (?3 IS NULL OR status = ?3) \
     AND (?4 IS NULL OR priority = ?4) \
     AND (?5 = 0 OR parent_id IS NULL) \
     AND (?6 IS NULL OR lower(title || ' ' || coalesce(description, '')) LIKE ?6) \
     AND (?1 IS NOT NULL OR project_id NOT IN (SELECT id FROM projects WHERE is_template = 1))";

/// Template tasks stay out of workload and portfolio figures.
const OUTSIDE_TEMPLATES: &str = "project_id NOT IN (SELECT id FROM projects WHERE is_template = 1)";

impl Repository {
    /// List tasks matching `filter`.
    pub async fn list_tasks(
        &self,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), AppError> {
        let status = filter.status.map(|s| s.as_str());
        let priority = filter.priority.map(|p| p.as_str());
        let search = like_pattern(filter.search.as_deref());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY created_at LIMIT ?7 OFFSET ?8",
            TASK_COLUMNS, TASK_FILTER
        ))
        .bind(&filter.project_id)
        .bind(&filter.assignee_id)
        .bind(status)
        .bind(priority)
        .bind(filter.root_only)
        .bind(&search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM tasks WHERE {}",
            TASK_FILTER
        ))
        .bind(&filter.project_id)
        .bind(&filter.assignee_id)
        .bind(status)
        .bind(priority)
        .bind(filter.root_only)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let tasks = rows.iter().map(task_from_row).collect::<Result<_, _>>()?;
        Ok((tasks, total))
    }

    pub async fn list_all_tasks(&self) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY created_at",
            TASK_COLUMNS, OUTSIDE_TEMPLATES
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Tasks that are neither done nor cancelled.
    pub async fn list_open_tasks(&self) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE status NOT IN ('done', 'cancelled') AND {} \
             ORDER BY created_at",
            TASK_COLUMNS, OUTSIDE_TEMPLATES
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    pub async fn list_project_tasks(&self, project_id: &str) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE project_id = ? ORDER BY created_at",
            TASK_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    pub async fn list_tasks_assigned_to(&self, member_id: &str) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks \
             WHERE EXISTS (SELECT 1 FROM json_each(tasks.assignee_ids) WHERE value = ?) \
             ORDER BY created_at",
            TASK_COLUMNS
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    pub async fn list_subtasks(&self, parent_id: &str) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE parent_id = ? ORDER BY created_at",
            TASK_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Get a task by ID.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// Load the tasks among `ids` that exist.
    pub async fn get_tasks(&self, ids: &[String]) -> Result<Vec<Task>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE id IN (SELECT value FROM json_each(?)) ORDER BY created_at",
            TASK_COLUMNS
        ))
        .bind(to_json(&ids)?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    /// Insert a new task.
    pub async fn insert_task(&self, task: &Task) -> Result<(), AppError> {
        write_task(&mut *self.pool.acquire().await?, task).await?;
        self.increment_revision().await?;
        Ok(())
    }

    /// Persist `task`, whose `version` is the one it was read at.
    pub async fn update_task(&self, mut task: Task) -> Result<Task, AppError> {
        let expected = task.version;
        task.version += 1;
        task.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, parent_id = ?, status = ?, priority = ?, \
             assignee_ids = ?, estimated_hours = ?, planned_start = ?, planned_end = ?, \
             actual_start = ?, actual_end = ?, progress = ?, dependency_ids = ?, attachments = ?, \
             tags = ?, history = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.parent_id)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(to_json(&task.assignee_ids)?)
        .bind(task.estimated_hours)
        .bind(task.planned_start)
        .bind(task.planned_end)
        .bind(task.actual_start)
        .bind(task.actual_end)
        .bind(task.progress)
        .bind(to_json(&task.dependency_ids)?)
        .bind(to_json(&task.attachments)?)
        .bind(to_json(&task.tags)?)
        .bind(to_json(&task.history)?)
        .bind(task.updated_at)
        .bind(task.version)
        .bind(&task.id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_task(&task.id).await?;
            return Err(concurrent_modification(current.map(|t| t.version)));
        }

        self.increment_revision().await?;

        self.get_task(&task.id)
            .await?
            .ok_or_else(|| AppError::not_found("Task", &task.id))
    }

    /// Delete a task; timesheet entries keep their hours but lose the task link.
    pub async fn delete_task(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Task", id));
        }

        sqlx::query("UPDATE timesheets SET task_id = NULL WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM comments WHERE resource_type = 'task' AND resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Number of subtasks and of tasks depending on `id`.
    pub async fn task_dependents(&self, id: &str) -> Result<(i64, i64), AppError> {
        let subtasks: i64 = sqlx::query("SELECT COUNT(*) AS total FROM tasks WHERE parent_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?
            .get("total");
        let dependants: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM tasks \
             WHERE EXISTS (SELECT 1 FROM json_each(tasks.dependency_ids) WHERE value = ?)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?
        .get("total");
        Ok((subtasks, dependants))
    }
}

/// Insert one task row on `conn`, leaving the revision to the caller.
pub(super) async fn write_task(conn: &mut SqliteConnection, task: &Task) -> Result<(), AppError> {
    sqlx::query(&format!(
        "INSERT INTO tasks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        TASK_COLUMNS
    ))
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.project_id)
    .bind(&task.parent_id)
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(to_json(&task.assignee_ids)?)
    .bind(task.estimated_hours)
    .bind(task.actual_hours)
    .bind(task.planned_start)
    .bind(task.planned_end)
    .bind(task.actual_start)
    .bind(task.actual_end)
    .bind(task.progress)
    .bind(to_json(&task.dependency_ids)?)
    .bind(to_json(&task.attachments)?)
    .bind(to_json(&task.tags)?)
    .bind(to_json(&task.history)?)
    .bind(task.created_at)
    .bind(task.updated_at)
    .bind(task.version)
    .execute(conn)
    .await?;
    Ok(())
}

fn task_from_row(row: &SqliteRow) -> Result<Task, AppError> {
    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        project_id: row.get("project_id"),
        parent_id: row.get("parent_id"),
        status: enum_column(row, "status", TaskStatus::parse)?,
        priority: enum_column(row, "priority", Priority::parse)?,
        assignee_ids: json_column(row, "assignee_ids")?,
        estimated_hours: row.get("estimated_hours"),
        actual_hours: row.get("actual_hours"),
        planned_start: row.get("planned_start"),
        planned_end: row.get("planned_end"),
        actual_start: row.get("actual_start"),
        actual_end: row.get("actual_end"),
        progress: row.get("progress"),
        dependency_ids: json_column(row, "dependency_ids")?,
        attachments: json_column(row, "attachments")?,
        tags: json_column(row, "tags")?,
        history: json_column(row, "history")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}
