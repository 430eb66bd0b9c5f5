//! Project persistence.
//!
//! `consumed_budget` is only ever written by the timesheet roll-up; project
//! updates leave the column alone.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::repository::{
    bump_revision, concurrent_modification, enum_column, json_column, like_pattern, to_json,
    unique_violation,
};
use super::tasks::write_task;
use super::Repository;
use crate::errors::AppError;
use crate::models::{Priority, Project, ProjectFilter, ProjectStatus, Task};

const PROJECT_COLUMNS: &str = "id, code, name, description, status, priority, planned_start, \
     planned_end, actual_start, actual_end, allocated_budget, consumed_budget, lead_id, member_ids, \
     milestones, tags, history, is_template, created_at, updated_at, version";

const PROJECT_FILTER: &str = "(?1 IS NULL OR status = ?1) \
     AND (?2 IS NULL OR priority = ?2) \
     AND (?3 IS NULL OR lead_id = ?3) \
     AND (?4 IS NULL OR lead_id = ?4 \
          OR EXISTS (SELECT 1 FROM json_each(projects.member_ids) WHERE value = ?4)) \
     AND (?5 IS NULL OR lower(name || ' ' || code || ' ' || coalesce(description, '')) LIKE ?5) \
     AND (?6 = 1 OR ?1 IS NOT NULL OR status != 'archived') \
     AND is_template = 0";

impl Repository {
    /// List projects matching `filter`, newest first.
    pub async fn list_projects(
        &self,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Project>, i64), AppError> {
        let status = filter.status.map(|s| s.as_str());
        let priority = filter.priority.map(|p| p.as_str());
        let search = like_pattern(filter.search.as_deref());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM projects WHERE {} ORDER BY created_at DESC LIMIT ?7 OFFSET ?8",
            PROJECT_COLUMNS, PROJECT_FILTER
        ))
        .bind(status)
        .bind(priority)
        .bind(&filter.lead_id)
        .bind(&filter.member_id)
        .bind(&search)
        .bind(filter.include_archived)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM projects WHERE {}",
            PROJECT_FILTER
        ))
        .bind(status)
        .bind(priority)
        .bind(&filter.lead_id)
        .bind(&filter.member_id)
        .bind(&search)
        .bind(filter.include_archived)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let projects = rows.iter().map(project_from_row).collect::<Result<_, _>>()?;
        Ok((projects, total))
    }

    pub async fn list_all_projects(&self) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM projects WHERE is_template = 0 ORDER BY created_at DESC",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(project_from_row).collect()
    }

    /// Project templates, by name.
    pub async fn list_templates(&self) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM projects WHERE is_template = 1 ORDER BY name",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(project_from_row).collect()
    }

    /// Projects the member leads or is assigned to.
    pub async fn list_projects_for_member(&self, member_id: &str) -> Result<Vec<Project>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM projects \
             WHERE is_template = 0 AND (lead_id = ?1 \
                 OR EXISTS (SELECT 1 FROM json_each(projects.member_ids) WHERE value = ?1)) \
             ORDER BY created_at DESC",
            PROJECT_COLUMNS
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(project_from_row).collect()
    }

    /// Get a project by ID.
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(project_from_row).transpose()
    }

    pub async fn project_code_exists(&self, code: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM projects WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total") > 0)
    }

    /// Next free `PROJ-nnnn` code.
    pub async fn next_project_code(&self) -> Result<String, AppError> {
        let rows = sqlx::query("SELECT code FROM projects WHERE code LIKE 'PROJ-%'")
            .fetch_all(&self.pool)
            .await?;

        let highest = rows
            .iter()
            .filter_map(|row| {
                let code: String = row.get("code");
                code.strip_prefix("PROJ-")?.parse::<u32>().ok()
            })
            .max()
            .unwrap_or(0);

        Ok(format!("PROJ-{:04}", highest + 1))
    }

    /// Insert a new project.
    pub async fn insert_project(&self, project: &Project) -> Result<(), AppError> {
        write_project(&mut *self.pool.acquire().await?, project).await?;
        self.increment_revision().await?;
        Ok(())
    }

    /// Insert a copied project together with its tasks, all or nothing.
    pub async fn insert_project_with_tasks(
        &self,
        project: &Project,
        tasks: &[Task],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        write_project(&mut *tx, project).await?;
        for task in tasks {
            write_task(&mut *tx, task).await?;
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Persist `project`, whose `version` is the one it was read at.
    ///
    /// Returns the stored record, including the current consumed budget.
    pub async fn update_project(&self, mut project: Project) -> Result<Project, AppError> {
        let expected = project.version;
        project.version += 1;
        project.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE projects SET name = ?, description = ?, status = ?, priority = ?, \
             planned_start = ?, planned_end = ?, actual_start = ?, actual_end = ?, \
             allocated_budget = ?, lead_id = ?, member_ids = ?, milestones = ?, tags = ?, \
             history = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(project.priority.as_str())
        .bind(project.planned_start)
        .bind(project.planned_end)
        .bind(project.actual_start)
        .bind(project.actual_end)
        .bind(project.allocated_budget)
        .bind(&project.lead_id)
        .bind(to_json(&project.member_ids)?)
        .bind(to_json(&project.milestones)?)
        .bind(to_json(&project.tags)?)
        .bind(to_json(&project.history)?)
        .bind(project.updated_at)
        .bind(project.version)
        .bind(&project.id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_project(&project.id).await?;
            return Err(concurrent_modification(current.map(|p| p.version)));
        }

        self.increment_revision().await?;

        self.get_project(&project.id)
            .await?
            .ok_or_else(|| AppError::not_found("Project", &project.id))
    }

    /// Delete a project together with the comments attached to it.
    pub async fn delete_project(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Project", id));
        }

        sqlx::query("DELETE FROM comments WHERE resource_type = 'project' AND resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Number of tasks and timesheet entries still pointing at the project.
    pub async fn project_dependents(&self, id: &str) -> Result<(i64, i64), AppError> {
        let tasks: i64 = sqlx::query("SELECT COUNT(*) AS total FROM tasks WHERE project_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?
            .get("total");
        let entries: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM timesheets WHERE project_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?
                .get("total");
        Ok((tasks, entries))
    }
}

/// Insert one project row on `conn`, leaving the revision to the caller.
async fn write_project(conn: &mut SqliteConnection, project: &Project) -> Result<(), AppError> {
    sqlx::query(&format!(
        "INSERT INTO projects ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        PROJECT_COLUMNS
    ))
    .bind(&project.id)
    .bind(&project.code)
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.status.as_str())
    .bind(project.priority.as_str())
    .bind(project.planned_start)
    .bind(project.planned_end)
    .bind(project.actual_start)
    .bind(project.actual_end)
    .bind(project.allocated_budget)
    .bind(project.consumed_budget)
    .bind(&project.lead_id)
    .bind(to_json(&project.member_ids)?)
    .bind(to_json(&project.milestones)?)
    .bind(to_json(&project.tags)?)
    .bind(to_json(&project.history)?)
    .bind(project.is_template)
    .bind(project.created_at)
    .bind(project.updated_at)
    .bind(project.version)
    .execute(conn)
    .await
    .map_err(|e| unique_violation(e, format!("Project code {} is already in use", project.code)))?;
    Ok(())
}

fn project_from_row(row: &SqliteRow) -> Result<Project, AppError> {
    Ok(Project {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        description: row.get("description"),
        status: enum_column(row, "status", ProjectStatus::parse)?,
        priority: enum_column(row, "priority", Priority::parse)?,
        planned_start: row.get("planned_start"),
        planned_end: row.get("planned_end"),
        actual_start: row.get("actual_start"),
        actual_end: row.get("actual_end"),
        allocated_budget: row.get("allocated_budget"),
        consumed_budget: row.get("consumed_budget"),
        lead_id: row.get("lead_id"),
        member_ids: json_column(row, "member_ids")?,
        milestones: json_column(row, "milestones")?,
        tags: json_column(row, "tags")?,
        history: json_column(row, "history")?,
        is_template: row.get("is_template"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}
