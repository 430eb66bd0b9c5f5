//! Count queries backing KPIs and admin statistics.

use chrono::NaiveDate;
use sqlx::Row;

use super::Repository;
use crate::errors::AppError;

/// Row counts per table.
#[derive(Debug, Clone, Default)]
pub struct TableCounts {
    pub projects: i64,
    pub active_projects: i64,
    pub tasks: i64,
    pub members: i64,
    pub timesheets: i64,
    pub comments: i64,
    pub notifications: i64,
    pub audit_logs: i64,
}

/// Portfolio counters as of a given day.
#[derive(Debug, Clone, Default)]
pub struct PortfolioCounts {
    pub total_projects: i64,
    pub active_projects: i64,
    pub done_projects: i64,
    pub late_projects: i64,
    pub total_tasks: i64,
    pub done_tasks: i64,
    pub late_tasks: i64,
    pub active_members: i64,
    pub allocated_budget: f64,
    pub consumed_budget: f64,
}

impl Repository {
    pub async fn table_counts(&self) -> Result<TableCounts, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM projects) AS projects,
                (SELECT COUNT(*) FROM projects
                    WHERE status IN ('planning', 'in_progress', 'paused')) AS active_projects,
                (SELECT COUNT(*) FROM tasks) AS tasks,
                (SELECT COUNT(*) FROM members) AS members,
                (SELECT COUNT(*) FROM timesheets) AS timesheets,
                (SELECT COUNT(*) FROM comments) AS comments,
                (SELECT COUNT(*) FROM notifications) AS notifications,
                (SELECT COUNT(*) FROM audit_logs) AS audit_logs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TableCounts {
            projects: row.get("projects"),
            active_projects: row.get("active_projects"),
            tasks: row.get("tasks"),
            members: row.get("members"),
            timesheets: row.get("timesheets"),
            comments: row.get("comments"),
            notifications: row.get("notifications"),
            audit_logs: row.get("audit_logs"),
        })
    }

    /// Size of the database file in bytes.
    pub async fn database_size(&self) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT page_count * page_size AS size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("size"))
    }

    /// Project, task and member counters; lateness is judged against `today`.
    pub async fn portfolio_counts(&self, today: NaiveDate) -> Result<PortfolioCounts, AppError> {
        let row = sqlx::query(
            r#"
            WITH live_projects AS (SELECT * FROM projects WHERE is_template = 0),
                 live_tasks AS (SELECT * FROM tasks WHERE project_id NOT IN
                     (SELECT id FROM projects WHERE is_template = 1))
            SELECT
                (SELECT COUNT(*) FROM live_projects) AS total_projects,
                (SELECT COUNT(*) FROM live_projects
                    WHERE status IN ('planning', 'in_progress', 'paused')) AS active_projects,
                (SELECT COUNT(*) FROM live_projects WHERE status = 'done') AS done_projects,
                (SELECT COUNT(*) FROM live_projects
                    WHERE planned_end < ?1 AND status != 'done') AS late_projects,
                (SELECT COUNT(*) FROM live_tasks) AS total_tasks,
                (SELECT COUNT(*) FROM live_tasks WHERE status = 'done') AS done_tasks,
                (SELECT COUNT(*) FROM live_tasks
                    WHERE planned_end IS NOT NULL AND planned_end < ?1
                      AND status NOT IN ('done', 'cancelled')) AS late_tasks,
                (SELECT COUNT(*) FROM members WHERE status = 'active') AS active_members,
                (SELECT COALESCE(SUM(allocated_budget), 0.0) FROM live_projects) AS allocated_budget,
                (SELECT COALESCE(SUM(consumed_budget), 0.0) FROM live_projects) AS consumed_budget
            "#,
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        Ok(PortfolioCounts {
            total_projects: row.get("total_projects"),
            active_projects: row.get("active_projects"),
            done_projects: row.get("done_projects"),
            late_projects: row.get("late_projects"),
            total_tasks: row.get("total_tasks"),
            done_tasks: row.get("done_tasks"),
            late_tasks: row.get("late_tasks"),
            active_members: row.get("active_members"),
            allocated_budget: row.get("allocated_budget"),
            consumed_budget: row.get("consumed_budget"),
        })
    }
}
