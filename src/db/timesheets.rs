//! Timesheet persistence and the transactional budget roll-up.
//!
//! Every status change that moves an entry into or out of `approved` applies
//! its `RollupDelta` to the project and task counters in the same transaction.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::repository::{bump_revision, enum_column, to_json, unique_violation};
use super::Repository;
use crate::analytics::budget::RollupDelta;
use crate::errors::AppError;
use crate::models::{TimesheetEntry, TimesheetFilter, TimesheetStatus};

const ENTRY_COLUMNS: &str = "id, member_id, project_id, task_id, date, hours, description, status, \
     approver_id, approved_at, approval_comment, approved_cost, created_at, updated_at";

const ENTRY_FILTER: &str = "(?1 IS NULL OR member_id = ?1) \
     AND (?2 IS NULL OR project_id = ?2) \
     AND (?3 IS NULL OR task_id = ?3) \
     AND (?4 IS NULL OR status = ?4) \
     AND (?5 IS NULL OR date >= ?5) \
     AND (?6 IS NULL OR date <= ?6)";

const DUPLICATE_ENTRY: &str = "An entry already exists for this member, project and date";

impl Repository {
    /// List entries matching `filter`, most recent day first.
    pub async fn list_timesheets(
        &self,
        filter: &TimesheetFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TimesheetEntry>, i64), AppError> {
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM timesheets WHERE {} ORDER BY date DESC, created_at DESC LIMIT ?7 OFFSET ?8",
            ENTRY_COLUMNS, ENTRY_FILTER
        ))
        .bind(&filter.member_id)
        .bind(&filter.project_id)
        .bind(&filter.task_id)
        .bind(status)
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM timesheets WHERE {}",
            ENTRY_FILTER
        ))
        .bind(&filter.member_id)
        .bind(&filter.project_id)
        .bind(&filter.task_id)
        .bind(status)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let entries = rows.iter().map(entry_from_row).collect::<Result<_, _>>()?;
        Ok((entries, total))
    }

    /// Approved entries, optionally narrowed to a member, a project and a date range.
    pub async fn list_approved_entries(
        &self,
        member_id: Option<&str>,
        project_id: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TimesheetEntry>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM timesheets WHERE {} ORDER BY date",
            ENTRY_COLUMNS, ENTRY_FILTER
        ))
        .bind(member_id)
        .bind(project_id)
        .bind(None::<String>)
        .bind(TimesheetStatus::Approved.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Get an entry by ID.
    pub async fn get_timesheet(&self, id: &str) -> Result<Option<TimesheetEntry>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM timesheets WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// ID of the entry already booked for (member, project, date), if any.
    pub async fn find_timesheet_slot(
        &self,
        member_id: &str,
        project_id: &str,
        date: NaiveDate,
    ) -> Result<Option<String>, AppError> {
        let row = sqlx::query(
            "SELECT id FROM timesheets WHERE member_id = ? AND project_id = ? AND date = ?",
        )
        .bind(member_id)
        .bind(project_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Insert a new, never approved entry.
    pub async fn insert_timesheet(&self, entry: &TimesheetEntry) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO timesheets ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ENTRY_COLUMNS
        ))
        .bind(&entry.id)
        .bind(&entry.member_id)
        .bind(&entry.project_id)
        .bind(&entry.task_id)
        .bind(entry.date)
        .bind(entry.hours)
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(&entry.approver_id)
        .bind(entry.approved_at)
        .bind(&entry.approval_comment)
        .bind(entry.approved_cost)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, DUPLICATE_ENTRY))?;

        self.increment_revision().await?;
        Ok(())
    }

    /// Store edits to an entry that is not approved and does not become approved.
    ///
    /// `expected_status` guards against a concurrent approval.
    pub async fn update_timesheet(
        &self,
        entry: &TimesheetEntry,
        expected_status: TimesheetStatus,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE timesheets SET task_id = ?, date = ?, hours = ?, description = ?, status = ?, \
             updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(&entry.task_id)
        .bind(entry.date)
        .bind(entry.hours)
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(entry.updated_at)
        .bind(&entry.id)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, DUPLICATE_ENTRY))?;

        if result.rows_affected() == 0 {
            return Err(status_changed(&entry.id));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Move an entry to `entry.status` and apply `delta` to the counters, atomically.
    pub async fn transition_timesheet(
        &self,
        entry: &TimesheetEntry,
        expected_status: TimesheetStatus,
        delta: Option<RollupDelta>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE timesheets SET status = ?, approver_id = ?, approved_at = ?, \
             approval_comment = ?, approved_cost = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(entry.status.as_str())
        .bind(&entry.approver_id)
        .bind(entry.approved_at)
        .bind(&entry.approval_comment)
        .bind(entry.approved_cost)
        .bind(entry.updated_at)
        .bind(&entry.id)
        .bind(expected_status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(status_changed(&entry.id));
        }

        if let Some(delta) = delta {
            apply_rollup(&mut *tx, entry, delta).await?;
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete an entry and apply `delta` to the counters, atomically.
    pub async fn delete_timesheet(
        &self,
        entry: &TimesheetEntry,
        delta: Option<RollupDelta>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM timesheets WHERE id = ? AND status = ?")
            .bind(&entry.id)
            .bind(entry.status.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(status_changed(&entry.id));
        }

        sqlx::query("DELETE FROM comments WHERE resource_type = 'timesheet' AND resource_id = ?")
            .bind(&entry.id)
            .execute(&mut *tx)
            .await?;

        if let Some(delta) = delta {
            apply_rollup(&mut *tx, entry, delta).await?;
        }

        bump_revision(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Submitted entries waiting for approval on any of `project_ids`.
    pub async fn count_submitted_timesheets(&self, project_ids: &[String]) -> Result<i64, AppError> {
        if project_ids.is_empty() {
            return Ok(0);
        }
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM timesheets \
             WHERE status = 'submitted' AND project_id IN (SELECT value FROM json_each(?))",
        )
        .bind(to_json(&project_ids)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    /// Sum of approved hours in `[from, to]`, optionally for one member.
    pub async fn sum_approved_hours(
        &self,
        member_id: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64, AppError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(hours), 0.0) AS total FROM timesheets \
             WHERE status = 'approved' AND (?1 IS NULL OR member_id = ?1) AND date >= ?2 AND date <= ?3",
        )
        .bind(member_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }
}

async fn apply_rollup(
    conn: &mut SqliteConnection,
    entry: &TimesheetEntry,
    delta: RollupDelta,
) -> Result<(), AppError> {
    let now = Utc::now();

    sqlx::query(
        "UPDATE projects SET consumed_budget = MAX(0, consumed_budget + ?), updated_at = ? WHERE id = ?",
    )
    .bind(delta.cost)
    .bind(now)
    .bind(&entry.project_id)
    .execute(&mut *conn)
    .await?;

    if let Some(task_id) = &entry.task_id {
        sqlx::query(
            "UPDATE tasks SET actual_hours = MAX(0, actual_hours + ?), updated_at = ? WHERE id = ?",
        )
        .bind(delta.hours)
        .bind(now)
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    }

    tracing::debug!(
        entry_id = %entry.id,
        project_id = %entry.project_id,
        cost = delta.cost,
        hours = delta.hours,
        "Applied timesheet roll-up"
    );
    Ok(())
}

fn status_changed(id: &str) -> AppError {
    AppError::Conflict {
        message: format!("Timesheet entry {} was modified concurrently", id),
        current_version: 0,
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<TimesheetEntry, AppError> {
    Ok(TimesheetEntry {
        id: row.get("id"),
        member_id: row.get("member_id"),
        project_id: row.get("project_id"),
        task_id: row.get("task_id"),
        date: row.get("date"),
        hours: row.get("hours"),
        description: row.get("description"),
        status: enum_column(row, "status", TimesheetStatus::parse)?,
        approver_id: row.get("approver_id"),
        approved_at: row.get("approved_at"),
        approval_comment: row.get("approval_comment"),
        approved_cost: row.get("approved_cost"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::super::repository::test_repository;
    use super::*;
    use crate::analytics::testing::{date, entry, project, task};
    use crate::models::TaskStatus;

    #[tokio::test]
    async fn test_rollup_is_applied_and_reverted() {
        let (_dir, repo) = test_repository().await;
        repo.insert_project(&project("p1", 1000.0, date(2024, 6, 30)))
            .await
            .unwrap();
        repo.insert_task(&task("t1", 10.0, TaskStatus::InProgress, "m1"))
            .await
            .unwrap();

        let mut e = entry("m1", date(2024, 3, 4), 5.0, TimesheetStatus::Submitted);
        e.task_id = Some("t1".to_string());
        repo.insert_timesheet(&e).await.unwrap();

        e.status = TimesheetStatus::Approved;
        e.approved_cost = Some(250.0);
        repo.transition_timesheet(
            &e,
            TimesheetStatus::Submitted,
            Some(RollupDelta::approve(5.0, 50.0)),
        )
        .await
        .unwrap();

        let p = repo.get_project("p1").await.unwrap().unwrap();
        assert_eq!(p.consumed_budget, 250.0);
        let stored = repo.get_timesheet(&e.id).await.unwrap().unwrap();
        assert_eq!(stored.approved_cost, Some(250.0));
        let t = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(t.actual_hours, 5.0);

        // A second approval of the same transition finds the status moved
        let err = repo
            .transition_timesheet(
                &e,
                TimesheetStatus::Submitted,
                Some(RollupDelta::approve(5.0, 50.0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        let p = repo.get_project("p1").await.unwrap().unwrap();
        assert_eq!(p.consumed_budget, 250.0);

        repo.delete_timesheet(&e, Some(RollupDelta::revert(250.0, 5.0)))
            .await
            .unwrap();
        let p = repo.get_project("p1").await.unwrap().unwrap();
        assert_eq!(p.consumed_budget, 0.0);
        let t = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(t.actual_hours, 0.0);
    }

    #[tokio::test]
    async fn test_revert_floors_at_zero() {
        let (_dir, repo) = test_repository().await;
        repo.insert_project(&project("p1", 1000.0, date(2024, 6, 30)))
            .await
            .unwrap();
        let mut e = entry("m1", date(2024, 3, 4), 5.0, TimesheetStatus::Approved);
        repo.insert_timesheet(&e).await.unwrap();

        e.status = TimesheetStatus::Rejected;
        repo.transition_timesheet(
            &e,
            TimesheetStatus::Approved,
            Some(RollupDelta::revert(250.0, 5.0)),
        )
        .await
        .unwrap();

        let p = repo.get_project("p1").await.unwrap().unwrap();
        assert_eq!(p.consumed_budget, 0.0);
    }

    #[tokio::test]
    async fn test_duplicate_slot() {
        let (_dir, repo) = test_repository().await;
        let e = entry("m1", date(2024, 3, 4), 5.0, TimesheetStatus::Draft);
        repo.insert_timesheet(&e).await.unwrap();

        let mut dup = entry("m1", date(2024, 3, 4), 2.0, TimesheetStatus::Draft);
        dup.id = "other".to_string();
        let err = repo.insert_timesheet(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));

        assert_eq!(
            repo.find_timesheet_slot("m1", "p1", date(2024, 3, 4))
                .await
                .unwrap(),
            Some(e.id.clone())
        );
    }

    #[tokio::test]
    async fn test_sums_and_counts() {
        let (_dir, repo) = test_repository().await;
        for (day, hours, status) in [
            (4, 5.0, TimesheetStatus::Approved),
            (5, 3.0, TimesheetStatus::Approved),
            (6, 2.0, TimesheetStatus::Submitted),
        ] {
            repo.insert_timesheet(&entry("m1", date(2024, 3, day), hours, status))
                .await
                .unwrap();
        }

        let total = repo
            .sum_approved_hours(Some("m1"), date(2024, 3, 1), date(2024, 3, 31))
            .await
            .unwrap();
        assert_eq!(total, 8.0);
        assert_eq!(
            repo.count_submitted_timesheets(&["p1".to_string()])
                .await
                .unwrap(),
            1
        );
        let approved = repo
            .list_approved_entries(None, Some("p1"), Some(date(2024, 3, 5)), None)
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
    }
}
