//! Member persistence.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{
    concurrent_modification, enum_column, json_column, like_pattern, to_json, unique_violation,
};
use super::Repository;
use crate::errors::AppError;
use crate::models::{Member, MemberFilter, MemberStatus, Role};

const MEMBER_COLUMNS: &str = "id, first_name, last_name, email, phone, role, secondary_roles, \
     status, hire_date, skills, hourly_rate, weekly_availability, leaves, created_at, updated_at, version";

const MEMBER_FILTER: &str = "(?1 IS NULL OR role = ?1) \
     AND (?2 IS NULL OR status = ?2) \
     AND (?3 IS NULL OR lower(first_name || ' ' || last_name || ' ' || email) LIKE ?3)";

impl Repository {
    pub async fn count_members(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM members")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// List members matching `filter`, one page at a time.
    pub async fn list_members(
        &self,
        filter: &MemberFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Member>, i64), AppError> {
        let role = filter.role.map(|r| r.as_str());
        let status = filter.status.map(|s| s.as_str());
        let search = like_pattern(filter.search.as_deref());

        let rows = sqlx::query(&format!(
            "SELECT {} FROM members WHERE {} ORDER BY last_name, first_name LIMIT ?4 OFFSET ?5",
            MEMBER_COLUMNS, MEMBER_FILTER
        ))
        .bind(role)
        .bind(status)
        .bind(&search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM members WHERE {}",
            MEMBER_FILTER
        ))
        .bind(role)
        .bind(status)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let members = rows.iter().map(member_from_row).collect::<Result<_, _>>()?;
        Ok((members, total))
    }

    /// Every member, ordered by name.
    pub async fn list_all_members(&self) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM members ORDER BY last_name, first_name",
            MEMBER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    pub async fn list_active_members(&self) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM members WHERE status = ? ORDER BY last_name, first_name",
            MEMBER_COLUMNS
        ))
        .bind(MemberStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    /// Get a member by ID.
    pub async fn get_member(&self, id: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// Look up a member by (lower-cased) email.
    pub async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM members WHERE email = ?",
            MEMBER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// Insert a new member.
    pub async fn insert_member(&self, member: &Member) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO members ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            MEMBER_COLUMNS
        ))
        .bind(&member.id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.role.as_str())
        .bind(to_json(&member.secondary_roles)?)
        .bind(member.status.as_str())
        .bind(member.hire_date)
        .bind(to_json(&member.skills)?)
        .bind(member.hourly_rate)
        .bind(member.weekly_availability)
        .bind(to_json(&member.leaves)?)
        .bind(member.created_at)
        .bind(member.updated_at)
        .bind(member.version)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("Email {} is already in use", member.email)))?;

        self.increment_revision().await?;
        Ok(())
    }

    /// Persist `member`, whose `version` is the one it was read at.
    ///
    /// Returns the stored record with its new version.
    pub async fn update_member(&self, mut member: Member) -> Result<Member, AppError> {
        let expected = member.version;
        member.version += 1;
        member.updated_at = Utc::now();

        // Use conditional UPDATE with version check to prevent race conditions
        let result = sqlx::query(
            "UPDATE members SET first_name = ?, last_name = ?, email = ?, phone = ?, role = ?, \
             secondary_roles = ?, status = ?, hire_date = ?, skills = ?, hourly_rate = ?, \
             weekly_availability = ?, leaves = ?, updated_at = ?, version = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.role.as_str())
        .bind(to_json(&member.secondary_roles)?)
        .bind(member.status.as_str())
        .bind(member.hire_date)
        .bind(to_json(&member.skills)?)
        .bind(member.hourly_rate)
        .bind(member.weekly_availability)
        .bind(to_json(&member.leaves)?)
        .bind(member.updated_at)
        .bind(member.version)
        .bind(&member.id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("Email {} is already in use", member.email)))?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            let current = self.get_member(&member.id).await?;
            return Err(concurrent_modification(current.map(|m| m.version)));
        }

        self.increment_revision().await?;
        Ok(member)
    }

    /// Delete a member.
    pub async fn delete_member(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Member", id));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Number of projects (led or joined) and tasks the member is attached to.
    pub async fn member_assignments(&self, id: &str) -> Result<(i64, i64), AppError> {
        let projects: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM projects \
             WHERE lead_id = ?1 OR EXISTS (SELECT 1 FROM json_each(projects.member_ids) WHERE value = ?1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        let tasks: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM tasks \
             WHERE EXISTS (SELECT 1 FROM json_each(tasks.assignee_ids) WHERE value = ?1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        Ok((projects, tasks))
    }
}

fn member_from_row(row: &SqliteRow) -> Result<Member, AppError> {
    Ok(Member {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        role: enum_column(row, "role", Role::parse)?,
        secondary_roles: json_column(row, "secondary_roles")?,
        status: enum_column(row, "status", MemberStatus::parse)?,
        hire_date: row.get("hire_date"),
        skills: json_column(row, "skills")?,
        hourly_rate: row.get("hourly_rate"),
        weekly_availability: row.get("weekly_availability"),
        leaves: json_column(row, "leaves")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}
