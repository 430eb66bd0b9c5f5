//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. List-valued fields
//! (member ids, milestones, history, ...) are stored as JSON text columns.

mod audit;
mod comments;
mod members;
mod notifications;
mod projects;
mod reports;
mod repository;
mod tasks;
mod timesheets;

pub use reports::{PortfolioCounts, TableCounts};
pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            role TEXT NOT NULL,
            secondary_roles TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            hire_date TEXT,
            skills TEXT NOT NULL DEFAULT '[]',
            hourly_rate REAL NOT NULL DEFAULT 0,
            weekly_availability REAL NOT NULL DEFAULT 35,
            leaves TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            planned_start TEXT NOT NULL,
            planned_end TEXT NOT NULL,
            actual_start TEXT,
            actual_end TEXT,
            allocated_budget REAL NOT NULL DEFAULT 0,
            consumed_budget REAL NOT NULL DEFAULT 0 CHECK (consumed_budget >= 0),
            lead_id TEXT NOT NULL,
            member_ids TEXT NOT NULL DEFAULT '[]',
            milestones TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            history TEXT NOT NULL DEFAULT '[]',
            is_template INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            project_id TEXT NOT NULL,
            parent_id TEXT,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            assignee_ids TEXT NOT NULL DEFAULT '[]',
            estimated_hours REAL NOT NULL DEFAULT 0,
            actual_hours REAL NOT NULL DEFAULT 0 CHECK (actual_hours >= 0),
            planned_start TEXT,
            planned_end TEXT,
            actual_start TEXT,
            actual_end TEXT,
            progress INTEGER NOT NULL DEFAULT 0,
            dependency_ids TEXT NOT NULL DEFAULT '[]',
            attachments TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            history TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timesheets (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            task_id TEXT,
            date TEXT NOT NULL,
            hours REAL NOT NULL,
            description TEXT,
            status TEXT NOT NULL,
            approver_id TEXT,
            approved_at TEXT,
            approval_comment TEXT,
            approved_cost REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (member_id, project_id, date)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            body TEXT NOT NULL,
            mention_ids TEXT NOT NULL DEFAULT '[]',
            reply_to TEXT,
            edited INTEGER NOT NULL DEFAULT 0,
            edited_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            recipient_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            resource_type TEXT,
            resource_id TEXT,
            action_url TEXT,
            status TEXT NOT NULL DEFAULT 'unread',
            channel TEXT NOT NULL DEFAULT 'app',
            read_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            action TEXT NOT NULL,
            collection TEXT NOT NULL,
            document_id TEXT,
            actor_id TEXT,
            timestamp TEXT NOT NULL,
            changes TEXT NOT NULL DEFAULT '[]',
            snapshot TEXT,
            metadata TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_members_name ON members(last_name, first_name);
        CREATE INDEX IF NOT EXISTS idx_members_status ON members(status);
        CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status);
        CREATE INDEX IF NOT EXISTS idx_projects_lead ON projects(lead_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_timesheets_member_date ON timesheets(member_id, date);
        CREATE INDEX IF NOT EXISTS idx_timesheets_project ON timesheets(project_id, status);
        CREATE INDEX IF NOT EXISTS idx_timesheets_task ON timesheets(task_id);
        CREATE INDEX IF NOT EXISTS idx_comments_resource ON comments(resource_type, resource_id);
        CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, status);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        "#,
    )
    .execute(pool)
    .await?;

    // Columns added after the first schema
    ensure_column(pool, "projects", "is_template", "INTEGER NOT NULL DEFAULT 0").await?;
    ensure_column(pool, "timesheets", "approved_cost", "REAL").await?;

    Ok(())
}

/// Add `column` to `table` unless a previous start-up already did.
async fn ensure_column(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), sqlx::Error> {
    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if existing == 0 {
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, definition
        ))
        .execute(pool)
        .await?;
        tracing::info!(table, column, "Added column");
    }
    Ok(())
}
