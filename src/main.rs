//! Project Tracker Backend
//!
//! REST backend for project, task and timesheet tracking with SQLite persistence,
//! Tantivy full-text search and an aggregation core for workload, budget and progress.

mod analytics;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod rbac;
mod search;
mod services;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Project Tracker Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!(
        overload_pct = config.thresholds.overload_pct,
        underload_pct = config.thresholds.underload_pct,
        "Workload thresholds"
    );

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (PT_API_PSK). Authentication is disabled!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    tracing::info!("Building search index...");
    let mut projects = repo.list_all_projects().await?;
    let mut tasks = repo.list_all_tasks().await?;
    for template in repo.list_templates().await? {
        tasks.extend(repo.list_project_tasks(&template.id).await?);
        projects.push(template);
    }
    search.rebuild(&projects, &tasks).await?;
    tracing::info!(
        "Search index built with {} projects and {} tasks",
        projects.len(),
        tasks.len()
    );

    let state = AppState {
        repo,
        search,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        .route("/setup", post(api::setup))
        .route("/revision", get(api::get_revision))
        // Members
        .route("/members", get(api::list_members).post(api::create_member))
        .route("/members/overloaded", get(api::overloaded_members))
        .route("/members/underloaded", get(api::underloaded_members))
        .route(
            "/members/{id}",
            get(api::get_member)
                .put(api::update_member)
                .delete(api::delete_member),
        )
        .route("/members/{id}/leaves", post(api::add_leave))
        .route(
            "/members/{id}/leaves/{index}",
            put(api::update_leave).delete(api::delete_leave),
        )
        .route("/members/{id}/workload", get(api::member_workload))
        .route("/members/{id}/stats", get(api::member_stats))
        .route("/members/{id}/time-stats", get(api::member_time_stats))
        // Projects
        .route("/projects", get(api::list_projects).post(api::create_project))
        .route(
            "/projects/{id}",
            get(api::get_project)
                .put(api::update_project)
                .delete(api::delete_project),
        )
        .route("/projects/{id}/archive", post(api::archive_project))
        .route("/projects/{id}/duplicate", post(api::duplicate_project))
        .route("/projects/{id}/template", post(api::save_project_as_template))
        .route("/projects/{id}/milestones", post(api::add_milestone))
        .route(
            "/projects/{id}/milestones/{milestone_id}",
            put(api::update_milestone).delete(api::delete_milestone),
        )
        .route("/projects/{id}/stats", get(api::project_stats))
        .route("/projects/{id}/budget", get(api::project_budget))
        .route("/projects/{id}/progress", get(api::project_progress))
        .route("/projects/{id}/time-stats", get(api::project_time_stats))
        // Templates
        .route("/templates", get(api::list_templates))
        .route(
            "/templates/{id}/instantiate",
            post(api::instantiate_template),
        )
        // Tasks
        .route("/tasks", get(api::list_tasks).post(api::create_task))
        .route(
            "/tasks/{id}",
            get(api::get_task)
                .put(api::update_task)
                .delete(api::delete_task),
        )
        .route("/tasks/{id}/subtasks", get(api::list_subtasks))
        .route("/tasks/{id}/progress", put(api::update_task_progress))
        .route("/tasks/{id}/stats", get(api::task_stats))
        .route("/tasks/{id}/can-start", get(api::task_can_start))
        .route("/tasks/{id}/attachments", post(api::add_attachment))
        .route(
            "/tasks/{id}/attachments/{name}",
            delete(api::delete_attachment),
        )
        // Timesheets
        .route(
            "/timesheets",
            get(api::list_timesheets).post(api::create_timesheet),
        )
        .route(
            "/timesheets/{id}",
            get(api::get_timesheet)
                .put(api::update_timesheet)
                .delete(api::delete_timesheet),
        )
        .route("/timesheets/{id}/submit", post(api::submit_timesheet))
        .route("/timesheets/{id}/approve", post(api::approve_timesheet))
        .route("/timesheets/{id}/reject", post(api::reject_timesheet))
        // Comments
        .route("/comments", get(api::list_comments).post(api::create_comment))
        .route(
            "/comments/{id}",
            put(api::update_comment).delete(api::delete_comment),
        )
        .route("/comments/{id}/replies", post(api::reply_to_comment))
        // Notifications
        .route("/notifications", get(api::list_notifications))
        .route(
            "/notifications/read-all",
            post(api::mark_all_notifications_read),
        )
        .route(
            "/notifications/{id}",
            delete(api::delete_notification),
        )
        .route("/notifications/{id}/read", post(api::mark_notification_read))
        .route("/notifications/{id}/archive", post(api::archive_notification))
        // Reports
        .route("/dashboard", get(api::get_dashboard))
        .route("/reports/kpis", get(api::get_kpis))
        .route("/reports/progress", get(api::progress_report))
        .route("/reports/late", get(api::late_report))
        .route("/reports/budget", get(api::budget_report))
        .route("/reports/performance", get(api::performance_report))
        .route("/reports/time", get(api::time_report))
        // Admin
        .route("/admin/stats", get(api::admin_stats))
        .route("/admin/audit-logs", get(api::list_audit_logs))
        .route("/admin/cleanup", post(api::cleanup))
        // Search
        .route("/search", get(api::search))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
