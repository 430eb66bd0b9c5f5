//! Task API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{current_revision, respond, ApiResult};
use crate::analytics::progress::{CanStart, TaskStats};
use crate::auth::Principal;
use crate::models::{
    AttachmentRequest, CreateTaskRequest, Page, ProgressRequest, Task, TaskFilter,
    UpdateTaskRequest,
};
use crate::services::tasks;
use crate::AppState;

/// GET /api/tasks - List tasks.
pub async fn list_tasks(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<Page<Task>> {
    let revision_id = current_revision(&state).await;
    let result = tasks::list(&state, &principal, filter).await;
    respond(&state, revision_id, result).await
}

/// GET /api/tasks/:id - Get a single task.
pub async fn get_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Task> {
    let revision_id = current_revision(&state).await;
    let result = tasks::get(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/tasks/:id/subtasks
pub async fn list_subtasks(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Vec<Task>> {
    let revision_id = current_revision(&state).await;
    let result = tasks::subtasks(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/tasks - Create a new task.
pub async fn create_task(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<Task> {
    let revision_id = current_revision(&state).await;
    let result = tasks::create(&state, &principal, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/tasks/:id - Update a task.
pub async fn update_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Task> {
    let revision_id = current_revision(&state).await;
    let result = tasks::update(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/tasks/:id/progress
pub async fn update_task_progress(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<ProgressRequest>,
) -> ApiResult<Task> {
    let revision_id = current_revision(&state).await;
    let result = tasks::update_progress(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/tasks/:id - Delete a task.
pub async fn delete_task(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;
    let result = tasks::delete(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/tasks/:id/stats
pub async fn task_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<TaskStats> {
    let revision_id = current_revision(&state).await;
    let result = tasks::stats(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/tasks/:id/can-start
pub async fn task_can_start(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<CanStart> {
    let revision_id = current_revision(&state).await;
    let result = tasks::can_start_task(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/tasks/:id/attachments
pub async fn add_attachment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<AttachmentRequest>,
) -> ApiResult<Task> {
    let revision_id = current_revision(&state).await;
    let result = tasks::add_attachment(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/tasks/:id/attachments/:name
pub async fn delete_attachment(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<Task> {
    let revision_id = current_revision(&state).await;
    let result = tasks::delete_attachment(&state, &principal, &id, &name).await;
    respond(&state, revision_id, result).await
}
