//! Project API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{current_revision, respond, ApiResult};
use crate::analytics::budget::{BudgetStatus, ProjectTimeStats};
use crate::analytics::progress::{ProjectProgress, ProjectStats};
use crate::auth::Principal;
use crate::models::{
    CopyProjectRequest, CreateMilestoneRequest, CreateProjectRequest, DateRange, Page, Project,
    ProjectFilter, UpdateMilestoneRequest, UpdateProjectRequest,
};
use crate::services::projects;
use crate::AppState;

/// GET /api/projects - List projects.
pub async fn list_projects(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<ProjectFilter>,
) -> ApiResult<Page<Project>> {
    let revision_id = current_revision(&state).await;
    let result = projects::list(&state, &principal, filter).await;
    respond(&state, revision_id, result).await
}

/// GET /api/projects/:id - Get a single project.
pub async fn get_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::get(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/projects - Create a new project.
pub async fn create_project(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::create(&state, &principal, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/projects/:id - Update a project.
pub async fn update_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::update(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/projects/:id - Delete a project.
pub async fn delete_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;
    let result = projects::delete(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/projects/:id/archive
pub async fn archive_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::archive(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/projects/:id/duplicate
pub async fn duplicate_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<CopyProjectRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::duplicate(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// POST /api/projects/:id/template - Save a copy as a template.
pub async fn save_project_as_template(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<CopyProjectRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::save_as_template(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// GET /api/templates
pub async fn list_templates(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<Project>> {
    let revision_id = current_revision(&state).await;
    let result = projects::list_templates(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// POST /api/templates/:id/instantiate - Start a project from a template.
pub async fn instantiate_template(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<CopyProjectRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::instantiate_template(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// POST /api/projects/:id/milestones
pub async fn add_milestone(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<CreateMilestoneRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::add_milestone(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/projects/:id/milestones/:milestone_id
pub async fn update_milestone(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, milestone_id)): Path<(String, String)>,
    Json(request): Json<UpdateMilestoneRequest>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::update_milestone(&state, &principal, &id, &milestone_id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/projects/:id/milestones/:milestone_id
pub async fn delete_milestone(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, milestone_id)): Path<(String, String)>,
) -> ApiResult<Project> {
    let revision_id = current_revision(&state).await;
    let result = projects::delete_milestone(&state, &principal, &id, &milestone_id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/projects/:id/stats
pub async fn project_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<ProjectStats> {
    let revision_id = current_revision(&state).await;
    let result = projects::stats(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/projects/:id/budget
pub async fn project_budget(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<BudgetStatus> {
    let revision_id = current_revision(&state).await;
    let result = projects::budget(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/projects/:id/progress
pub async fn project_progress(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<ProjectProgress> {
    let revision_id = current_revision(&state).await;
    let result = projects::progress(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/projects/:id/time-stats?from=&to=
pub async fn project_time_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(range): Query<DateRange>,
) -> ApiResult<ProjectTimeStats> {
    let revision_id = current_revision(&state).await;
    let result = projects::time_stats(&state, &principal, &id, range).await;
    respond(&state, revision_id, result).await
}
