//! Timesheet API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{current_revision, respond, ApiResult};
use crate::auth::Principal;
use crate::models::{
    ApproveRequest, CreateTimesheetRequest, Page, RejectRequest, TimesheetEntry,
    TimesheetFilter, UpdateTimesheetRequest,
};
use crate::services::timesheets;
use crate::AppState;

/// GET /api/timesheets - List timesheet entries.
pub async fn list_timesheets(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<TimesheetFilter>,
) -> ApiResult<Page<TimesheetEntry>> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::list(&state, &principal, filter).await;
    respond(&state, revision_id, result).await
}

/// GET /api/timesheets/:id - Get a single entry.
pub async fn get_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<TimesheetEntry> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::get(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/timesheets - Book time.
pub async fn create_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateTimesheetRequest>,
) -> ApiResult<TimesheetEntry> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::create(&state, &principal, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/timesheets/:id - Edit an entry that is not approved.
pub async fn update_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateTimesheetRequest>,
) -> ApiResult<TimesheetEntry> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::update(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/timesheets/:id
pub async fn delete_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::delete(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/timesheets/:id/submit
pub async fn submit_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<TimesheetEntry> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::submit(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/timesheets/:id/approve - The body (an optional comment) may be omitted.
pub async fn approve_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> ApiResult<TimesheetEntry> {
    let revision_id = current_revision(&state).await;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let result = timesheets::approve(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// POST /api/timesheets/:id/reject
pub async fn reject_timesheet(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<TimesheetEntry> {
    let revision_id = current_revision(&state).await;
    let result = timesheets::reject(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}
