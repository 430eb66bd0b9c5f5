//! Member API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{current_revision, respond, ApiResult};
use crate::analytics::budget::MemberTimeStats;
use crate::analytics::workload::Workload;
use crate::auth::Principal;
use crate::models::{
    CreateMemberRequest, DateRange, LeaveRequest, Member, MemberFilter, MemberStats, Page,
    ThresholdQuery, UpdateMemberRequest, WorkloadQuery,
};
use crate::services::members;
use crate::AppState;

/// GET /api/members - List members.
pub async fn list_members(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<MemberFilter>,
) -> ApiResult<Page<Member>> {
    let revision_id = current_revision(&state).await;
    let result = members::list(&state, &principal, filter).await;
    respond(&state, revision_id, result).await
}

/// GET /api/members/:id - Get a single member.
pub async fn get_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::get(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/members - Create a new member.
pub async fn create_member(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateMemberRequest>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::create(&state, &principal, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/members/:id - Update a member.
pub async fn update_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemberRequest>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::update(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/members/:id - Delete a member.
pub async fn delete_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;
    let result = members::delete(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// POST /api/members/:id/leaves
pub async fn add_leave(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<LeaveRequest>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::add_leave(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/members/:id/leaves/:index
pub async fn update_leave(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, index)): Path<(String, usize)>,
    Json(request): Json<LeaveRequest>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::update_leave(&state, &principal, &id, index, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/members/:id/leaves/:index
pub async fn delete_leave(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::delete_leave(&state, &principal, &id, index).await;
    respond(&state, revision_id, result).await
}

/// GET /api/members/:id/workload?date=
pub async fn member_workload(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(query): Query<WorkloadQuery>,
) -> ApiResult<Workload> {
    let revision_id = current_revision(&state).await;
    let result = members::workload(&state, &principal, &id, query.date).await;
    respond(&state, revision_id, result).await
}

/// GET /api/members/:id/stats
pub async fn member_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<MemberStats> {
    let revision_id = current_revision(&state).await;
    let result = members::stats(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}

/// GET /api/members/:id/time-stats?from=&to=
pub async fn member_time_stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(range): Query<DateRange>,
) -> ApiResult<MemberTimeStats> {
    let revision_id = current_revision(&state).await;
    let result = members::time_stats(&state, &principal, &id, range).await;
    respond(&state, revision_id, result).await
}

/// GET /api/members/overloaded?threshold=
pub async fn overloaded_members(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ThresholdQuery>,
) -> ApiResult<Vec<Workload>> {
    let revision_id = current_revision(&state).await;
    let result = members::overloaded(&state, &principal, query.threshold).await;
    respond(&state, revision_id, result).await
}

/// GET /api/members/underloaded?threshold=
pub async fn underloaded_members(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ThresholdQuery>,
) -> ApiResult<Vec<Workload>> {
    let revision_id = current_revision(&state).await;
    let result = members::underloaded(&state, &principal, query.threshold).await;
    respond(&state, revision_id, result).await
}
