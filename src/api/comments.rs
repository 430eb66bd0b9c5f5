//! Comment API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{current_revision, respond, ApiResult};
use crate::auth::Principal;
use crate::models::{Comment, CommentBodyRequest, CommentQuery, CreateCommentRequest};
use crate::services::comments;
use crate::AppState;

/// GET /api/comments?resourceType=&resourceId=
pub async fn list_comments(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<CommentQuery>,
) -> ApiResult<Vec<Comment>> {
    let revision_id = current_revision(&state).await;
    let result = comments::list(&state, &principal, query).await;
    respond(&state, revision_id, result).await
}

/// POST /api/comments
pub async fn create_comment(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<Comment> {
    let revision_id = current_revision(&state).await;
    let result = comments::create(&state, &principal, request).await;
    respond(&state, revision_id, result).await
}

/// POST /api/comments/:id/replies
pub async fn reply_to_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<CommentBodyRequest>,
) -> ApiResult<Comment> {
    let revision_id = current_revision(&state).await;
    let result = comments::reply(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// PUT /api/comments/:id
pub async fn update_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<CommentBodyRequest>,
) -> ApiResult<Comment> {
    let revision_id = current_revision(&state).await;
    let result = comments::update(&state, &principal, &id, request).await;
    respond(&state, revision_id, result).await
}

/// DELETE /api/comments/:id
pub async fn delete_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;
    let result = comments::delete(&state, &principal, &id).await;
    respond(&state, revision_id, result).await
}
