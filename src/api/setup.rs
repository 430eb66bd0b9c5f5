//! Bootstrap and change-detection endpoints.

use axum::{extract::State, Json};

use super::{current_revision, respond, success, ApiResult};
use crate::errors::AppErrorWithRevision;
use crate::models::{CreateMemberRequest, Member, RevisionInfo};
use crate::services::members;
use crate::AppState;

/// POST /api/setup - Create the first administrator.
pub async fn setup(
    State(state): State<AppState>,
    Json(request): Json<CreateMemberRequest>,
) -> ApiResult<Member> {
    let revision_id = current_revision(&state).await;
    let result = members::setup(&state, request).await;
    respond(&state, revision_id, result).await
}

/// GET /api/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info = state
        .repo
        .get_revision_info()
        .await
        .map_err(|e| AppErrorWithRevision {
            error: e,
            revision_id: 0,
        })?;

    success(revision_info.clone(), revision_info.revision_id)
}
