//! Search API endpoints.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{current_revision, respond, ApiResult};
use crate::auth::Principal;
use crate::errors::AppError;
use crate::rbac::Permission;
use crate::search::SearchHit;
use crate::services::authorize;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /api/search - Search projects and tasks.
pub async fn search(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = current_revision(&state).await;
    let limit = params.limit.min(MAX_SEARCH_LIMIT);

    let result: Result<SearchResponse, AppError> = async {
        authorize(&state, &principal, Permission::ProjectsRead).await?;
        let results = state.search.search(&params.q, limit, params.offset)?;
        Ok(SearchResponse {
            total: results.len(),
            results,
            limit,
            offset: params.offset,
        })
    }
    .await;
    respond(&state, revision_id, result).await
}
