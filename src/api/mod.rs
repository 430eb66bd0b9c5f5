//! REST API module.
//!
//! Handlers extract the acting `Principal`, call into `services` and wrap the
//! outcome in the response envelope with the current revision id.

mod admin;
mod comments;
mod members;
mod notifications;
mod projects;
mod reports;
mod search;
mod setup;
mod tasks;
mod timesheets;

pub use admin::*;
pub use comments::*;
pub use members::*;
pub use notifications::*;
pub use projects::*;
pub use reports::*;
pub use search::*;
pub use setup::*;
pub use tasks::*;
pub use timesheets::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Revision id before a handler runs; 0 if it cannot be read.
pub async fn current_revision(state: &AppState) -> i64 {
    state.repo.get_revision_id().await.unwrap_or(0)
}

/// Envelope a service outcome. Successes carry the revision after the call,
/// failures the one captured before it.
pub async fn respond<T: Serialize>(
    state: &AppState,
    before: i64,
    result: Result<T, AppError>,
) -> ApiResult<T> {
    match result {
        Ok(data) => {
            let after = state.repo.get_revision_id().await.unwrap_or(before);
            success(data, after)
        }
        Err(e) => error(e, before),
    }
}
