//! Dashboard and report endpoints.

use axum::extract::{Query, State};

use super::{current_revision, respond, ApiResult};
use crate::analytics::progress::ProjectProgress;
use crate::auth::Principal;
use crate::models::{
    BudgetReportRow, Dashboard, GlobalKpis, LateReportRow, MemberPerformance, TimeReport,
    TimeReportQuery,
};
use crate::services::reporting;
use crate::AppState;

/// GET /api/dashboard - Dashboard for the caller's role.
pub async fn get_dashboard(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Dashboard> {
    let revision_id = current_revision(&state).await;
    let result = reporting::dashboard(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/reports/kpis
pub async fn get_kpis(State(state): State<AppState>, principal: Principal) -> ApiResult<GlobalKpis> {
    let revision_id = current_revision(&state).await;
    let result = reporting::kpis(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/reports/progress
pub async fn progress_report(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<ProjectProgress>> {
    let revision_id = current_revision(&state).await;
    let result = reporting::progress_report(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/reports/late
pub async fn late_report(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<LateReportRow>> {
    let revision_id = current_revision(&state).await;
    let result = reporting::late_report(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/reports/budget
pub async fn budget_report(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<BudgetReportRow>> {
    let revision_id = current_revision(&state).await;
    let result = reporting::budget_report(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/reports/performance
pub async fn performance_report(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<MemberPerformance>> {
    let revision_id = current_revision(&state).await;
    let result = reporting::performance_report(&state, &principal).await;
    respond(&state, revision_id, result).await
}

/// GET /api/reports/time?from=&to=
pub async fn time_report(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<TimeReportQuery>,
) -> ApiResult<TimeReport> {
    let revision_id = current_revision(&state).await;
    let result = reporting::time_report(&state, &principal, query).await;
    respond(&state, revision_id, result).await
}
