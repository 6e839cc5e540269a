use axum::Json;
use axum::extract::{Path, State};
use evalia_core::ScopeId;
use uuid::Uuid;

use crate::auth::ActingPrincipal;
use crate::dto::ReportResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn request_emission_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path((scope, batch_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ReportResponse>> {
    let report = state
        .emission_service
        .request_emission(&principal, ScopeId::from_uuid(scope), batch_id)
        .await?;

    Ok(Json(report.into()))
}

pub async fn mark_delivered_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path((scope, batch_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ReportResponse>> {
    let report = state
        .emission_service
        .mark_delivered(&principal, ScopeId::from_uuid(scope), batch_id)
        .await?;

    Ok(Json(report.into()))
}

pub async fn get_report_handler(
    State(state): State<AppState>,
    Path((scope, batch_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ReportResponse>> {
    let report = state
        .lifecycle_service
        .find_report(ScopeId::from_uuid(scope), batch_id)
        .await?;

    Ok(Json(report.into()))
}
