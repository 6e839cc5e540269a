use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use evalia_core::ScopeId;
use uuid::Uuid;

use crate::auth::ActingPrincipal;
use crate::dto::{BatchResponse, EvaluationResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_batch_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path(scope): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<BatchResponse>)> {
    let batch = state
        .lifecycle_service
        .create_batch(&principal, ScopeId::from_uuid(scope))
        .await?;

    Ok((StatusCode::CREATED, Json(batch.into())))
}

pub async fn list_batches_handler(
    State(state): State<AppState>,
    Path(scope): Path<Uuid>,
) -> ApiResult<Json<Vec<BatchResponse>>> {
    let batches = state
        .lifecycle_service
        .list_batches(ScopeId::from_uuid(scope))
        .await?;

    Ok(Json(batches.into_iter().map(Into::into).collect()))
}

pub async fn get_batch_handler(
    State(state): State<AppState>,
    Path((scope, batch_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<BatchResponse>> {
    let batch = state
        .lifecycle_service
        .find_batch(ScopeId::from_uuid(scope), batch_id)
        .await?;

    Ok(Json(batch.into()))
}

pub async fn list_batch_evaluations_handler(
    State(state): State<AppState>,
    Path((scope, batch_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<EvaluationResponse>>> {
    let evaluations = state
        .lifecycle_service
        .list_batch_evaluations(ScopeId::from_uuid(scope), batch_id)
        .await?;

    Ok(Json(evaluations.into_iter().map(Into::into).collect()))
}
