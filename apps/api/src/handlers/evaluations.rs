use axum::Json;
use axum::extract::{Path, State};
use evalia_core::ScopeId;
use uuid::Uuid;

use crate::auth::ActingPrincipal;
use crate::dto::{
    InvalidationRequest, InvalidationResponse, SubmitResponseRequest, SubmitResponseResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn submit_response_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path((scope, evaluation_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SubmitResponseRequest>,
) -> ApiResult<Json<SubmitResponseResponse>> {
    let outcome = state
        .lifecycle_service
        .submit_response(
            &principal,
            ScopeId::from_uuid(scope),
            evaluation_id,
            payload.payload,
            payload.is_final,
        )
        .await?;

    Ok(Json(outcome.into()))
}

pub async fn request_invalidation_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path((scope, evaluation_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<InvalidationRequest>,
) -> ApiResult<Json<InvalidationResponse>> {
    let outcome = state
        .lifecycle_service
        .request_invalidation(
            &principal,
            ScopeId::from_uuid(scope),
            evaluation_id,
            payload.reason,
            payload.force,
        )
        .await?;

    Ok(Json(outcome.into()))
}
