use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use evalia_core::ScopeId;
use uuid::Uuid;

use crate::auth::ActingPrincipal;
use crate::dto::{RegisterSubjectRequest, SetSubjectActiveRequest, SubjectResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn register_subject_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path(scope): Path<Uuid>,
    Json(payload): Json<RegisterSubjectRequest>,
) -> ApiResult<(StatusCode, Json<SubjectResponse>)> {
    let subject = state
        .lifecycle_service
        .register_subject(&principal, ScopeId::from_uuid(scope), payload.display_name)
        .await?;

    Ok((StatusCode::CREATED, Json(subject.into())))
}

pub async fn list_subjects_handler(
    State(state): State<AppState>,
    Path(scope): Path<Uuid>,
) -> ApiResult<Json<Vec<SubjectResponse>>> {
    let subjects = state
        .lifecycle_service
        .list_subjects(ScopeId::from_uuid(scope))
        .await?;

    Ok(Json(subjects.into_iter().map(Into::into).collect()))
}

pub async fn set_subject_active_handler(
    State(state): State<AppState>,
    ActingPrincipal(principal): ActingPrincipal,
    Path((scope, subject_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SetSubjectActiveRequest>,
) -> ApiResult<Json<SubjectResponse>> {
    let subject = state
        .lifecycle_service
        .set_subject_active(
            &principal,
            ScopeId::from_uuid(scope),
            subject_id,
            payload.active,
        )
        .await?;

    Ok(Json(subject.into()))
}
