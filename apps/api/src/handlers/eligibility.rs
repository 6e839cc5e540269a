use axum::Json;
use axum::extract::{Path, Query, State};
use evalia_core::ScopeId;
use uuid::Uuid;

use crate::dto::{EligibilityQuery, EligibleSubjectResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn preview_eligibility_handler(
    State(state): State<AppState>,
    Path(scope): Path<Uuid>,
    Query(query): Query<EligibilityQuery>,
) -> ApiResult<Json<Vec<EligibleSubjectResponse>>> {
    let eligible = state
        .eligibility_service
        .compute_eligible(ScopeId::from_uuid(scope), query.ordinal)
        .await?;

    Ok(Json(eligible.into_iter().map(Into::into).collect()))
}
