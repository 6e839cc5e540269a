use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post, put};
use evalia_core::AppError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::ACTING_PRINCIPAL_HEADER;
use crate::handlers;
use crate::state::AppState;

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let cors_origin = frontend_url.parse::<HeaderValue>().map_err(|error| {
        AppError::Validation(format!("invalid frontend URL '{frontend_url}': {error}"))
    })?;

    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(ACTING_PRINCIPAL_HEADER),
        ]);

    let router = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/scopes/{scope}/subjects",
            get(handlers::subjects::list_subjects_handler)
                .post(handlers::subjects::register_subject_handler),
        )
        .route(
            "/scopes/{scope}/subjects/{subject_id}/active",
            put(handlers::subjects::set_subject_active_handler),
        )
        .route(
            "/scopes/{scope}/eligibility",
            get(handlers::eligibility::preview_eligibility_handler),
        )
        .route(
            "/scopes/{scope}/batches",
            get(handlers::batches::list_batches_handler)
                .post(handlers::batches::create_batch_handler),
        )
        .route(
            "/scopes/{scope}/batches/{batch_id}",
            get(handlers::batches::get_batch_handler),
        )
        .route(
            "/scopes/{scope}/batches/{batch_id}/evaluations",
            get(handlers::batches::list_batch_evaluations_handler),
        )
        .route(
            "/scopes/{scope}/evaluations/{evaluation_id}/responses",
            post(handlers::evaluations::submit_response_handler),
        )
        .route(
            "/scopes/{scope}/evaluations/{evaluation_id}/invalidation",
            post(handlers::evaluations::request_invalidation_handler),
        )
        .route(
            "/scopes/{scope}/batches/{batch_id}/emission",
            post(handlers::emission::request_emission_handler),
        )
        .route(
            "/scopes/{scope}/batches/{batch_id}/delivery",
            post(handlers::emission::mark_delivered_handler),
        )
        .route(
            "/scopes/{scope}/batches/{batch_id}/report",
            get(handlers::emission::get_report_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    Ok(router)
}
