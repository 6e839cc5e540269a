use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use evalia_core::AppError;
use serde::Serialize;

/// Convenient result alias for handler functions.
pub type ApiResult<T> = Result<T, ApiError>;

/// Wrapper translating application errors into HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::FailedPrecondition(message) => (StatusCode::CONFLICT, message),
            AppError::AlreadyInProgress(message) => (StatusCode::CONFLICT, message),
            AppError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}
