use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use evalia_core::{AppError, Principal};
use uuid::Uuid;

use crate::error::ApiError;

/// Header naming the acting principal for audit attribution.
pub const ACTING_PRINCIPAL_HEADER: &str = "x-acting-principal";

/// Extractor resolving the acting principal from the request headers.
///
/// A missing header or the literal `system` resolves to the system
/// principal; any other value must be the UUID of a human operator.
#[derive(Debug, Clone, Copy)]
pub struct ActingPrincipal(pub Principal);

impl<S> FromRequestParts<S> for ActingPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTING_PRINCIPAL_HEADER) else {
            return Ok(Self(Principal::System));
        };

        let value = value.to_str().map_err(|_| {
            ApiError(AppError::Validation(format!(
                "{ACTING_PRINCIPAL_HEADER} header is not valid UTF-8"
            )))
        })?;

        if value.eq_ignore_ascii_case("system") {
            return Ok(Self(Principal::System));
        }

        let id = Uuid::parse_str(value).map_err(|_| {
            ApiError(AppError::Validation(format!(
                "{ACTING_PRINCIPAL_HEADER} header must be 'system' or an operator UUID"
            )))
        })?;

        Ok(Self(Principal::human(id)))
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::FromRequestParts;
    use axum::http::Request;
    use evalia_core::Principal;
    use uuid::Uuid;

    use super::{ACTING_PRINCIPAL_HEADER, ActingPrincipal};

    async fn extract(request: Request<()>) -> Result<ActingPrincipal, crate::error::ApiError> {
        let (mut parts, ()) = request.into_parts();
        ActingPrincipal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_header_resolves_to_system() {
        let request = Request::new(());
        let principal = extract(request).await;
        assert!(matches!(principal, Ok(ActingPrincipal(Principal::System))));
    }

    #[tokio::test]
    async fn operator_uuid_resolves_to_human() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(ACTING_PRINCIPAL_HEADER, id.to_string())
            .body(())
            .unwrap_or_else(|_| unreachable!());
        let principal = extract(request).await;
        match principal {
            Ok(ActingPrincipal(Principal::Human { id: parsed })) => assert_eq!(parsed, id),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let request = Request::builder()
            .header(ACTING_PRINCIPAL_HEADER, "not-a-uuid")
            .body(())
            .unwrap_or_else(|_| unreachable!());
        assert!(extract(request).await.is_err());
    }
}
