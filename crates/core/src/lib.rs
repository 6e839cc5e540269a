//! Shared primitives for all Rust crates in Evalia.

#![forbid(unsafe_code)]

/// Acting-principal primitives shared across services.
pub mod principal;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use principal::Principal;

/// Result type used across Evalia crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Organizational-scope identifier used as the partition key for every
/// persisted resource. Batch ordinals and eligibility are computed per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Creates a random scope identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a scope identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ScopeId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or out-of-range input, e.g. a stale batch ordinal.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested subject, batch, evaluation or scope does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The state machine forbids the requested transition.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Lost a concurrency race; the winner's result is authoritative.
    #[error("already in progress: {0}")]
    AlreadyInProgress(String),

    /// Renderer or storage failure, retryable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether a retry may succeed without operator intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString, ScopeId};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn scope_id_formats_as_uuid() {
        let scope_id = ScopeId::new();
        assert_eq!(scope_id.to_string().len(), 36);
    }

    #[test]
    fn only_internal_errors_are_retryable() {
        assert!(AppError::Internal("renderer failed".to_owned()).is_retryable());
        assert!(!AppError::FailedPrecondition("batch emitted".to_owned()).is_retryable());
        assert!(!AppError::AlreadyInProgress("claim held".to_owned()).is_retryable());
    }
}
