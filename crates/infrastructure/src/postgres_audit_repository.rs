use async_trait::async_trait;
use evalia_application::{AuditEntry, AuditRepository};
use evalia_core::{AppError, AppResult};
use sqlx::PgPool;

/// PostgreSQL-backed append-only audit sink.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                scope,
                principal,
                action,
                resource_type,
                resource_id,
                before,
                after,
                recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.scope.as_uuid())
        .bind(entry.principal.audit_id())
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to append audit entry '{}' for scope '{}': {error}",
                entry.action.as_str(),
                entry.scope
            ))
        })?;

        Ok(())
    }
}
