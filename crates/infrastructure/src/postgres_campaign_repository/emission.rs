use super::*;

const REPORT_COLUMNS: &str = r#"
    batch_id,
    scope,
    status,
    content_hash,
    issued_by,
    issued_at,
    delivered_at
"#;

impl PostgresCampaignRepository {
    pub(super) async fn claim_emission_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<EmissionClaim> {
        let token = Uuid::new_v4();
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            UPDATE batches
            SET
                emission_state = 'pending',
                emission_token = $3,
                lease_expires_at = $4,
                updated_at = now()
            WHERE id = $1
              AND scope = $2
              AND status = 'completed'
              AND (
                    emission_state = 'idle'
                    OR (emission_state = 'pending' AND lease_expires_at <= $5)
                  )
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(batch_id)
        .bind(scope.as_uuid())
        .bind(token)
        .bind(lease_expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim emission of batch '{batch_id}' for scope '{scope}': {error}"
            ))
        })?;

        match row {
            Some(row) => Ok(EmissionClaim {
                batch: batch_from_row(row)?,
                token,
            }),
            None => Err(self
                .claim_refusal(scope, batch_id, lease_expires_at, now)
                .await),
        }
    }

    pub(super) async fn release_emission_claim_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET
                emission_state = 'idle',
                emission_token = NULL,
                lease_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND scope = $2
              AND emission_state = 'pending'
              AND emission_token = $3
            "#,
        )
        .bind(batch_id)
        .bind(scope.as_uuid())
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to release emission claim of batch '{batch_id}' for scope '{scope}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(self.fence_mismatch(scope, batch_id).await);
        }

        Ok(())
    }

    pub(super) async fn reject_emission_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        reasons: Vec<String>,
    ) -> AppResult<()> {
        let reasons = serde_json::to_value(reasons).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize emission rejection reasons for batch '{batch_id}': {error}"
            ))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE batches
            SET
                emission_state = 'rejected',
                emission_token = NULL,
                lease_expires_at = NULL,
                emission_reasons = $4,
                updated_at = now()
            WHERE id = $1
              AND scope = $2
              AND emission_state = 'pending'
              AND emission_token = $3
            "#,
        )
        .bind(batch_id)
        .bind(scope.as_uuid())
        .bind(token)
        .bind(reasons)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to reject emission of batch '{batch_id}' for scope '{scope}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(self.fence_mismatch(scope, batch_id).await);
        }

        Ok(())
    }

    pub(super) async fn commit_emission_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        report: Report,
    ) -> AppResult<Report> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start emission commit transaction for batch '{batch_id}': {error}"
            ))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE batches
            SET
                emission_state = 'issued',
                emission_token = NULL,
                lease_expires_at = NULL,
                emitted_at = $4,
                updated_at = now()
            WHERE id = $1
              AND scope = $2
              AND emission_state = 'pending'
              AND emission_token = $3
            "#,
        )
        .bind(batch_id)
        .bind(scope.as_uuid())
        .bind(token)
        .bind(report.issued_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to stamp batch '{batch_id}' as emitted for scope '{scope}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(self.fence_mismatch(scope, batch_id).await);
        }

        sqlx::query(
            r#"
            INSERT INTO reports (
                batch_id,
                scope,
                status,
                content_hash,
                issued_by,
                issued_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(report.batch_id())
        .bind(report.scope().as_uuid())
        .bind(report.status().as_str())
        .bind(report.content_hash())
        .bind(report.issued_by().audit_id())
        .bind(report.issued_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to insert report for batch '{batch_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit emission of batch '{batch_id}': {error}"
            ))
        })?;

        Ok(report)
    }

    pub(super) async fn find_report_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE batch_id = $1 AND scope = $2"
        ))
        .bind(batch_id)
        .bind(scope.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find report of batch '{batch_id}' for scope '{scope}': {error}"
            ))
        })?;

        row.map(report_from_row).transpose()
    }

    pub(super) async fn update_report_impl(&self, report: Report) -> AppResult<Report> {
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $3, delivered_at = $4, updated_at = now()
            WHERE batch_id = $1 AND scope = $2
            "#,
        )
        .bind(report.batch_id())
        .bind(report.scope().as_uuid())
        .bind(report.status().as_str())
        .bind(report.delivered_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update report of batch '{}' for scope '{}': {error}",
                report.batch_id(),
                report.scope()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "no report issued for batch '{}' in scope '{}'",
                report.batch_id(),
                report.scope()
            )));
        }

        Ok(report)
    }

    /// Explains why the conditional claim update matched no row, using the
    /// same distinctions the domain state machine draws.
    async fn claim_refusal(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppError {
        match self.find_batch_impl(scope, batch_id).await {
            Ok(Some(mut batch)) => match batch.claim_emission(Uuid::new_v4(), lease_expires_at, now)
            {
                // The refusal was transient; another claimant raced us.
                Ok(()) => AppError::AlreadyInProgress(format!(
                    "emission already in flight for batch '{batch_id}'"
                )),
                Err(error) => error,
            },
            Ok(None) => AppError::NotFound(format!(
                "batch '{batch_id}' not found in scope '{scope}'"
            )),
            Err(error) => error,
        }
    }

    async fn fence_mismatch(&self, scope: ScopeId, batch_id: Uuid) -> AppError {
        match self.find_batch_impl(scope, batch_id).await {
            Ok(Some(batch)) => match batch.emission() {
                EmissionState::Pending { .. } => AppError::AlreadyInProgress(format!(
                    "emission claim for batch '{batch_id}' is held by another caller"
                )),
                other => AppError::FailedPrecondition(format!(
                    "no emission claim held for batch '{batch_id}' (state '{}')",
                    other.as_str()
                )),
            },
            Ok(None) => AppError::NotFound(format!(
                "batch '{batch_id}' not found in scope '{scope}'"
            )),
            Err(error) => error,
        }
    }
}
