use super::*;

impl PostgresCampaignRepository {
    pub(super) async fn max_batch_ordinal_impl(&self, scope: ScopeId) -> AppResult<u32> {
        let max = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT COALESCE(MAX(ordinal), 0)
            FROM batches
            WHERE scope = $1
            "#,
        )
        .bind(scope.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load max batch ordinal for scope '{scope}': {error}"
            ))
        })?;

        ordinal_from_db(max, "batch ordinal")
    }

    pub(super) async fn create_batch_impl(
        &self,
        batch: Batch,
        evaluations: Vec<Evaluation>,
    ) -> AppResult<()> {
        let scope = batch.scope();
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start batch creation transaction for scope '{scope}': {error}"
            ))
        })?;

        // Serializes releases per scope so the ordinal check below cannot
        // race another creation.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::TEXT, 0))")
            .bind(scope.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to lock scope '{scope}' for batch creation: {error}"
                ))
            })?;

        let max = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT COALESCE(MAX(ordinal), 0)
            FROM batches
            WHERE scope = $1
            "#,
        )
        .bind(scope.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to re-check batch ordinal for scope '{scope}': {error}"
            ))
        })?;

        let next = ordinal_from_db(max, "batch ordinal")? + 1;
        if batch.ordinal() != next {
            return Err(AppError::Validation(format!(
                "batch ordinal {} for scope '{scope}' is stale; the next ordinal is {next}",
                batch.ordinal()
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO batches (
                id,
                scope,
                ordinal,
                status,
                emission_state,
                released_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(batch.id())
        .bind(scope.as_uuid())
        .bind(ordinal_to_db(batch.ordinal(), "batch ordinal")?)
        .bind(batch.status().as_str())
        .bind(batch.emission().as_str())
        .bind(batch.released_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to insert batch '{}' for scope '{scope}': {error}",
                batch.id()
            ))
        })?;

        for evaluation in &evaluations {
            sqlx::query(
                r#"
                INSERT INTO evaluations (
                    id,
                    batch_id,
                    subject_id,
                    status,
                    responses,
                    started_at,
                    invalidation_forced,
                    updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, now())
                "#,
            )
            .bind(evaluation.id())
            .bind(evaluation.batch_id())
            .bind(evaluation.subject_id())
            .bind(evaluation.status().as_str())
            .bind(evaluation.responses())
            .bind(evaluation.started_at())
            .bind(evaluation.invalidation_forced())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to insert evaluation '{}' for batch '{}': {error}",
                    evaluation.id(),
                    batch.id()
                ))
            })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit batch creation for scope '{scope}': {error}"
            ))
        })?;

        Ok(())
    }

    pub(super) async fn find_batch_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Option<Batch>> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND scope = $2"
        ))
        .bind(batch_id)
        .bind(scope.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find batch '{batch_id}' for scope '{scope}': {error}"
            ))
        })?;

        row.map(batch_from_row).transpose()
    }

    pub(super) async fn list_batches_impl(&self, scope: ScopeId) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE scope = $1 ORDER BY ordinal"
        ))
        .bind(scope.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list batches for scope '{scope}': {error}"
            ))
        })?;

        rows.into_iter().map(batch_from_row).collect()
    }

    pub(super) async fn list_emittable_batches_impl(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE status = 'completed'
              AND emitted_at IS NULL
              AND (
                    emission_state = 'idle'
                    OR (emission_state = 'pending' AND lease_expires_at <= $1)
                  )
              AND NOT EXISTS (
                    SELECT 1 FROM reports WHERE reports.batch_id = batches.id
                  )
            ORDER BY completed_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid emittable batch limit: {error}"))
        })?)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list emittable batches: {error}"))
        })?;

        rows.into_iter().map(batch_from_row).collect()
    }
}
