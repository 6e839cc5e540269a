use evalia_application::{BatchTransition, EvaluationResolution};

use super::*;

impl PostgresCampaignRepository {
    pub(super) async fn find_evaluation_impl(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<Option<Evaluation>> {
        let row = sqlx::query_as::<_, EvaluationRow>(&format!(
            r#"
            SELECT {EVALUATION_COLUMNS}
            FROM evaluations
            WHERE id = $1
              AND batch_id IN (SELECT id FROM batches WHERE scope = $2)
            "#
        ))
        .bind(evaluation_id)
        .bind(scope.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find evaluation '{evaluation_id}' for scope '{scope}': {error}"
            ))
        })?;

        row.map(evaluation_from_row).transpose()
    }

    pub(super) async fn list_batch_evaluations_impl(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Vec<Evaluation>> {
        let rows = sqlx::query_as::<_, EvaluationRow>(&format!(
            r#"
            SELECT {EVALUATION_COLUMNS}
            FROM evaluations
            WHERE batch_id = $1
              AND batch_id IN (SELECT id FROM batches WHERE scope = $2)
            ORDER BY id
            "#
        ))
        .bind(batch_id)
        .bind(scope.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list evaluations of batch '{batch_id}' for scope '{scope}': {error}"
            ))
        })?;

        rows.into_iter().map(evaluation_from_row).collect()
    }

    pub(super) async fn subject_evaluation_history_impl(
        &self,
        scope: ScopeId,
        subject_id: Uuid,
    ) -> AppResult<Vec<EvaluationHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT
                batches.ordinal AS batch_ordinal,
                batches.id AS batch_id,
                evaluations.status
            FROM evaluations
            INNER JOIN batches ON batches.id = evaluations.batch_id
            WHERE evaluations.subject_id = $1
              AND batches.scope = $2
            ORDER BY batches.ordinal ASC
            "#,
        )
        .bind(subject_id)
        .bind(scope.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load evaluation history for subject '{subject_id}' in scope '{scope}': {error}"
            ))
        })?;

        rows.into_iter().map(history_entry_from_row).collect()
    }

    pub(super) async fn update_open_evaluation_impl(
        &self,
        scope: ScopeId,
        evaluation: Evaluation,
    ) -> AppResult<Evaluation> {
        let result = sqlx::query(
            r#"
            UPDATE evaluations
            SET
                status = $3,
                responses = $4,
                updated_at = now()
            FROM batches
            WHERE evaluations.id = $1
              AND batches.id = evaluations.batch_id
              AND batches.scope = $2
              AND evaluations.status IN ('started', 'in_progress')
              AND batches.emitted_at IS NULL
            "#,
        )
        .bind(evaluation.id())
        .bind(scope.as_uuid())
        .bind(evaluation.status().as_str())
        .bind(evaluation.responses())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update evaluation '{}' for scope '{scope}': {error}",
                evaluation.id()
            ))
        })?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from one the conditions excluded.
            let Some(stored) = self.find_evaluation_impl(scope, evaluation.id()).await? else {
                return Err(AppError::NotFound(format!(
                    "evaluation '{}' not found in scope '{scope}'",
                    evaluation.id()
                )));
            };
            if stored.is_finalized() {
                return Err(AppError::FailedPrecondition(format!(
                    "evaluation '{}' is already finalized",
                    evaluation.id()
                )));
            }
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' has an issued report; its evaluations are immutable",
                evaluation.batch_id()
            )));
        }

        Ok(evaluation)
    }

    pub(super) async fn finalize_evaluation_impl(
        &self,
        scope: ScopeId,
        input: FinalizeEvaluationInput,
    ) -> AppResult<FinalizeOutcome> {
        let evaluation_id = input.evaluation_id;
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to start finalization transaction for evaluation '{evaluation_id}': {error}"
            ))
        })?;

        let batch_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT evaluations.batch_id
            FROM evaluations
            INNER JOIN batches ON batches.id = evaluations.batch_id
            WHERE evaluations.id = $1 AND batches.scope = $2
            "#,
        )
        .bind(evaluation_id)
        .bind(scope.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to locate evaluation '{evaluation_id}' for scope '{scope}': {error}"
            ))
        })?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "evaluation '{evaluation_id}' not found in scope '{scope}'"
            ))
        })?;

        // Serializes finalizations per batch so exactly one of them observes
        // the terminal batch transition.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::TEXT, 0))")
            .bind(batch_id)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to lock batch '{batch_id}' for finalization: {error}"
                ))
            })?;

        let batch_row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 FOR UPDATE"
        ))
        .bind(batch_id)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load batch '{batch_id}' for finalization: {error}"
            ))
        })?;
        let mut batch = batch_from_row(batch_row)?;

        if batch.is_emitted() {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{batch_id}' has an issued report; its evaluations are immutable"
            )));
        }

        let evaluation_row = sqlx::query_as::<_, EvaluationRow>(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = $1 FOR UPDATE"
        ))
        .bind(evaluation_id)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load evaluation '{evaluation_id}' for finalization: {error}"
            ))
        })?;
        let mut evaluation = evaluation_from_row(evaluation_row)?;

        match input.resolution {
            EvaluationResolution::Complete { payload } => {
                evaluation.complete(payload, input.now)?;
                sqlx::query(
                    r#"
                    UPDATE subjects
                    SET
                        participation_index = GREATEST(participation_index, $2),
                        last_batch_at = $3,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(evaluation.subject_id())
                .bind(ordinal_to_db(batch.ordinal(), "batch ordinal")?)
                .bind(input.now)
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!(
                        "failed to advance participation index of subject '{}': {error}",
                        evaluation.subject_id()
                    ))
                })?;
            }
            EvaluationResolution::Invalidate { reason, forced } => {
                evaluation.invalidate(reason, forced, input.now)?;
            }
        }

        sqlx::query(
            r#"
            UPDATE evaluations
            SET
                status = $2,
                responses = $3,
                completed_at = $4,
                invalidated_at = $5,
                invalidation_reason = $6,
                invalidation_forced = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(evaluation.id())
        .bind(evaluation.status().as_str())
        .bind(evaluation.responses())
        .bind(evaluation.completed_at())
        .bind(evaluation.invalidated_at())
        .bind(evaluation.invalidation_reason())
        .bind(evaluation.invalidation_forced())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to persist finalized evaluation '{evaluation_id}': {error}"
            ))
        })?;

        let (open, completed) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status IN ('started', 'in_progress') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
            FROM evaluations
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to recompute aggregate status of batch '{batch_id}': {error}"
            ))
        })?;

        let transition = if open == 0 {
            let transition = if completed > 0 {
                batch.complete(input.now)?;
                BatchTransition::Completed
            } else {
                batch.cancel(input.now)?;
                BatchTransition::Cancelled
            };

            sqlx::query(
                r#"
                UPDATE batches
                SET status = $2, completed_at = $3, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(batch_id)
            .bind(batch.status().as_str())
            .bind(batch.completed_at())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to persist terminal status of batch '{batch_id}': {error}"
                ))
            })?;

            Some(transition)
        } else {
            None
        };

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit finalization of evaluation '{evaluation_id}': {error}"
            ))
        })?;

        Ok(FinalizeOutcome {
            evaluation,
            batch,
            transition,
        })
    }
}
