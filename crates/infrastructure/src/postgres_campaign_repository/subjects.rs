use super::*;

impl PostgresCampaignRepository {
    pub(super) async fn upsert_scope_policy_impl(&self, policy: ScopePolicy) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scope_policies (
                scope,
                renewal_window_days,
                overdue_grace_days,
                updated_at
            )
            VALUES ($1, $2, $3, now())
            ON CONFLICT (scope)
            DO UPDATE SET
                renewal_window_days = EXCLUDED.renewal_window_days,
                overdue_grace_days = EXCLUDED.overdue_grace_days,
                updated_at = now()
            "#,
        )
        .bind(policy.scope().as_uuid())
        .bind(ordinal_to_db(policy.renewal_window_days(), "renewal_window_days")?)
        .bind(ordinal_to_db(policy.overdue_grace_days(), "overdue_grace_days")?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to upsert policy for scope '{}': {error}",
                policy.scope()
            ))
        })?;

        Ok(())
    }

    pub(super) async fn find_scope_policy_impl(
        &self,
        scope: ScopeId,
    ) -> AppResult<Option<ScopePolicy>> {
        let row = sqlx::query_as::<_, ScopePolicyRow>(
            r#"
            SELECT scope, renewal_window_days, overdue_grace_days
            FROM scope_policies
            WHERE scope = $1
            "#,
        )
        .bind(scope.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find policy for scope '{scope}': {error}"))
        })?;

        row.map(policy_from_row).transpose()
    }

    pub(super) async fn insert_subject_impl(&self, subject: Subject) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subjects (
                id,
                scope,
                display_name,
                participation_index,
                last_batch_at,
                active,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(subject.id())
        .bind(subject.scope().as_uuid())
        .bind(subject.display_name())
        .bind(ordinal_to_db(subject.participation_index(), "participation_index")?)
        .bind(subject.last_batch_at())
        .bind(subject.active())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to insert subject '{}' for scope '{}': {error}",
                subject.id(),
                subject.scope()
            ))
        })?;

        Ok(())
    }

    pub(super) async fn update_subject_impl(&self, subject: Subject) -> AppResult<Subject> {
        let result = sqlx::query(
            r#"
            UPDATE subjects
            SET
                display_name = $3,
                participation_index = $4,
                last_batch_at = $5,
                active = $6,
                updated_at = now()
            WHERE id = $1 AND scope = $2
            "#,
        )
        .bind(subject.id())
        .bind(subject.scope().as_uuid())
        .bind(subject.display_name())
        .bind(ordinal_to_db(subject.participation_index(), "participation_index")?)
        .bind(subject.last_batch_at())
        .bind(subject.active())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update subject '{}' for scope '{}': {error}",
                subject.id(),
                subject.scope()
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "subject '{}' not found in scope '{}'",
                subject.id(),
                subject.scope()
            )));
        }

        Ok(subject)
    }

    pub(super) async fn find_subject_impl(
        &self,
        scope: ScopeId,
        subject_id: Uuid,
    ) -> AppResult<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(
            r#"
            SELECT id, scope, display_name, participation_index, last_batch_at, active
            FROM subjects
            WHERE id = $1 AND scope = $2
            "#,
        )
        .bind(subject_id)
        .bind(scope.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find subject '{subject_id}' for scope '{scope}': {error}"
            ))
        })?;

        row.map(subject_from_row).transpose()
    }

    pub(super) async fn list_subjects_impl(&self, scope: ScopeId) -> AppResult<Vec<Subject>> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            r#"
            SELECT id, scope, display_name, participation_index, last_batch_at, active
            FROM subjects
            WHERE scope = $1
            ORDER BY id
            "#,
        )
        .bind(scope.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list subjects for scope '{scope}': {error}"
            ))
        })?;

        rows.into_iter().map(subject_from_row).collect()
    }
}
