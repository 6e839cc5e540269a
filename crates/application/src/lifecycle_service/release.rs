use evalia_domain::rank_subjects;
use serde_json::json;
use tracing::info;

use super::*;

impl LifecycleService {
    /// Creates and releases the next batch for a scope.
    ///
    /// Allocates the next ordinal, runs the eligibility computation, and
    /// bulk-creates one evaluation per eligible subject inside the same
    /// transactional boundary that validates the ordinal. Releasing an
    /// empty wave is refused.
    pub async fn create_batch(&self, principal: &Principal, scope: ScopeId) -> AppResult<Batch> {
        let Some(policy) = self.repository.find_scope_policy(scope).await? else {
            return Err(AppError::NotFound(format!("unknown scope '{scope}'")));
        };

        let now = self.clock.now();
        let ordinal = self.repository.max_batch_ordinal(scope).await? + 1;
        let subjects = self.repository.list_subjects(scope).await?;
        let eligible = rank_subjects(&subjects, ordinal, now, &policy);

        if eligible.is_empty() {
            return Err(AppError::FailedPrecondition(format!(
                "no eligible subjects for batch ordinal {ordinal} in scope '{scope}'"
            )));
        }

        let mut batch = Batch::new(scope, ordinal)?;
        batch.release(now)?;

        let evaluations: Vec<Evaluation> = eligible
            .iter()
            .map(|entry| Evaluation::start(batch.id(), entry.subject.id(), now))
            .collect();
        let evaluation_count = evaluations.len();

        self.repository
            .create_batch(batch.clone(), evaluations)
            .await?;

        info!(
            scope = %scope,
            batch_id = %batch.id(),
            ordinal,
            evaluations = evaluation_count,
            "batch released"
        );

        self.append_audit(
            principal,
            scope,
            AuditAction::BatchReleased,
            "batch",
            batch.id().to_string(),
            None,
            Some(json!({
                "batch": snapshot(&batch)?,
                "evaluations": evaluation_count,
                "tiers": eligible
                    .iter()
                    .map(|entry| entry.tier.as_str())
                    .collect::<Vec<_>>(),
            })),
        )
        .await?;

        Ok(batch)
    }
}
