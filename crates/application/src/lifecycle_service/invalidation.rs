use evalia_domain::EvaluationStatus;

use super::*;
use crate::campaign_ports::{
    EvaluationHistoryEntry, EvaluationResolution, FinalizeEvaluationInput,
};

impl LifecycleService {
    /// Runs the consecutive-invalidation guard for one evaluation.
    ///
    /// Counts the subject's immediately preceding invalidated evaluations
    /// by descending ordinal in the same scope. A subject with no history
    /// is always allowed; one or more prior invalidations soft-block the
    /// request unless the anomaly signal fires.
    pub async fn check_invalidation(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<InvalidationCheck> {
        let evaluation = self.find_evaluation(scope, evaluation_id).await?;
        let batch = self.find_batch(scope, evaluation.batch_id()).await?;
        let history = self
            .repository
            .subject_evaluation_history(scope, evaluation.subject_id())
            .await?;

        let prior_consecutive = consecutive_prior_invalidations(&history, batch.ordinal());
        if prior_consecutive == 0 {
            return Ok(InvalidationCheck {
                allowed: true,
                prior_consecutive: 0,
                reason: "no prior invalidation in the immediately preceding batch".to_owned(),
            });
        }

        if self.anomaly_flagged(scope, evaluation.subject_id()).await? {
            return Ok(InvalidationCheck {
                allowed: true,
                prior_consecutive,
                reason: "anomaly signal active; confirmation waived".to_owned(),
            });
        }

        Ok(InvalidationCheck {
            allowed: false,
            prior_consecutive,
            reason: format!(
                "subject was invalidated in the {prior_consecutive} immediately preceding batch(es); forced confirmation required"
            ),
        })
    }

    /// Requests invalidation of an evaluation.
    ///
    /// Returns a structured confirmation requirement — not an error — when
    /// the guard soft-blocks and no override was supplied. A forced
    /// override is durably recorded on the evaluation and in the audit
    /// trail.
    pub async fn request_invalidation(
        &self,
        principal: &Principal,
        scope: ScopeId,
        evaluation_id: Uuid,
        reason: impl Into<String>,
        force: bool,
    ) -> AppResult<InvalidationOutcome> {
        let check = self.check_invalidation(scope, evaluation_id).await?;
        if !check.allowed && !force {
            return Ok(InvalidationOutcome::RequiresConfirmation {
                prior_consecutive: check.prior_consecutive,
            });
        }

        let outcome = self
            .finalize_with_audit(
                principal,
                scope,
                FinalizeEvaluationInput {
                    evaluation_id,
                    resolution: EvaluationResolution::Invalidate {
                        reason: reason.into(),
                        forced: !check.allowed && force,
                    },
                    now: self.clock.now(),
                },
            )
            .await?;

        Ok(InvalidationOutcome::Invalidated {
            evaluation: outcome.evaluation,
            batch_transition: outcome.batch_transition,
        })
    }

    async fn anomaly_flagged(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<bool> {
        match &self.anomaly_signal {
            Some(signal) => signal.is_flagged(scope, subject_id).await,
            None => Ok(false),
        }
    }
}

/// Counts invalidated evaluations in the batches immediately preceding the
/// given ordinal, stopping at the first gap or non-invalidated entry.
fn consecutive_prior_invalidations(
    history: &[EvaluationHistoryEntry],
    current_ordinal: u32,
) -> u32 {
    let mut count = 0;
    let mut expected = current_ordinal.saturating_sub(1);

    while expected > 0 {
        let entry = history
            .iter()
            .find(|entry| entry.batch_ordinal == expected);
        match entry {
            Some(entry) if entry.status == EvaluationStatus::Invalidated => {
                count += 1;
                expected -= 1;
            }
            _ => break,
        }
    }

    count
}
