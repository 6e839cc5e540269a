use evalia_domain::EvaluationStatus;
use serde_json::Value;
use tracing::info;

use super::*;
use crate::campaign_ports::{EvaluationResolution, FinalizeEvaluationInput};

impl LifecycleService {
    /// Records a response for an evaluation.
    ///
    /// A partial submission moves the evaluation in progress; the final
    /// submission completes it and recomputes the owning batch inside the
    /// same unit of work.
    pub async fn submit_response(
        &self,
        principal: &Principal,
        scope: ScopeId,
        evaluation_id: Uuid,
        payload: Value,
        is_final: bool,
    ) -> AppResult<SubmitResponseOutcome> {
        if is_final {
            return self
                .finalize_with_audit(
                    principal,
                    scope,
                    FinalizeEvaluationInput {
                        evaluation_id,
                        resolution: EvaluationResolution::Complete { payload },
                        now: self.clock.now(),
                    },
                )
                .await;
        }

        let evaluation = self.find_evaluation(scope, evaluation_id).await?;
        let batch = self.find_batch(scope, evaluation.batch_id()).await?;
        if batch.is_emitted() {
            // Advisory pre-check; the storage adapter re-validates inside
            // the conditional write.
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' has an issued report; its evaluations are immutable",
                batch.id()
            )));
        }

        let was_started = evaluation.status() == EvaluationStatus::Started;
        let before = snapshot(&evaluation)?;
        let mut evaluation = evaluation;
        evaluation.record_partial_response(payload)?;
        let evaluation = self
            .repository
            .update_open_evaluation(scope, evaluation)
            .await?;

        if was_started {
            self.append_audit(
                principal,
                scope,
                AuditAction::EvaluationProgressed,
                "evaluation",
                evaluation.id().to_string(),
                Some(before),
                Some(snapshot(&evaluation)?),
            )
            .await?;
        }

        Ok(SubmitResponseOutcome {
            evaluation,
            batch_transition: None,
        })
    }

    pub(super) async fn finalize_with_audit(
        &self,
        principal: &Principal,
        scope: ScopeId,
        input: FinalizeEvaluationInput,
    ) -> AppResult<SubmitResponseOutcome> {
        let evaluation_id = input.evaluation_id;
        let forced = matches!(
            input.resolution,
            EvaluationResolution::Invalidate { forced: true, .. }
        );
        let action = match input.resolution {
            EvaluationResolution::Complete { .. } => AuditAction::EvaluationCompleted,
            EvaluationResolution::Invalidate { .. } => AuditAction::EvaluationInvalidated,
        };

        let before = snapshot(&self.find_evaluation(scope, evaluation_id).await?)?;
        let outcome = self.repository.finalize_evaluation(scope, input).await?;

        self.append_audit(
            principal,
            scope,
            action,
            "evaluation",
            evaluation_id.to_string(),
            Some(before),
            Some(snapshot(&outcome.evaluation)?),
        )
        .await?;

        if forced {
            self.append_audit(
                principal,
                scope,
                AuditAction::EvaluationInvalidationForced,
                "evaluation",
                evaluation_id.to_string(),
                None,
                Some(snapshot(&outcome.evaluation)?),
            )
            .await?;
        }

        if let Some(transition) = outcome.transition {
            info!(
                scope = %scope,
                batch_id = %outcome.batch.id(),
                transition = ?transition,
                "batch reached terminal aggregate state"
            );
            self.audit_batch_transition(scope, &outcome.batch, transition)
                .await?;
        }

        Ok(SubmitResponseOutcome {
            evaluation: outcome.evaluation,
            batch_transition: outcome.transition,
        })
    }
}
