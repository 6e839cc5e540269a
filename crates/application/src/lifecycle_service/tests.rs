use std::sync::Arc;

use evalia_core::{AppError, Principal, ScopeId};
use evalia_domain::{AuditAction, Batch, BatchStatus, Evaluation, EvaluationStatus};
use serde_json::json;
use uuid::Uuid;

use super::{InvalidationOutcome, LifecycleService};
use crate::campaign_ports::BatchTransition;
use crate::test_support::{
    CollectingAuditRepository, FakeAnomalySignal, FakeCampaignRepository, FixedClock,
};

struct Harness {
    service: LifecycleService,
    repository: Arc<FakeCampaignRepository>,
    audit: Arc<CollectingAuditRepository>,
    scope: ScopeId,
}

fn operator() -> Principal {
    Principal::Human { id: Uuid::new_v4() }
}

fn harness() -> Harness {
    let repository = Arc::new(FakeCampaignRepository::default());
    let audit = Arc::new(CollectingAuditRepository::default());
    let service = LifecycleService::new(
        repository.clone(),
        audit.clone(),
        Arc::new(FixedClock::default()),
    );
    Harness {
        service,
        repository,
        audit,
        scope: ScopeId::new(),
    }
}

impl Harness {
    async fn register_subjects(&self, names: &[&str]) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for name in names {
            let subject = self
                .service
                .register_subject(&operator(), self.scope, *name)
                .await;
            assert!(subject.is_ok());
            ids.push(subject.unwrap_or_else(|_| unreachable!()).id());
        }
        ids
    }

    async fn released_batch(&self) -> Batch {
        let batch = self.service.create_batch(&operator(), self.scope).await;
        assert!(batch.is_ok());
        batch.unwrap_or_else(|_| unreachable!())
    }

    async fn evaluation_of(&self, batch: &Batch, subject_id: Uuid) -> Evaluation {
        let evaluations = self
            .service
            .list_batch_evaluations(self.scope, batch.id())
            .await;
        assert!(evaluations.is_ok());
        evaluations
            .unwrap_or_default()
            .into_iter()
            .find(|evaluation| evaluation.subject_id() == subject_id)
            .unwrap_or_else(|| unreachable!())
    }

    async fn audited_actions(&self) -> Vec<AuditAction> {
        self.audit
            .entries()
            .await
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }
}

#[tokio::test]
async fn release_creates_one_evaluation_per_eligible_subject() {
    let harness = harness();
    harness.register_subjects(&["Alice", "Bob"]).await;

    let batch = harness.released_batch().await;
    assert_eq!(batch.ordinal(), 1);
    assert_eq!(batch.status(), BatchStatus::Active);

    let evaluations = harness
        .service
        .list_batch_evaluations(harness.scope, batch.id())
        .await;
    assert!(evaluations.is_ok());
    let evaluations = evaluations.unwrap_or_default();
    assert_eq!(evaluations.len(), 2);
    assert!(
        evaluations
            .iter()
            .all(|evaluation| evaluation.status() == EvaluationStatus::Started)
    );

    let actions = harness.audited_actions().await;
    assert!(actions.contains(&AuditAction::BatchReleased));
}

#[tokio::test]
async fn release_without_eligible_subjects_is_refused() {
    let harness = harness();
    harness
        .repository
        .seed_policy(evalia_domain::ScopePolicy::with_defaults(harness.scope))
        .await;

    let result = harness.service.create_batch(&operator(), harness.scope).await;
    assert!(matches!(result, Err(AppError::FailedPrecondition(_))));
}

#[tokio::test]
async fn release_on_unknown_scope_is_not_found() {
    let harness = harness();
    let result = harness.service.create_batch(&operator(), harness.scope).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn ordinals_advance_without_gaps_across_cancelled_batches() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;

    let first = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&first, ids[0]).await;
    let outcome = harness
        .service
        .request_invalidation(
            &operator(),
            harness.scope,
            evaluation.id(),
            "left the company",
            false,
        )
        .await;
    assert!(outcome.is_ok());

    // The cancelled ordinal is burned, never reused.
    let second = harness.released_batch().await;
    assert_eq!(second.ordinal(), 2);
}

#[tokio::test]
async fn final_submission_completes_evaluation_and_batch() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;
    let batch = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&batch, ids[0]).await;

    let outcome = harness
        .service
        .submit_response(
            &operator(),
            harness.scope,
            evaluation.id(),
            json!({"q1": 3}),
            true,
        )
        .await;
    assert!(outcome.is_ok());
    let outcome = outcome.unwrap_or_else(|_| unreachable!());
    assert_eq!(outcome.evaluation.status(), EvaluationStatus::Completed);
    assert_eq!(outcome.batch_transition, Some(BatchTransition::Completed));

    let batch = harness.service.find_batch(harness.scope, batch.id()).await;
    assert!(batch.is_ok());
    assert_eq!(
        batch.unwrap_or_else(|_| unreachable!()).status(),
        BatchStatus::Completed
    );

    let subject = harness.repository.subject_snapshot(ids[0]).await;
    assert!(subject.is_some());
    let subject = subject.unwrap_or_else(|| unreachable!());
    assert_eq!(subject.participation_index(), 1);
    assert!(subject.last_batch_at().is_some());

    let actions = harness.audited_actions().await;
    assert!(actions.contains(&AuditAction::EvaluationCompleted));
    assert!(actions.contains(&AuditAction::BatchCompleted));
}

#[tokio::test]
async fn partial_submission_keeps_the_batch_open() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;
    let batch = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&batch, ids[0]).await;

    let outcome = harness
        .service
        .submit_response(
            &operator(),
            harness.scope,
            evaluation.id(),
            json!({"q1": 2}),
            false,
        )
        .await;
    assert!(outcome.is_ok());
    let outcome = outcome.unwrap_or_else(|_| unreachable!());
    assert_eq!(outcome.evaluation.status(), EvaluationStatus::InProgress);
    assert!(outcome.batch_transition.is_none());

    let batch = harness.service.find_batch(harness.scope, batch.id()).await;
    assert!(batch.is_ok());
    assert_eq!(
        batch.unwrap_or_else(|_| unreachable!()).status(),
        BatchStatus::Active
    );
}

#[tokio::test]
async fn finalized_evaluation_rejects_further_submissions() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;
    let batch = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&batch, ids[0]).await;

    let first = harness
        .service
        .submit_response(
            &operator(),
            harness.scope,
            evaluation.id(),
            json!({"q1": 1}),
            true,
        )
        .await;
    assert!(first.is_ok());

    let second = harness
        .service
        .submit_response(
            &operator(),
            harness.scope,
            evaluation.id(),
            json!({"q1": 5}),
            true,
        )
        .await;
    assert!(matches!(second, Err(AppError::FailedPrecondition(_))));
}

#[tokio::test]
async fn all_invalidated_evaluations_cancel_the_batch() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;
    let batch = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&batch, ids[0]).await;

    let outcome = harness
        .service
        .request_invalidation(
            &operator(),
            harness.scope,
            evaluation.id(),
            "medical leave",
            false,
        )
        .await;
    assert!(outcome.is_ok());
    match outcome.unwrap_or_else(|_| unreachable!()) {
        InvalidationOutcome::Invalidated {
            evaluation,
            batch_transition,
        } => {
            assert_eq!(evaluation.status(), EvaluationStatus::Invalidated);
            assert!(!evaluation.invalidation_forced());
            assert_eq!(batch_transition, Some(BatchTransition::Cancelled));
        }
        InvalidationOutcome::RequiresConfirmation { .. } => unreachable!(),
    }

    let actions = harness.audited_actions().await;
    assert!(actions.contains(&AuditAction::BatchCancelled));
    assert!(!actions.contains(&AuditAction::EvaluationInvalidationForced));
}

#[tokio::test]
async fn exactly_one_finalization_observes_the_batch_transition() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice", "Bob", "Carol"]).await;
    let batch = harness.released_batch().await;

    let mut transitions = 0;
    for subject_id in &ids {
        let evaluation = harness.evaluation_of(&batch, *subject_id).await;
        let outcome = harness
            .service
            .submit_response(
                &operator(),
                harness.scope,
                evaluation.id(),
                json!({"q1": 4}),
                true,
            )
            .await;
        assert!(outcome.is_ok());
        if outcome
            .unwrap_or_else(|_| unreachable!())
            .batch_transition
            .is_some()
        {
            transitions += 1;
        }
    }

    assert_eq!(transitions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_completion_and_invalidation_yield_one_transition() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice", "Bob"]).await;
    let batch = harness.released_batch().await;
    let completing = harness.evaluation_of(&batch, ids[0]).await.id();
    let invalidating = harness.evaluation_of(&batch, ids[1]).await.id();

    let scope = harness.scope;
    let completion_service = harness.service.clone();
    let completion = tokio::spawn(async move {
        completion_service
            .submit_response(&operator(), scope, completing, json!({"q1": 4}), true)
            .await
    });
    let invalidation_service = harness.service.clone();
    let invalidation = tokio::spawn(async move {
        invalidation_service
            .request_invalidation(&operator(), scope, invalidating, "medical leave", false)
            .await
    });

    let (completion, invalidation) = tokio::join!(completion, invalidation);
    let completion = completion.unwrap_or_else(|_| unreachable!());
    let invalidation = invalidation.unwrap_or_else(|_| unreachable!());
    assert!(completion.is_ok());
    assert!(invalidation.is_ok());

    let mut transitions = 0;
    if completion
        .unwrap_or_else(|_| unreachable!())
        .batch_transition
        .is_some()
    {
        transitions += 1;
    }
    match invalidation.unwrap_or_else(|_| unreachable!()) {
        InvalidationOutcome::Invalidated {
            batch_transition, ..
        } => {
            if batch_transition.is_some() {
                transitions += 1;
            }
        }
        InvalidationOutcome::RequiresConfirmation { .. } => unreachable!(),
    }
    assert_eq!(transitions, 1);

    let batch = harness.service.find_batch(harness.scope, batch.id()).await;
    assert!(batch.is_ok());
    assert_eq!(
        batch.unwrap_or_else(|_| unreachable!()).status(),
        BatchStatus::Completed
    );
}

#[tokio::test]
async fn guard_soft_blocks_after_a_prior_invalidation() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;

    let first = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&first, ids[0]).await;
    let first_outcome = harness
        .service
        .request_invalidation(
            &operator(),
            harness.scope,
            evaluation.id(),
            "extended absence",
            false,
        )
        .await;
    assert!(first_outcome.is_ok());

    let second = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&second, ids[0]).await;

    let check = harness
        .service
        .check_invalidation(harness.scope, evaluation.id())
        .await;
    assert!(check.is_ok());
    let check = check.unwrap_or_else(|_| unreachable!());
    assert!(!check.allowed);
    assert_eq!(check.prior_consecutive, 1);

    let blocked = harness
        .service
        .request_invalidation(
            &operator(),
            harness.scope,
            evaluation.id(),
            "extended absence",
            false,
        )
        .await;
    assert!(blocked.is_ok());
    assert!(matches!(
        blocked.unwrap_or_else(|_| unreachable!()),
        InvalidationOutcome::RequiresConfirmation {
            prior_consecutive: 1
        }
    ));
}

#[tokio::test]
async fn forced_override_is_recorded_and_audited() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;

    let first = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&first, ids[0]).await;
    assert!(
        harness
            .service
            .request_invalidation(
                &operator(),
                harness.scope,
                evaluation.id(),
                "extended absence",
                false,
            )
            .await
            .is_ok()
    );

    let second = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&second, ids[0]).await;
    let outcome = harness
        .service
        .request_invalidation(
            &operator(),
            harness.scope,
            evaluation.id(),
            "still absent",
            true,
        )
        .await;
    assert!(outcome.is_ok());
    match outcome.unwrap_or_else(|_| unreachable!()) {
        InvalidationOutcome::Invalidated { evaluation, .. } => {
            assert!(evaluation.invalidation_forced());
            assert_eq!(evaluation.invalidation_reason(), Some("still absent"));
        }
        InvalidationOutcome::RequiresConfirmation { .. } => unreachable!(),
    }

    let actions = harness.audited_actions().await;
    assert!(actions.contains(&AuditAction::EvaluationInvalidationForced));
}

#[tokio::test]
async fn anomaly_signal_waives_the_confirmation() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice"]).await;

    let anomaly = Arc::new(FakeAnomalySignal::default());
    anomaly.flagged.lock().await.push(ids[0]);
    let service = harness.service.clone().with_anomaly_signal(anomaly);

    let first = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&first, ids[0]).await;
    assert!(
        service
            .request_invalidation(
                &operator(),
                harness.scope,
                evaluation.id(),
                "extended absence",
                false,
            )
            .await
            .is_ok()
    );

    let second = harness.released_batch().await;
    let evaluation = harness.evaluation_of(&second, ids[0]).await;

    let check = service
        .check_invalidation(harness.scope, evaluation.id())
        .await;
    assert!(check.is_ok());
    let check = check.unwrap_or_else(|_| unreachable!());
    assert!(check.allowed);
    assert_eq!(check.prior_consecutive, 1);

    let outcome = service
        .request_invalidation(
            &operator(),
            harness.scope,
            evaluation.id(),
            "still absent",
            false,
        )
        .await;
    assert!(outcome.is_ok());
    match outcome.unwrap_or_else(|_| unreachable!()) {
        InvalidationOutcome::Invalidated { evaluation, .. } => {
            // Waived by the signal, so no forced flag is recorded.
            assert!(!evaluation.invalidation_forced());
        }
        InvalidationOutcome::RequiresConfirmation { .. } => unreachable!(),
    }
}

#[tokio::test]
async fn deactivated_subjects_are_skipped_at_release() {
    let harness = harness();
    let ids = harness.register_subjects(&["Alice", "Bob"]).await;
    assert!(
        harness
            .service
            .set_subject_active(&operator(), harness.scope, ids[0], false)
            .await
            .is_ok()
    );

    let batch = harness.released_batch().await;
    let evaluations = harness
        .service
        .list_batch_evaluations(harness.scope, batch.id())
        .await;
    assert!(evaluations.is_ok());
    let evaluations = evaluations.unwrap_or_default();
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].subject_id(), ids[1]);
}
