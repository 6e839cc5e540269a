use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evalia_application::{
    BatchTransition, CampaignRepository, EmissionClaim, EvaluationHistoryEntry,
    EvaluationResolution, FinalizeEvaluationInput, FinalizeOutcome,
};
use evalia_core::{AppError, AppResult, ScopeId};
use evalia_domain::{
    Batch, BatchStatus, EmissionState, Evaluation, EvaluationStatus, Report, ScopePolicy, Subject,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    policies: HashMap<ScopeId, ScopePolicy>,
    subjects: HashMap<Uuid, Subject>,
    batches: HashMap<Uuid, Batch>,
    evaluations: HashMap<Uuid, Evaluation>,
    reports: HashMap<Uuid, Report>,
}

/// In-memory campaign repository used in development mode.
///
/// A single lock guards the whole state so every multi-record operation of
/// the port contract is naturally atomic.
#[derive(Default)]
pub struct InMemoryCampaignRepository {
    state: Mutex<State>,
}

impl InMemoryCampaignRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaignRepository {
    async fn upsert_scope_policy(&self, policy: ScopePolicy) -> AppResult<()> {
        self.state.lock().await.policies.insert(policy.scope(), policy);
        Ok(())
    }

    async fn find_scope_policy(&self, scope: ScopeId) -> AppResult<Option<ScopePolicy>> {
        Ok(self.state.lock().await.policies.get(&scope).copied())
    }

    async fn insert_subject(&self, subject: Subject) -> AppResult<()> {
        self.state.lock().await.subjects.insert(subject.id(), subject);
        Ok(())
    }

    async fn update_subject(&self, subject: Subject) -> AppResult<Subject> {
        let mut state = self.state.lock().await;
        if !state.subjects.contains_key(&subject.id()) {
            return Err(AppError::NotFound(format!(
                "subject '{}' not found",
                subject.id()
            )));
        }
        state.subjects.insert(subject.id(), subject.clone());
        Ok(subject)
    }

    async fn find_subject(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<Option<Subject>> {
        Ok(self
            .state
            .lock()
            .await
            .subjects
            .get(&subject_id)
            .filter(|subject| subject.scope() == scope)
            .cloned())
    }

    async fn list_subjects(&self, scope: ScopeId) -> AppResult<Vec<Subject>> {
        let mut subjects: Vec<Subject> = self
            .state
            .lock()
            .await
            .subjects
            .values()
            .filter(|subject| subject.scope() == scope)
            .cloned()
            .collect();
        subjects.sort_by_key(Subject::id);
        Ok(subjects)
    }

    async fn max_batch_ordinal(&self, scope: ScopeId) -> AppResult<u32> {
        Ok(self
            .state
            .lock()
            .await
            .batches
            .values()
            .filter(|batch| batch.scope() == scope)
            .map(Batch::ordinal)
            .max()
            .unwrap_or(0))
    }

    async fn create_batch(&self, batch: Batch, evaluations: Vec<Evaluation>) -> AppResult<()> {
        let mut state = self.state.lock().await;

        // Re-validated under the lock: a concurrent release may have taken
        // the ordinal since the caller computed it.
        let next = state
            .batches
            .values()
            .filter(|existing| existing.scope() == batch.scope())
            .map(Batch::ordinal)
            .max()
            .unwrap_or(0)
            + 1;
        if batch.ordinal() != next {
            return Err(AppError::Validation(format!(
                "batch ordinal {} for scope '{}' is stale; the next ordinal is {next}",
                batch.ordinal(),
                batch.scope()
            )));
        }

        state.batches.insert(batch.id(), batch);
        for evaluation in evaluations {
            state.evaluations.insert(evaluation.id(), evaluation);
        }
        Ok(())
    }

    async fn find_batch(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Batch>> {
        Ok(self
            .state
            .lock()
            .await
            .batches
            .get(&batch_id)
            .filter(|batch| batch.scope() == scope)
            .cloned())
    }

    async fn list_batches(&self, scope: ScopeId) -> AppResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = self
            .state
            .lock()
            .await
            .batches
            .values()
            .filter(|batch| batch.scope() == scope)
            .cloned()
            .collect();
        batches.sort_by_key(Batch::ordinal);
        Ok(batches)
    }

    async fn list_emittable_batches(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Batch>> {
        let state = self.state.lock().await;
        let mut batches: Vec<Batch> = state
            .batches
            .values()
            .filter(|batch| batch.status() == BatchStatus::Completed && !batch.is_emitted())
            .filter(|batch| !state.reports.contains_key(&batch.id()))
            .filter(|batch| match batch.emission() {
                EmissionState::Idle => true,
                EmissionState::Pending {
                    lease_expires_at, ..
                } => *lease_expires_at <= now,
                _ => false,
            })
            .cloned()
            .collect();
        batches.sort_by_key(Batch::completed_at);
        batches.truncate(limit);
        Ok(batches)
    }

    async fn find_evaluation(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<Option<Evaluation>> {
        let state = self.state.lock().await;
        Ok(state
            .evaluations
            .get(&evaluation_id)
            .filter(|evaluation| {
                state
                    .batches
                    .get(&evaluation.batch_id())
                    .is_some_and(|batch| batch.scope() == scope)
            })
            .cloned())
    }

    async fn list_batch_evaluations(
        &self,
        _scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Vec<Evaluation>> {
        let mut evaluations: Vec<Evaluation> = self
            .state
            .lock()
            .await
            .evaluations
            .values()
            .filter(|evaluation| evaluation.batch_id() == batch_id)
            .cloned()
            .collect();
        evaluations.sort_by_key(Evaluation::id);
        Ok(evaluations)
    }

    async fn subject_evaluation_history(
        &self,
        _scope: ScopeId,
        subject_id: Uuid,
    ) -> AppResult<Vec<EvaluationHistoryEntry>> {
        let state = self.state.lock().await;
        let mut history: Vec<EvaluationHistoryEntry> = state
            .evaluations
            .values()
            .filter(|evaluation| evaluation.subject_id() == subject_id)
            .filter_map(|evaluation| {
                state
                    .batches
                    .get(&evaluation.batch_id())
                    .map(|batch| EvaluationHistoryEntry {
                        batch_ordinal: batch.ordinal(),
                        batch_id: batch.id(),
                        status: evaluation.status(),
                    })
            })
            .collect();
        history.sort_by_key(|entry| entry.batch_ordinal);
        Ok(history)
    }

    async fn update_open_evaluation(
        &self,
        _scope: ScopeId,
        evaluation: Evaluation,
    ) -> AppResult<Evaluation> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.evaluations.get(&evaluation.id()) else {
            return Err(AppError::NotFound(format!(
                "evaluation '{}' not found",
                evaluation.id()
            )));
        };

        if stored.is_finalized() {
            return Err(AppError::FailedPrecondition(format!(
                "evaluation '{}' is already finalized",
                evaluation.id()
            )));
        }

        if state
            .batches
            .get(&evaluation.batch_id())
            .is_some_and(Batch::is_emitted)
        {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' has an issued report; its evaluations are immutable",
                evaluation.batch_id()
            )));
        }

        state.evaluations.insert(evaluation.id(), evaluation.clone());
        Ok(evaluation)
    }

    async fn finalize_evaluation(
        &self,
        _scope: ScopeId,
        input: FinalizeEvaluationInput,
    ) -> AppResult<FinalizeOutcome> {
        let mut state = self.state.lock().await;
        let Some(mut evaluation) = state.evaluations.get(&input.evaluation_id).cloned() else {
            return Err(AppError::NotFound(format!(
                "evaluation '{}' not found",
                input.evaluation_id
            )));
        };
        let Some(mut batch) = state.batches.get(&evaluation.batch_id()).cloned() else {
            return Err(AppError::NotFound(format!(
                "batch '{}' not found",
                evaluation.batch_id()
            )));
        };

        if batch.is_emitted() {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' has an issued report; its evaluations are immutable",
                batch.id()
            )));
        }

        match input.resolution {
            EvaluationResolution::Complete { payload } => {
                evaluation.complete(payload, input.now)?;
                if let Some(subject) = state.subjects.get_mut(&evaluation.subject_id()) {
                    subject.record_completion(batch.ordinal(), input.now)?;
                }
            }
            EvaluationResolution::Invalidate { reason, forced } => {
                evaluation.invalidate(reason, forced, input.now)?;
            }
        }

        state
            .evaluations
            .insert(evaluation.id(), evaluation.clone());

        let siblings: Vec<&Evaluation> = state
            .evaluations
            .values()
            .filter(|candidate| candidate.batch_id() == batch.id())
            .collect();
        let all_finalized = siblings.iter().all(|candidate| candidate.is_finalized());
        let any_completed = siblings
            .iter()
            .any(|candidate| candidate.status() == EvaluationStatus::Completed);

        let transition = if all_finalized {
            if any_completed {
                batch.complete(input.now)?;
                Some(BatchTransition::Completed)
            } else {
                batch.cancel(input.now)?;
                Some(BatchTransition::Cancelled)
            }
        } else {
            None
        };

        state.batches.insert(batch.id(), batch.clone());

        Ok(FinalizeOutcome {
            evaluation,
            batch,
            transition,
        })
    }

    async fn claim_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<EmissionClaim> {
        let mut state = self.state.lock().await;
        let Some(batch) = state.batches.get_mut(&batch_id) else {
            return Err(AppError::NotFound(format!(
                "batch '{batch_id}' not found in scope '{scope}'"
            )));
        };

        let token = Uuid::new_v4();
        batch.claim_emission(token, lease_expires_at, now)?;
        Ok(EmissionClaim {
            batch: batch.clone(),
            token,
        })
    }

    async fn release_emission_claim(
        &self,
        _scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(batch) = state.batches.get_mut(&batch_id) else {
            return Err(AppError::NotFound(format!("batch '{batch_id}' not found")));
        };
        batch.release_emission_claim(token)
    }

    async fn reject_emission(
        &self,
        _scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        reasons: Vec<String>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(batch) = state.batches.get_mut(&batch_id) else {
            return Err(AppError::NotFound(format!("batch '{batch_id}' not found")));
        };
        batch.reject_emission(token, reasons)
    }

    async fn commit_emission(
        &self,
        _scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        report: Report,
    ) -> AppResult<Report> {
        let mut state = self.state.lock().await;
        if state.reports.contains_key(&batch_id) {
            return Err(AppError::AlreadyInProgress(format!(
                "report already issued for batch '{batch_id}'"
            )));
        }
        let Some(batch) = state.batches.get_mut(&batch_id) else {
            return Err(AppError::NotFound(format!("batch '{batch_id}' not found")));
        };

        batch.commit_emission(token, report.issued_at())?;
        state.reports.insert(batch_id, report.clone());
        Ok(report)
    }

    async fn find_report(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Report>> {
        Ok(self
            .state
            .lock()
            .await
            .reports
            .get(&batch_id)
            .filter(|report| report.scope() == scope)
            .cloned())
    }

    async fn update_report(&self, report: Report) -> AppResult<Report> {
        let mut state = self.state.lock().await;
        if !state.reports.contains_key(&report.batch_id()) {
            return Err(AppError::NotFound(format!(
                "no report issued for batch '{}'",
                report.batch_id()
            )));
        }
        state.reports.insert(report.batch_id(), report.clone());
        Ok(report)
    }
}
