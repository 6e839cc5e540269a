//! Shared fakes for service tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evalia_core::{AppError, AppResult, ScopeId};
use evalia_domain::{
    Batch, BatchStatus, EmissionState, Evaluation, Report, ScopePolicy, Subject,
};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::campaign_ports::{
    AnomalySignal, AuditEntry, AuditRepository, BatchTransition, CampaignRepository, Clock,
    EmissionClaim, EvaluationHistoryEntry, EvaluationResolution, FinalizeEvaluationInput,
    FinalizeOutcome, RenderReportInput, ReportRenderer,
};

#[derive(Default)]
struct Store {
    policies: HashMap<ScopeId, ScopePolicy>,
    subjects: HashMap<Uuid, Subject>,
    batches: HashMap<Uuid, Batch>,
    evaluations: HashMap<Uuid, Evaluation>,
    reports: HashMap<Uuid, Report>,
}

/// In-memory fake honoring the port's atomicity contract: every operation
/// runs under one lock.
#[derive(Default)]
pub struct FakeCampaignRepository {
    store: Mutex<Store>,
}

impl FakeCampaignRepository {
    pub async fn seed_policy(&self, policy: ScopePolicy) {
        self.store.lock().await.policies.insert(policy.scope(), policy);
    }

    pub async fn seed_subject(&self, subject: Subject) {
        self.store.lock().await.subjects.insert(subject.id(), subject);
    }

    pub async fn subject_snapshot(&self, subject_id: Uuid) -> Option<Subject> {
        self.store.lock().await.subjects.get(&subject_id).cloned()
    }
}

#[async_trait]
impl CampaignRepository for FakeCampaignRepository {
    async fn upsert_scope_policy(&self, policy: ScopePolicy) -> AppResult<()> {
        self.store.lock().await.policies.insert(policy.scope(), policy);
        Ok(())
    }

    async fn find_scope_policy(&self, scope: ScopeId) -> AppResult<Option<ScopePolicy>> {
        Ok(self.store.lock().await.policies.get(&scope).copied())
    }

    async fn insert_subject(&self, subject: Subject) -> AppResult<()> {
        self.store.lock().await.subjects.insert(subject.id(), subject);
        Ok(())
    }

    async fn update_subject(&self, subject: Subject) -> AppResult<Subject> {
        let mut store = self.store.lock().await;
        if !store.subjects.contains_key(&subject.id()) {
            return Err(AppError::NotFound(format!(
                "subject '{}' not found",
                subject.id()
            )));
        }
        store.subjects.insert(subject.id(), subject.clone());
        Ok(subject)
    }

    async fn find_subject(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<Option<Subject>> {
        Ok(self
            .store
            .lock()
            .await
            .subjects
            .get(&subject_id)
            .filter(|subject| subject.scope() == scope)
            .cloned())
    }

    async fn list_subjects(&self, scope: ScopeId) -> AppResult<Vec<Subject>> {
        Ok(self
            .store
            .lock()
            .await
            .subjects
            .values()
            .filter(|subject| subject.scope() == scope)
            .cloned()
            .collect())
    }

    async fn max_batch_ordinal(&self, scope: ScopeId) -> AppResult<u32> {
        Ok(self
            .store
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
        let mut store = self.store.lock().await;
        let next = store
            .batches
            .values()
            .filter(|existing| existing.scope() == batch.scope())
            .map(Batch::ordinal)
            .max()
            .unwrap_or(0)
            + 1;
        if batch.ordinal() != next {
            return Err(AppError::Validation(format!(
                "ordinal {} already allocated; next is {next}",
                batch.ordinal()
            )));
        }

        store.batches.insert(batch.id(), batch);
        for evaluation in evaluations {
            store.evaluations.insert(evaluation.id(), evaluation);
        }
        Ok(())
    }

    async fn find_batch(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Batch>> {
        Ok(self
            .store
            .lock()
            .await
            .batches
            .get(&batch_id)
            .filter(|batch| batch.scope() == scope)
            .cloned())
    }

    async fn list_batches(&self, scope: ScopeId) -> AppResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = self
            .store
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
        let store = self.store.lock().await;
        Ok(store
            .batches
            .values()
            .filter(|batch| batch.status() == BatchStatus::Completed && !batch.is_emitted())
            .filter(|batch| !store.reports.contains_key(&batch.id()))
            .filter(|batch| match batch.emission() {
                EmissionState::Idle => true,
                EmissionState::Pending {
                    lease_expires_at, ..
                } => *lease_expires_at <= now,
                _ => false,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_evaluation(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<Option<Evaluation>> {
        let store = self.store.lock().await;
        Ok(store
            .evaluations
            .get(&evaluation_id)
            .filter(|evaluation| {
                store
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
        Ok(self
            .store
            .lock()
            .await
            .evaluations
            .values()
            .filter(|evaluation| evaluation.batch_id() == batch_id)
            .cloned()
            .collect())
    }

    async fn subject_evaluation_history(
        &self,
        _scope: ScopeId,
        subject_id: Uuid,
    ) -> AppResult<Vec<EvaluationHistoryEntry>> {
        let store = self.store.lock().await;
        let mut history: Vec<EvaluationHistoryEntry> = store
            .evaluations
            .values()
            .filter(|evaluation| evaluation.subject_id() == subject_id)
            .filter_map(|evaluation| {
                store
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
        let mut store = self.store.lock().await;
        let Some(stored) = store.evaluations.get(&evaluation.id()) else {
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

        if store
            .batches
            .get(&evaluation.batch_id())
            .is_some_and(Batch::is_emitted)
        {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' has an issued report; its evaluations are immutable",
                evaluation.batch_id()
            )));
        }

        store.evaluations.insert(evaluation.id(), evaluation.clone());
        Ok(evaluation)
    }

    async fn finalize_evaluation(
        &self,
        _scope: ScopeId,
        input: FinalizeEvaluationInput,
    ) -> AppResult<FinalizeOutcome> {
        let mut store = self.store.lock().await;
        let Some(mut evaluation) = store.evaluations.get(&input.evaluation_id).cloned() else {
            return Err(AppError::NotFound(format!(
                "evaluation '{}' not found",
                input.evaluation_id
            )));
        };
        let Some(mut batch) = store.batches.get(&evaluation.batch_id()).cloned() else {
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
                if let Some(subject) = store.subjects.get_mut(&evaluation.subject_id()) {
                    subject.record_completion(batch.ordinal(), input.now)?;
                }
            }
            EvaluationResolution::Invalidate { reason, forced } => {
                evaluation.invalidate(reason, forced, input.now)?;
            }
        }

        store
            .evaluations
            .insert(evaluation.id(), evaluation.clone());

        let siblings: Vec<&Evaluation> = store
            .evaluations
            .values()
            .filter(|candidate| candidate.batch_id() == batch.id())
            .collect();
        let all_finalized = siblings.iter().all(|candidate| candidate.is_finalized());
        let any_completed = siblings
            .iter()
            .any(|candidate| candidate.status() == evalia_domain::EvaluationStatus::Completed);

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

        store.batches.insert(batch.id(), batch.clone());

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
        let mut store = self.store.lock().await;
        let Some(batch) = store.batches.get_mut(&batch_id) else {
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
        let mut store = self.store.lock().await;
        let Some(batch) = store.batches.get_mut(&batch_id) else {
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
        let mut store = self.store.lock().await;
        let Some(batch) = store.batches.get_mut(&batch_id) else {
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
        let mut store = self.store.lock().await;
        if store.reports.contains_key(&batch_id) {
            return Err(AppError::AlreadyInProgress(format!(
                "report already issued for batch '{batch_id}'"
            )));
        }
        let Some(batch) = store.batches.get_mut(&batch_id) else {
            return Err(AppError::NotFound(format!("batch '{batch_id}' not found")));
        };

        batch.commit_emission(token, report.issued_at())?;
        store.reports.insert(batch_id, report.clone());
        Ok(report)
    }

    async fn find_report(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Report>> {
        Ok(self
            .store
            .lock()
            .await
            .reports
            .get(&batch_id)
            .filter(|report| report.scope() == scope)
            .cloned())
    }

    async fn update_report(&self, report: Report) -> AppResult<Report> {
        let mut store = self.store.lock().await;
        if !store.reports.contains_key(&report.batch_id()) {
            return Err(AppError::NotFound(format!(
                "no report issued for batch '{}'",
                report.batch_id()
            )));
        }
        store.reports.insert(report.batch_id(), report.clone());
        Ok(report)
    }
}

#[derive(Default)]
pub struct CollectingAuditRepository {
    entries: Mutex<Vec<AuditEntry>>,
}

impl CollectingAuditRepository {
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditRepository for CollectingAuditRepository {
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

pub struct FixedClock {
    now: DateTime<Utc>,
}

impl Default for FixedClock {
    fn default() -> Self {
        Self { now: Utc::now() }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub failures_remaining: Mutex<u32>,
}

#[async_trait]
impl ReportRenderer for FakeRenderer {
    async fn render(&self, input: RenderReportInput, _timeout: Duration) -> AppResult<Vec<u8>> {
        let mut failures_remaining = self.failures_remaining.lock().await;
        if *failures_remaining > 0 {
            *failures_remaining -= 1;
            return Err(AppError::Internal(
                "simulated artifact rendering failure".to_owned(),
            ));
        }

        let body: Value = serde_json::json!({
            "batch": input.batch.id(),
            "ordinal": input.batch.ordinal(),
            "completed": input.completed_evaluations.len(),
        });
        Ok(body.to_string().into_bytes())
    }
}

#[derive(Default)]
pub struct FakeAnomalySignal {
    pub flagged: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl AnomalySignal for FakeAnomalySignal {
    async fn is_flagged(&self, _scope: ScopeId, subject_id: Uuid) -> AppResult<bool> {
        Ok(self.flagged.lock().await.contains(&subject_id))
    }
}
