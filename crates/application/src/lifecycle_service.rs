use std::sync::Arc;

use evalia_core::{AppError, AppResult, Principal, ScopeId};
use evalia_domain::{
    AuditAction, Batch, Evaluation, Report, ScopePolicy, Subject,
};
use serde_json::Value;
use uuid::Uuid;

use crate::campaign_ports::{
    AnomalySignal, AuditEntry, AuditRepository, BatchTransition, CampaignRepository, Clock,
};

mod invalidation;
mod release;
mod responses;

/// Result of a response submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResponseOutcome {
    /// The evaluation after the mutation.
    pub evaluation: Evaluation,
    /// Batch transition triggered by this submission, if it was the last
    /// open evaluation.
    pub batch_transition: Option<BatchTransition>,
}

/// Consecutive-invalidation guard verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationCheck {
    /// Whether the invalidation may proceed without forced confirmation.
    pub allowed: bool,
    /// Number of immediately preceding invalidated evaluations.
    pub prior_consecutive: u32,
    /// Human-readable explanation of the verdict.
    pub reason: String,
}

/// Result of an invalidation request.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidationOutcome {
    /// The evaluation was invalidated.
    Invalidated {
        /// The invalidated evaluation.
        evaluation: Evaluation,
        /// Batch transition triggered by this invalidation, if any.
        batch_transition: Option<BatchTransition>,
    },
    /// Soft block: the guard requires forced confirmation before the
    /// subject is excluded again.
    RequiresConfirmation {
        /// Number of immediately preceding invalidated evaluations.
        prior_consecutive: u32,
    },
}

/// Owns the batch and evaluation state machines: creates batches, assigns
/// evaluations, reacts to completion and invalidation, and decides when a
/// batch is finished.
#[derive(Clone)]
pub struct LifecycleService {
    repository: Arc<dyn CampaignRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    clock: Arc<dyn Clock>,
    anomaly_signal: Option<Arc<dyn AnomalySignal>>,
}

impl LifecycleService {
    /// Creates a lifecycle service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        audit_repository: Arc<dyn AuditRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            audit_repository,
            clock,
            anomaly_signal: None,
        }
    }

    /// Adds the optional anomaly-detection signal consulted by the
    /// consecutive-invalidation guard.
    #[must_use]
    pub fn with_anomaly_signal(mut self, anomaly_signal: Arc<dyn AnomalySignal>) -> Self {
        self.anomaly_signal = Some(anomaly_signal);
        self
    }

    /// Registers a subject, provisioning the default scope policy on first
    /// use of a scope.
    pub async fn register_subject(
        &self,
        principal: &Principal,
        scope: ScopeId,
        display_name: impl Into<String>,
    ) -> AppResult<Subject> {
        if self.repository.find_scope_policy(scope).await?.is_none() {
            self.repository
                .upsert_scope_policy(ScopePolicy::with_defaults(scope))
                .await?;
        }

        let subject = Subject::register(scope, display_name)?;
        self.repository.insert_subject(subject.clone()).await?;
        self.append_audit(
            principal,
            scope,
            AuditAction::SubjectRegistered,
            "subject",
            subject.id().to_string(),
            None,
            Some(snapshot(&subject)?),
        )
        .await?;

        Ok(subject)
    }

    /// Toggles administrative activation for a subject.
    pub async fn set_subject_active(
        &self,
        principal: &Principal,
        scope: ScopeId,
        subject_id: Uuid,
        active: bool,
    ) -> AppResult<Subject> {
        let Some(mut subject) = self.repository.find_subject(scope, subject_id).await? else {
            return Err(AppError::NotFound(format!(
                "subject '{subject_id}' not found in scope '{scope}'"
            )));
        };

        let before = snapshot(&subject)?;
        subject.set_active(active);
        let subject = self.repository.update_subject(subject).await?;
        self.append_audit(
            principal,
            scope,
            AuditAction::SubjectActivationChanged,
            "subject",
            subject.id().to_string(),
            Some(before),
            Some(snapshot(&subject)?),
        )
        .await?;

        Ok(subject)
    }

    /// Returns one subject.
    pub async fn find_subject(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<Subject> {
        self.repository
            .find_subject(scope, subject_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "subject '{subject_id}' not found in scope '{scope}'"
                ))
            })
    }

    /// Lists every subject in a scope.
    pub async fn list_subjects(&self, scope: ScopeId) -> AppResult<Vec<Subject>> {
        self.repository.list_subjects(scope).await
    }

    /// Returns one batch.
    pub async fn find_batch(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Batch> {
        self.repository
            .find_batch(scope, batch_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("batch '{batch_id}' not found in scope '{scope}'"))
            })
    }

    /// Lists batches for a scope ordered by ordinal.
    pub async fn list_batches(&self, scope: ScopeId) -> AppResult<Vec<Batch>> {
        self.repository.list_batches(scope).await
    }

    /// Returns one evaluation.
    pub async fn find_evaluation(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<Evaluation> {
        self.repository
            .find_evaluation(scope, evaluation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "evaluation '{evaluation_id}' not found in scope '{scope}'"
                ))
            })
    }

    /// Lists evaluations of one batch.
    pub async fn list_batch_evaluations(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Vec<Evaluation>> {
        self.repository.list_batch_evaluations(scope, batch_id).await
    }

    /// Returns the issued report for a batch.
    pub async fn find_report(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Report> {
        self.repository
            .find_report(scope, batch_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no report issued for batch '{batch_id}' in scope '{scope}'"
                ))
            })
    }

    async fn append_audit(
        &self,
        principal: &Principal,
        scope: ScopeId,
        action: AuditAction,
        resource_type: &str,
        resource_id: String,
        before: Option<Value>,
        after: Option<Value>,
    ) -> AppResult<()> {
        self.audit_repository
            .append_entry(AuditEntry {
                scope,
                principal: *principal,
                action,
                resource_type: resource_type.to_owned(),
                resource_id,
                before,
                after,
                recorded_at: self.clock.now(),
            })
            .await
    }

    async fn audit_batch_transition(
        &self,
        scope: ScopeId,
        batch: &Batch,
        transition: BatchTransition,
    ) -> AppResult<()> {
        let action = match transition {
            BatchTransition::Completed => AuditAction::BatchCompleted,
            BatchTransition::Cancelled => AuditAction::BatchCancelled,
        };

        // Automatic transitions are attributed to the system sentinel, not
        // to whichever caller happened to finalize the last evaluation.
        self.append_audit(
            &Principal::System,
            scope,
            action,
            "batch",
            batch.id().to_string(),
            None,
            Some(snapshot(batch)?),
        )
        .await
    }
}

fn snapshot<T: serde::Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("failed to serialize audit snapshot: {error}")))
}

#[cfg(test)]
mod tests;
