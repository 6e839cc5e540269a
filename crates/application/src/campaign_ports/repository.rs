use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evalia_core::{AppResult, ScopeId};
use evalia_domain::{Batch, Evaluation, EvaluationStatus, Report, ScopePolicy, Subject};
use serde_json::Value;
use uuid::Uuid;

/// Terminal transition taken by a batch when its last evaluation finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTransition {
    /// At least one evaluation completed; the batch is emission-eligible.
    Completed,
    /// Every evaluation was invalidated; nothing to report.
    Cancelled,
}

/// How an evaluation leaves the mutable part of its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResolution {
    /// Record the final response payload and complete.
    Complete {
        /// Final response payload, merged into accumulated responses.
        payload: Value,
    },
    /// Invalidate with a recorded reason.
    Invalidate {
        /// Operator-supplied invalidation reason.
        reason: String,
        /// Whether the consecutive-invalidation guard was overridden.
        forced: bool,
    },
}

/// Input for the atomic finalize-and-recompute operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeEvaluationInput {
    /// Evaluation to finalize.
    pub evaluation_id: Uuid,
    /// Completion or invalidation.
    pub resolution: EvaluationResolution,
    /// Timestamp applied to every record touched in the unit of work.
    pub now: DateTime<Utc>,
}

/// Result of the atomic finalize-and-recompute operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    /// The finalized evaluation.
    pub evaluation: Evaluation,
    /// The owning batch after recomputation.
    pub batch: Batch,
    /// Batch transition taken by this unit of work, if any. Exactly one
    /// finalization observes each transition.
    pub transition: Option<BatchTransition>,
}

/// One row of a subject's cross-batch evaluation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationHistoryEntry {
    /// Ordinal of the owning batch.
    pub batch_ordinal: u32,
    /// Owning batch identifier.
    pub batch_id: Uuid,
    /// Evaluation status within that batch.
    pub status: EvaluationStatus,
}

/// An exclusive emission claim held on one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionClaim {
    /// The claimed batch snapshot.
    pub batch: Batch,
    /// Fencing token required by every follow-up emission write.
    pub token: Uuid,
}

/// Transactional store port for subjects, batches, evaluations and reports.
///
/// Implementations must execute every documented multi-record operation as
/// one atomic read-modify-write: a service-level pre-check is advisory only
/// and each invariant is re-validated inside the mutating write.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Creates or replaces the renewal policy for a scope.
    async fn upsert_scope_policy(&self, policy: ScopePolicy) -> AppResult<()>;

    /// Returns the renewal policy for a scope.
    async fn find_scope_policy(&self, scope: ScopeId) -> AppResult<Option<ScopePolicy>>;

    /// Inserts a newly registered subject.
    async fn insert_subject(&self, subject: Subject) -> AppResult<()>;

    /// Replaces an existing subject record.
    async fn update_subject(&self, subject: Subject) -> AppResult<Subject>;

    /// Returns one subject by id.
    async fn find_subject(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<Option<Subject>>;

    /// Lists every subject in a scope, active or not.
    async fn list_subjects(&self, scope: ScopeId) -> AppResult<Vec<Subject>>;

    /// Returns the highest batch ordinal assigned in a scope, zero when the
    /// scope has no batches.
    async fn max_batch_ordinal(&self, scope: ScopeId) -> AppResult<u32>;

    /// Persists a released batch and its bulk-created evaluations.
    ///
    /// Atomically re-validates that the batch ordinal is still the next
    /// unused ordinal for the scope and fails with a validation error when a
    /// concurrent release won the allocation.
    async fn create_batch(&self, batch: Batch, evaluations: Vec<Evaluation>) -> AppResult<()>;

    /// Returns one batch by id.
    async fn find_batch(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Batch>>;

    /// Lists batches for a scope ordered by ordinal.
    async fn list_batches(&self, scope: ScopeId) -> AppResult<Vec<Batch>>;

    /// Lists completed batches without an issued report whose emission state
    /// is idle or holds an expired lease.
    async fn list_emittable_batches(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Batch>>;

    /// Returns one evaluation by id.
    async fn find_evaluation(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<Option<Evaluation>>;

    /// Lists evaluations of one batch.
    async fn list_batch_evaluations(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Vec<Evaluation>>;

    /// Lists a subject's evaluation history ordered by ascending batch
    /// ordinal.
    async fn subject_evaluation_history(
        &self,
        scope: ScopeId,
        subject_id: Uuid,
    ) -> AppResult<Vec<EvaluationHistoryEntry>>;

    /// Replaces a non-finalized evaluation, re-validating inside the write
    /// that the stored evaluation is still open and the owning batch is not
    /// emitted.
    async fn update_open_evaluation(
        &self,
        scope: ScopeId,
        evaluation: Evaluation,
    ) -> AppResult<Evaluation>;

    /// Finalizes one evaluation and recomputes the owning batch's aggregate
    /// status in the same unit of work.
    ///
    /// On completion the subject's participation index and last-batch
    /// timestamp advance inside the same boundary. Two concurrent
    /// finalizations of the same batch must serialize so exactly one
    /// observes the terminal batch transition.
    async fn finalize_evaluation(
        &self,
        scope: ScopeId,
        input: FinalizeEvaluationInput,
    ) -> AppResult<FinalizeOutcome>;

    /// Acquires the exclusive emission claim via an atomic conditional
    /// update; a live claim by another caller surfaces as
    /// [`evalia_core::AppError::AlreadyInProgress`].
    async fn claim_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<EmissionClaim>;

    /// Releases a held claim so a later retry can succeed.
    async fn release_emission_claim(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
    ) -> AppResult<()>;

    /// Moves a claimed emission into the absorbing rejected state.
    async fn reject_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        reasons: Vec<String>,
    ) -> AppResult<()>;

    /// Persists the issued report and stamps the batch emitted in one
    /// commit, fenced by the claim token.
    async fn commit_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        report: Report,
    ) -> AppResult<Report>;

    /// Returns the report for a batch.
    async fn find_report(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Report>>;

    /// Replaces an issued report, used only to record delivery.
    async fn update_report(&self, report: Report) -> AppResult<Report>;
}
