use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use evalia_core::{AppError, AppResult, Principal, ScopeId};
use evalia_domain::{
    AuditAction, Batch, Evaluation, EvaluationStatus, Report, rank_subjects,
};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::campaign_ports::{
    AuditEntry, AuditRepository, CampaignRepository, Clock, EmissionClaim, RenderReportInput,
    ReportRenderer,
};

/// Emission coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmissionConfig {
    /// Claim lease duration; an expired lease may be re-acquired.
    pub lease_seconds: u32,
    /// Upper bound on artifact rendering time.
    pub render_timeout: Duration,
    /// Invalidation ratio (percent) above which a warning is surfaced.
    pub invalidation_warning_percent: u32,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            lease_seconds: 120,
            render_timeout: Duration::from_secs(30),
            invalidation_warning_percent: 30,
        }
    }
}

/// Pre-emission gate verdict.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmissionValidation {
    /// Conditions that block emission.
    pub blocking: Vec<String>,
    /// Conditions surfaced but not blocking.
    pub warnings: Vec<String>,
}

impl EmissionValidation {
    /// Returns whether emission may proceed.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.blocking.is_empty()
    }
}

/// Bounded exponential backoff schedule for retryable emission failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmissionRetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl EmissionRetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Returns the delay before the given 1-based attempt, or `None` when
    /// attempts are exhausted. The first attempt runs immediately.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        if attempt == 1 {
            return Some(Duration::ZERO);
        }

        let exponent = attempt.saturating_sub(2).min(16);
        let delay = self.base_delay.saturating_mul(2_u32.saturating_pow(exponent));
        Some(delay.min(self.max_delay))
    }

    /// Returns the bounded attempt count.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for EmissionRetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Drives exactly-once production of the compliance report for completed
/// batches and enforces immutability afterward.
#[derive(Clone)]
pub struct EmissionService {
    repository: Arc<dyn CampaignRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    renderer: Arc<dyn ReportRenderer>,
    clock: Arc<dyn Clock>,
    config: EmissionConfig,
}

impl EmissionService {
    /// Creates an emission service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        audit_repository: Arc<dyn AuditRepository>,
        renderer: Arc<dyn ReportRenderer>,
        clock: Arc<dyn Clock>,
        config: EmissionConfig,
    ) -> Self {
        Self {
            repository,
            audit_repository,
            renderer,
            clock,
            config,
        }
    }

    /// Requests emission of the compliance report for a batch.
    ///
    /// Idempotent: an already issued report is returned unchanged, with the
    /// original hash and issuance timestamp. Losing the claim race yields
    /// [`AppError::AlreadyInProgress`]; the winner's result is
    /// authoritative and the loser should poll rather than retry in a
    /// tight loop.
    pub async fn request_emission(
        &self,
        principal: &Principal,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Report> {
        if let Some(report) = self.repository.find_report(scope, batch_id).await? {
            return Ok(report);
        }

        let now = self.clock.now();
        let lease_expires_at = now + ChronoDuration::seconds(i64::from(self.config.lease_seconds));
        let claim = self
            .repository
            .claim_emission(scope, batch_id, lease_expires_at, now)
            .await?;

        // The gate re-runs under the claim: the pre-claim state may be
        // stale by the time the claim is held.
        let evaluations = self
            .repository
            .list_batch_evaluations(scope, batch_id)
            .await?;
        let validation = self.validate_claimed(&claim.batch, &evaluations).await?;

        for warning in &validation.warnings {
            warn!(scope = %scope, batch_id = %batch_id, warning, "emission warning");
        }

        if !validation.is_passing() {
            self.repository
                .reject_emission(scope, batch_id, claim.token, validation.blocking.clone())
                .await?;
            self.append_audit(
                principal,
                scope,
                AuditAction::EmissionRejected,
                batch_id,
                serde_json::json!({ "blocking": validation.blocking }),
            )
            .await?;
            return Err(AppError::FailedPrecondition(format!(
                "emission rejected for batch '{batch_id}': {}",
                validation.blocking.join("; ")
            )));
        }

        let completed_evaluations: Vec<Evaluation> = evaluations
            .into_iter()
            .filter(|evaluation| evaluation.status() == EvaluationStatus::Completed)
            .collect();

        let rendered = self
            .renderer
            .render(
                RenderReportInput {
                    batch: claim.batch.clone(),
                    completed_evaluations,
                },
                self.config.render_timeout,
            )
            .await;

        let bytes = match rendered {
            Ok(bytes) => bytes,
            Err(error) => return Err(self.release_after_failure(scope, &claim, error).await),
        };

        let content_hash = hex::encode(Sha256::digest(&bytes));
        let report = Report::issue(batch_id, scope, content_hash, *principal, self.clock.now())?;
        let report = self
            .repository
            .commit_emission(scope, batch_id, claim.token, report)
            .await?;

        info!(
            scope = %scope,
            batch_id = %batch_id,
            content_hash = report.content_hash(),
            "compliance report issued"
        );

        self.append_audit(
            principal,
            scope,
            AuditAction::ReportIssued,
            batch_id,
            serde_json::json!({
                "content_hash": report.content_hash(),
                "issued_at": report.issued_at(),
            }),
        )
        .await?;

        Ok(report)
    }

    /// Runs the pre-emission gate for a batch without claiming it.
    pub async fn validate_for_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<EmissionValidation> {
        let Some(batch) = self.repository.find_batch(scope, batch_id).await? else {
            return Err(AppError::NotFound(format!(
                "batch '{batch_id}' not found in scope '{scope}'"
            )));
        };

        let evaluations = self
            .repository
            .list_batch_evaluations(scope, batch_id)
            .await?;
        self.validate_claimed(&batch, &evaluations).await
    }

    /// Records delivery of an issued report.
    pub async fn mark_delivered(
        &self,
        principal: &Principal,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Report> {
        let Some(mut report) = self.repository.find_report(scope, batch_id).await? else {
            return Err(AppError::NotFound(format!(
                "no report issued for batch '{batch_id}' in scope '{scope}'"
            )));
        };

        report.mark_delivered(self.clock.now())?;
        let report = self.repository.update_report(report).await?;
        self.append_audit(
            principal,
            scope,
            AuditAction::ReportDelivered,
            batch_id,
            serde_json::json!({ "delivered_at": report.delivered_at() }),
        )
        .await?;

        Ok(report)
    }

    /// Lists batches ready for emission, for worker polling.
    pub async fn list_emittable_batches(&self, limit: usize) -> AppResult<Vec<Batch>> {
        self.repository
            .list_emittable_batches(self.clock.now(), limit)
            .await
    }

    async fn validate_claimed(
        &self,
        batch: &Batch,
        evaluations: &[Evaluation],
    ) -> AppResult<EmissionValidation> {
        let mut validation = EmissionValidation::default();

        let total = evaluations.len();
        let completed = evaluations
            .iter()
            .filter(|evaluation| evaluation.status() == EvaluationStatus::Completed)
            .count();
        let invalidated = evaluations
            .iter()
            .filter(|evaluation| evaluation.status() == EvaluationStatus::Invalidated)
            .count();

        if completed == 0 {
            validation
                .blocking
                .push("batch has no completed evaluations".to_owned());
        }

        // Data-integrity guard: eligible subjects without any evaluation
        // record in this batch were silently dropped at release time. A
        // subject whose entire history postdates the wave was registered
        // after release and belongs to the next wave, so their absence is
        // surfaced but never blocks.
        if let Some(policy) = self.repository.find_scope_policy(batch.scope()).await? {
            let subjects = self.repository.list_subjects(batch.scope()).await?;
            let eligible = rank_subjects(&subjects, batch.ordinal(), self.clock.now(), &policy);
            for entry in eligible {
                let has_record = evaluations
                    .iter()
                    .any(|evaluation| evaluation.subject_id() == entry.subject.id());
                if has_record {
                    continue;
                }

                let history = self
                    .repository
                    .subject_evaluation_history(batch.scope(), entry.subject.id())
                    .await?;
                let predates_wave = history
                    .iter()
                    .any(|past| past.batch_ordinal < batch.ordinal());
                if predates_wave {
                    validation.blocking.push(format!(
                        "eligible subject '{}' has no evaluation record in batch ordinal {}",
                        entry.subject.id(),
                        batch.ordinal()
                    ));
                } else {
                    validation.warnings.push(format!(
                        "subject '{}' registered after batch ordinal {} was released; deferred to the next wave",
                        entry.subject.id(),
                        batch.ordinal()
                    ));
                }
            }
        }

        if total > 0 {
            let ratio_percent = invalidated * 100 / total;
            if ratio_percent > self.config.invalidation_warning_percent as usize {
                validation.warnings.push(format!(
                    "invalidation ratio {ratio_percent}% exceeds {}% of total evaluations",
                    self.config.invalidation_warning_percent
                ));
            }
        }

        Ok(validation)
    }

    async fn release_after_failure(
        &self,
        scope: ScopeId,
        claim: &EmissionClaim,
        error: AppError,
    ) -> AppError {
        let batch_id = claim.batch.id();
        if let Err(release_error) = self
            .repository
            .release_emission_claim(scope, batch_id, claim.token)
            .await
        {
            return AppError::Internal(format!(
                "artifact rendering failed for batch '{batch_id}': {error}; additionally failed to release emission claim: {release_error}"
            ));
        }

        AppError::Internal(format!(
            "artifact rendering failed for batch '{batch_id}': {error}"
        ))
    }

    async fn append_audit(
        &self,
        principal: &Principal,
        scope: ScopeId,
        action: AuditAction,
        batch_id: Uuid,
        after: serde_json::Value,
    ) -> AppResult<()> {
        self.audit_repository
            .append_entry(AuditEntry {
                scope,
                principal: *principal,
                action,
                resource_type: "report".to_owned(),
                resource_id: batch_id.to_string(),
                before: None,
                after: Some(after),
                recorded_at: self.clock.now(),
            })
            .await
    }
}
