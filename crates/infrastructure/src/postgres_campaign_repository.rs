use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evalia_application::{
    CampaignRepository, EmissionClaim, EvaluationHistoryEntry, FinalizeEvaluationInput,
    FinalizeOutcome,
};
use evalia_core::{AppError, AppResult, Principal, ScopeId};
use evalia_domain::{
    Batch, BatchStatus, EmissionState, Evaluation, EvaluationStatus, Report, ReportStatus,
    ScopePolicy, Subject,
};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

mod batches;
mod emission;
mod evaluations;
mod subjects;

const BATCH_COLUMNS: &str = r#"
    id,
    scope,
    ordinal,
    status,
    emission_state,
    emission_token,
    lease_expires_at,
    emission_reasons,
    released_at,
    completed_at,
    emitted_at
"#;

const EVALUATION_COLUMNS: &str = r#"
    id,
    batch_id,
    subject_id,
    status,
    responses,
    started_at,
    completed_at,
    invalidated_at,
    invalidation_reason,
    invalidation_forced
"#;

/// PostgreSQL-backed campaign repository.
#[derive(Clone)]
pub struct PostgresCampaignRepository {
    pool: PgPool,
}

impl PostgresCampaignRepository {
    /// Creates a campaign repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ScopePolicyRow {
    scope: Uuid,
    renewal_window_days: i32,
    overdue_grace_days: i32,
}

#[derive(Debug, FromRow)]
struct SubjectRow {
    id: Uuid,
    scope: Uuid,
    display_name: String,
    participation_index: i32,
    last_batch_at: Option<DateTime<Utc>>,
    active: bool,
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    scope: Uuid,
    ordinal: i32,
    status: String,
    emission_state: String,
    emission_token: Option<Uuid>,
    lease_expires_at: Option<DateTime<Utc>>,
    emission_reasons: Option<Value>,
    released_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    emitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct EvaluationRow {
    id: Uuid,
    batch_id: Uuid,
    subject_id: Uuid,
    status: String,
    responses: Value,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    invalidated_at: Option<DateTime<Utc>>,
    invalidation_reason: Option<String>,
    invalidation_forced: bool,
}

#[derive(Debug, FromRow)]
struct ReportRow {
    batch_id: Uuid,
    scope: Uuid,
    status: String,
    content_hash: String,
    issued_by: Uuid,
    issued_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    batch_ordinal: i32,
    batch_id: Uuid,
    status: String,
}

fn policy_from_row(row: ScopePolicyRow) -> AppResult<ScopePolicy> {
    ScopePolicy::new(
        ScopeId::from_uuid(row.scope),
        ordinal_from_db(row.renewal_window_days, "renewal_window_days")?,
        ordinal_from_db(row.overdue_grace_days, "overdue_grace_days")?,
    )
}

fn subject_from_row(row: SubjectRow) -> AppResult<Subject> {
    Subject::restore(
        row.id,
        ScopeId::from_uuid(row.scope),
        row.display_name,
        ordinal_from_db(row.participation_index, "participation_index")?,
        row.last_batch_at,
        row.active,
    )
}

fn batch_from_row(row: BatchRow) -> AppResult<Batch> {
    let emission = emission_state_from_row(&row)?;
    Batch::restore(
        row.id,
        ScopeId::from_uuid(row.scope),
        ordinal_from_db(row.ordinal, "batch ordinal")?,
        BatchStatus::parse(&row.status)?,
        emission,
        row.released_at,
        row.completed_at,
        row.emitted_at,
    )
}

fn emission_state_from_row(row: &BatchRow) -> AppResult<EmissionState> {
    match row.emission_state.as_str() {
        "idle" => Ok(EmissionState::Idle),
        "pending" => match (row.emission_token, row.lease_expires_at) {
            (Some(token), Some(lease_expires_at)) => Ok(EmissionState::Pending {
                token,
                lease_expires_at,
            }),
            _ => Err(AppError::Internal(format!(
                "batch '{}' has a pending emission without token or lease",
                row.id
            ))),
        },
        "issued" => Ok(EmissionState::Issued),
        "rejected" => {
            let reasons = match row.emission_reasons.clone() {
                Some(value) => serde_json::from_value(value).map_err(|error| {
                    AppError::Internal(format!(
                        "batch '{}' has malformed emission reasons: {error}",
                        row.id
                    ))
                })?,
                None => Vec::new(),
            };
            Ok(EmissionState::Rejected { reasons })
        }
        other => Err(AppError::Internal(format!(
            "unknown emission state '{other}' for batch '{}'",
            row.id
        ))),
    }
}

fn evaluation_from_row(row: EvaluationRow) -> AppResult<Evaluation> {
    Ok(Evaluation::restore(
        row.id,
        row.batch_id,
        row.subject_id,
        EvaluationStatus::parse(&row.status)?,
        row.responses,
        row.started_at,
        row.completed_at,
        row.invalidated_at,
        row.invalidation_reason,
        row.invalidation_forced,
    ))
}

fn report_from_row(row: ReportRow) -> AppResult<Report> {
    Ok(Report::restore(
        row.batch_id,
        ScopeId::from_uuid(row.scope),
        ReportStatus::parse(&row.status)?,
        row.content_hash,
        Principal::from_audit_id(row.issued_by),
        row.issued_at,
        row.delivered_at,
    ))
}

fn history_entry_from_row(row: HistoryRow) -> AppResult<EvaluationHistoryEntry> {
    Ok(EvaluationHistoryEntry {
        batch_ordinal: ordinal_from_db(row.batch_ordinal, "batch ordinal")?,
        batch_id: row.batch_id,
        status: EvaluationStatus::parse(&row.status)?,
    })
}

fn ordinal_from_db(value: i32, field: &str) -> AppResult<u32> {
    u32::try_from(value)
        .map_err(|error| AppError::Internal(format!("corrupt {field} value {value}: {error}")))
}

fn ordinal_to_db(value: u32, field: &str) -> AppResult<i32> {
    i32::try_from(value)
        .map_err(|error| AppError::Validation(format!("invalid {field} value {value}: {error}")))
}

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    async fn upsert_scope_policy(&self, policy: ScopePolicy) -> AppResult<()> {
        self.upsert_scope_policy_impl(policy).await
    }

    async fn find_scope_policy(&self, scope: ScopeId) -> AppResult<Option<ScopePolicy>> {
        self.find_scope_policy_impl(scope).await
    }

    async fn insert_subject(&self, subject: Subject) -> AppResult<()> {
        self.insert_subject_impl(subject).await
    }

    async fn update_subject(&self, subject: Subject) -> AppResult<Subject> {
        self.update_subject_impl(subject).await
    }

    async fn find_subject(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<Option<Subject>> {
        self.find_subject_impl(scope, subject_id).await
    }

    async fn list_subjects(&self, scope: ScopeId) -> AppResult<Vec<Subject>> {
        self.list_subjects_impl(scope).await
    }

    async fn max_batch_ordinal(&self, scope: ScopeId) -> AppResult<u32> {
        self.max_batch_ordinal_impl(scope).await
    }

    async fn create_batch(&self, batch: Batch, evaluations: Vec<Evaluation>) -> AppResult<()> {
        self.create_batch_impl(batch, evaluations).await
    }

    async fn find_batch(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Batch>> {
        self.find_batch_impl(scope, batch_id).await
    }

    async fn list_batches(&self, scope: ScopeId) -> AppResult<Vec<Batch>> {
        self.list_batches_impl(scope).await
    }

    async fn list_emittable_batches(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Batch>> {
        self.list_emittable_batches_impl(now, limit).await
    }

    async fn find_evaluation(
        &self,
        scope: ScopeId,
        evaluation_id: Uuid,
    ) -> AppResult<Option<Evaluation>> {
        self.find_evaluation_impl(scope, evaluation_id).await
    }

    async fn list_batch_evaluations(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
    ) -> AppResult<Vec<Evaluation>> {
        self.list_batch_evaluations_impl(scope, batch_id).await
    }

    async fn subject_evaluation_history(
        &self,
        scope: ScopeId,
        subject_id: Uuid,
    ) -> AppResult<Vec<EvaluationHistoryEntry>> {
        self.subject_evaluation_history_impl(scope, subject_id).await
    }

    async fn update_open_evaluation(
        &self,
        scope: ScopeId,
        evaluation: Evaluation,
    ) -> AppResult<Evaluation> {
        self.update_open_evaluation_impl(scope, evaluation).await
    }

    async fn finalize_evaluation(
        &self,
        scope: ScopeId,
        input: FinalizeEvaluationInput,
    ) -> AppResult<FinalizeOutcome> {
        self.finalize_evaluation_impl(scope, input).await
    }

    async fn claim_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<EmissionClaim> {
        self.claim_emission_impl(scope, batch_id, lease_expires_at, now)
            .await
    }

    async fn release_emission_claim(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
    ) -> AppResult<()> {
        self.release_emission_claim_impl(scope, batch_id, token).await
    }

    async fn reject_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        reasons: Vec<String>,
    ) -> AppResult<()> {
        self.reject_emission_impl(scope, batch_id, token, reasons)
            .await
    }

    async fn commit_emission(
        &self,
        scope: ScopeId,
        batch_id: Uuid,
        token: Uuid,
        report: Report,
    ) -> AppResult<Report> {
        self.commit_emission_impl(scope, batch_id, token, report)
            .await
    }

    async fn find_report(&self, scope: ScopeId, batch_id: Uuid) -> AppResult<Option<Report>> {
        self.find_report_impl(scope, batch_id).await
    }

    async fn update_report(&self, report: Report) -> AppResult<Report> {
        self.update_report_impl(report).await
    }
}
