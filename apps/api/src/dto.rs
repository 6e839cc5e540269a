use chrono::{DateTime, Utc};
use evalia_application::{BatchTransition, InvalidationOutcome, SubmitResponseOutcome};
use evalia_domain::{Batch, EligibilityReason, EligibleSubject, Evaluation, Report, Subject};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Incoming payload for subject registration.
#[derive(Debug, Deserialize)]
pub struct RegisterSubjectRequest {
    pub display_name: String,
}

/// Incoming payload for the subject activation toggle.
#[derive(Debug, Deserialize)]
pub struct SetSubjectActiveRequest {
    pub active: bool,
}

/// API representation of a subject.
#[derive(Debug, Serialize)]
pub struct SubjectResponse {
    pub id: Uuid,
    pub scope: Uuid,
    pub display_name: String,
    pub participation_index: u32,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl From<Subject> for SubjectResponse {
    fn from(subject: Subject) -> Self {
        Self {
            id: subject.id(),
            scope: subject.scope().as_uuid(),
            display_name: subject.display_name().to_owned(),
            participation_index: subject.participation_index(),
            last_batch_at: subject.last_batch_at(),
            active: subject.active(),
        }
    }
}

/// Query parameters for the eligibility preview.
#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub ordinal: u32,
}

/// One ranked entry of the eligibility preview.
#[derive(Debug, Serialize)]
pub struct EligibleSubjectResponse {
    pub subject: SubjectResponse,
    pub tier: &'static str,
    #[serde(flatten)]
    pub reason: EligibilityReason,
}

impl From<EligibleSubject> for EligibleSubjectResponse {
    fn from(entry: EligibleSubject) -> Self {
        Self {
            tier: entry.tier.as_str(),
            reason: entry.reason,
            subject: entry.subject.into(),
        }
    }
}

/// API representation of a batch.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub id: Uuid,
    pub scope: Uuid,
    pub ordinal: u32,
    pub status: &'static str,
    pub emission_state: &'static str,
    pub released_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub emitted_at: Option<DateTime<Utc>>,
}

impl From<Batch> for BatchResponse {
    fn from(batch: Batch) -> Self {
        Self {
            id: batch.id(),
            scope: batch.scope().as_uuid(),
            ordinal: batch.ordinal(),
            status: batch.status().as_str(),
            emission_state: batch.emission().as_str(),
            released_at: batch.released_at(),
            completed_at: batch.completed_at(),
            emitted_at: batch.emitted_at(),
        }
    }
}

/// API representation of an evaluation.
#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub subject_id: Uuid,
    pub status: &'static str,
    pub responses: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub invalidation_reason: Option<String>,
    pub invalidation_forced: bool,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            id: evaluation.id(),
            batch_id: evaluation.batch_id(),
            subject_id: evaluation.subject_id(),
            status: evaluation.status().as_str(),
            responses: evaluation.responses().clone(),
            started_at: evaluation.started_at(),
            completed_at: evaluation.completed_at(),
            invalidated_at: evaluation.invalidated_at(),
            invalidation_reason: evaluation
                .invalidation_reason()
                .map(ToOwned::to_owned),
            invalidation_forced: evaluation.invalidation_forced(),
        }
    }
}

/// Incoming payload for a response submission.
#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub payload: Value,
    #[serde(default)]
    pub is_final: bool,
}

/// Result of a response submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponseResponse {
    pub evaluation: EvaluationResponse,
    pub batch_transition: Option<&'static str>,
}

impl From<SubmitResponseOutcome> for SubmitResponseResponse {
    fn from(outcome: SubmitResponseOutcome) -> Self {
        Self {
            evaluation: outcome.evaluation.into(),
            batch_transition: outcome.batch_transition.map(transition_label),
        }
    }
}

/// Incoming payload for an invalidation request.
#[derive(Debug, Deserialize)]
pub struct InvalidationRequest {
    pub reason: String,
    #[serde(default)]
    pub force: bool,
}

/// Result of an invalidation request.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvalidationResponse {
    /// The evaluation was invalidated.
    Invalidated {
        evaluation: EvaluationResponse,
        batch_transition: Option<&'static str>,
    },
    /// The guard requires forced confirmation before proceeding.
    ConfirmationRequired { prior_consecutive: u32 },
}

impl From<InvalidationOutcome> for InvalidationResponse {
    fn from(outcome: InvalidationOutcome) -> Self {
        match outcome {
            InvalidationOutcome::Invalidated {
                evaluation,
                batch_transition,
            } => Self::Invalidated {
                evaluation: evaluation.into(),
                batch_transition: batch_transition.map(transition_label),
            },
            InvalidationOutcome::RequiresConfirmation { prior_consecutive } => {
                Self::ConfirmationRequired { prior_consecutive }
            }
        }
    }
}

/// API representation of an issued report.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub batch_id: Uuid,
    pub scope: Uuid,
    pub status: &'static str,
    pub content_hash: String,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            batch_id: report.batch_id(),
            scope: report.scope().as_uuid(),
            status: report.status().as_str(),
            content_hash: report.content_hash().to_owned(),
            issued_by: report.issued_by().audit_id(),
            issued_at: report.issued_at(),
            delivered_at: report.delivered_at(),
        }
    }
}

fn transition_label(transition: BatchTransition) -> &'static str {
    match transition {
        BatchTransition::Completed => "completed",
        BatchTransition::Cancelled => "cancelled",
    }
}
