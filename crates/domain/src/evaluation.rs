use chrono::{DateTime, Utc};
use evalia_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Status of one subject's evaluation within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Created at batch release, no responses yet.
    Started,
    /// At least one partial response recorded.
    InProgress,
    /// Final response recorded; terminal.
    Completed,
    /// Excluded from the batch with a recorded reason; terminal.
    Invalidated,
}

impl EvaluationStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Invalidated => "invalidated",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "started" => Ok(Self::Started),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "invalidated" => Ok(Self::Invalidated),
            _ => Err(AppError::Validation(format!(
                "unknown evaluation status '{value}'"
            ))),
        }
    }

    /// Returns whether the status is terminal.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Completed | Self::Invalidated)
    }
}

/// One subject's assessment instance within a batch.
///
/// A subject holds at most one non-invalidated evaluation per batch, and an
/// evaluation under an emitted batch is immutable; the storage adapter
/// re-validates both inside the mutating write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    id: Uuid,
    batch_id: Uuid,
    subject_id: Uuid,
    status: EvaluationStatus,
    responses: Value,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    invalidated_at: Option<DateTime<Utc>>,
    invalidation_reason: Option<String>,
    invalidation_forced: bool,
}

impl Evaluation {
    /// Creates a fresh evaluation at batch release.
    #[must_use]
    pub fn start(batch_id: Uuid, subject_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            subject_id,
            status: EvaluationStatus::Started,
            responses: Value::Object(Map::new()),
            started_at: now,
            completed_at: None,
            invalidated_at: None,
            invalidation_reason: None,
            invalidation_forced: false,
        }
    }

    /// Restores an evaluation from persisted state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        batch_id: Uuid,
        subject_id: Uuid,
        status: EvaluationStatus,
        responses: Value,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        invalidated_at: Option<DateTime<Utc>>,
        invalidation_reason: Option<String>,
        invalidation_forced: bool,
    ) -> Self {
        Self {
            id,
            batch_id,
            subject_id,
            status,
            responses,
            started_at,
            completed_at,
            invalidated_at,
            invalidation_reason,
            invalidation_forced,
        }
    }

    /// Records a partial response, moving the evaluation in progress.
    pub fn record_partial_response(&mut self, payload: Value) -> AppResult<()> {
        match self.status {
            EvaluationStatus::Started | EvaluationStatus::InProgress => {}
            status => {
                return Err(AppError::FailedPrecondition(format!(
                    "evaluation '{}' is '{}', responses can no longer change",
                    self.id,
                    status.as_str()
                )));
            }
        }

        self.merge_responses(payload)?;
        self.status = EvaluationStatus::InProgress;
        Ok(())
    }

    /// Records the final response and completes the evaluation.
    pub fn complete(&mut self, payload: Value, now: DateTime<Utc>) -> AppResult<()> {
        match self.status {
            EvaluationStatus::Started | EvaluationStatus::InProgress => {}
            status => {
                return Err(AppError::FailedPrecondition(format!(
                    "evaluation '{}' cannot be completed from status '{}'",
                    self.id,
                    status.as_str()
                )));
            }
        }

        self.merge_responses(payload)?;
        self.status = EvaluationStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Invalidates the evaluation, excluding the subject from this batch.
    pub fn invalidate(
        &mut self,
        reason: impl Into<String>,
        forced: bool,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        match self.status {
            EvaluationStatus::Started | EvaluationStatus::InProgress => {}
            status => {
                return Err(AppError::FailedPrecondition(format!(
                    "evaluation '{}' cannot be invalidated from status '{}'",
                    self.id,
                    status.as_str()
                )));
            }
        }

        let reason = NonEmptyString::new(reason)?;
        self.status = EvaluationStatus::Invalidated;
        self.invalidated_at = Some(now);
        self.invalidation_reason = Some(reason.into());
        self.invalidation_forced = forced;
        Ok(())
    }

    fn merge_responses(&mut self, payload: Value) -> AppResult<()> {
        let Value::Object(incoming) = payload else {
            return Err(AppError::Validation(
                "response payload must be a JSON object".to_owned(),
            ));
        };

        if let Value::Object(existing) = &mut self.responses {
            for (key, value) in incoming {
                existing.insert(key, value);
            }
        }

        Ok(())
    }

    /// Returns the stable evaluation identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning batch identifier.
    #[must_use]
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Returns the evaluated subject identifier.
    #[must_use]
    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> EvaluationStatus {
        self.status
    }

    /// Returns the accumulated response payload.
    #[must_use]
    pub fn responses(&self) -> &Value {
        &self.responses
    }

    /// Returns when the evaluation was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the final response was recorded.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns when the evaluation was invalidated.
    #[must_use]
    pub fn invalidated_at(&self) -> Option<DateTime<Utc>> {
        self.invalidated_at
    }

    /// Returns the recorded invalidation reason.
    #[must_use]
    pub fn invalidation_reason(&self) -> Option<&str> {
        self.invalidation_reason.as_deref()
    }

    /// Returns whether the invalidation bypassed the consecutive guard.
    #[must_use]
    pub fn invalidation_forced(&self) -> bool {
        self.invalidation_forced
    }

    /// Returns whether the evaluation reached a terminal status.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.status.is_finalized()
    }
}
