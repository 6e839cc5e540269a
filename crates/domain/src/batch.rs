use chrono::{DateTime, Utc};
use evalia_core::{AppError, AppResult, ScopeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of one release wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Batch assembled but not yet released.
    Draft,
    /// Batch released; evaluations are open for mutation.
    Active,
    /// Every evaluation finalized with at least one completion.
    Completed,
    /// Every evaluation invalidated with no completion; nothing to report.
    Cancelled,
}

impl BatchStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(AppError::Validation(format!(
                "unknown batch status '{value}'"
            ))),
        }
    }
}

/// Emission-coordinator state carried by one batch.
///
/// Owned exclusively by the emission coordinator; the lifecycle service
/// never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EmissionState {
    /// No emission attempted yet.
    Idle,
    /// One emission in flight, fenced by a lease token.
    Pending {
        /// Fencing token held by the claiming caller.
        token: Uuid,
        /// Lease expiry after which the claim may be re-acquired.
        lease_expires_at: DateTime<Utc>,
    },
    /// Report issued; the batch and its evaluations are immutable.
    Issued,
    /// Pre-emission gate failed; absorbing state.
    Rejected {
        /// Blocking reasons reported by the gate.
        reasons: Vec<String>,
    },
}

impl EmissionState {
    /// Returns stable storage value for the state discriminant.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
            Self::Issued => "issued",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// One release wave of evaluations for an organizational scope.
///
/// Ordinals are monotonic per scope, assigned exactly once at creation and
/// never reused, even when the batch is later cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: Uuid,
    scope: ScopeId,
    ordinal: u32,
    status: BatchStatus,
    emission: EmissionState,
    released_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    emitted_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Creates a draft batch with an allocated ordinal.
    pub fn new(scope: ScopeId, ordinal: u32) -> AppResult<Self> {
        if ordinal == 0 {
            return Err(AppError::Validation(
                "batch ordinal must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            scope,
            ordinal,
            status: BatchStatus::Draft,
            emission: EmissionState::Idle,
            released_at: None,
            completed_at: None,
            emitted_at: None,
        })
    }

    /// Restores a batch from persisted state.
    pub fn restore(
        id: Uuid,
        scope: ScopeId,
        ordinal: u32,
        status: BatchStatus,
        emission: EmissionState,
        released_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        emitted_at: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        if ordinal == 0 {
            return Err(AppError::Validation(
                "batch ordinal must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            id,
            scope,
            ordinal,
            status,
            emission,
            released_at,
            completed_at,
            emitted_at,
        })
    }

    /// Releases a draft batch after its evaluations were bulk-created.
    pub fn release(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != BatchStatus::Draft {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' cannot be released from status '{}'",
                self.id,
                self.status.as_str()
            )));
        }

        self.status = BatchStatus::Active;
        self.released_at = Some(now);
        Ok(())
    }

    /// Transitions an active batch to completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != BatchStatus::Active {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' cannot be completed from status '{}'",
                self.id,
                self.status.as_str()
            )));
        }

        self.status = BatchStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Transitions an active batch to cancelled (all evaluations excluded).
    pub fn cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != BatchStatus::Active {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' cannot be cancelled from status '{}'",
                self.id,
                self.status.as_str()
            )));
        }

        self.status = BatchStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Acquires the exclusive emission claim for this batch.
    ///
    /// Succeeds only when the batch is completed and no live claim exists;
    /// an expired lease may be re-acquired.
    pub fn claim_emission(
        &mut self,
        token: Uuid,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.status != BatchStatus::Completed {
            return Err(AppError::FailedPrecondition(format!(
                "batch '{}' is '{}', only completed batches can be emitted",
                self.id,
                self.status.as_str()
            )));
        }

        match &self.emission {
            EmissionState::Idle => {}
            EmissionState::Pending {
                lease_expires_at, ..
            } if *lease_expires_at <= now => {}
            EmissionState::Pending { .. } => {
                return Err(AppError::AlreadyInProgress(format!(
                    "emission already in flight for batch '{}'",
                    self.id
                )));
            }
            EmissionState::Issued => {
                return Err(AppError::FailedPrecondition(format!(
                    "batch '{}' already has an issued report",
                    self.id
                )));
            }
            EmissionState::Rejected { reasons } => {
                return Err(AppError::FailedPrecondition(format!(
                    "emission for batch '{}' was rejected: {}",
                    self.id,
                    reasons.join("; ")
                )));
            }
        }

        self.emission = EmissionState::Pending {
            token,
            lease_expires_at,
        };
        Ok(())
    }

    /// Releases a held claim so a later retry can succeed.
    pub fn release_emission_claim(&mut self, token: Uuid) -> AppResult<()> {
        self.take_claim(token)?;
        self.emission = EmissionState::Idle;
        Ok(())
    }

    /// Moves a claimed emission into the absorbing rejected state.
    pub fn reject_emission(&mut self, token: Uuid, reasons: Vec<String>) -> AppResult<()> {
        self.take_claim(token)?;
        self.emission = EmissionState::Rejected { reasons };
        Ok(())
    }

    /// Commits a claimed emission, stamping `emitted_at`.
    pub fn commit_emission(&mut self, token: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        self.take_claim(token)?;
        self.emission = EmissionState::Issued;
        self.emitted_at = Some(now);
        Ok(())
    }

    fn take_claim(&mut self, token: Uuid) -> AppResult<()> {
        match &self.emission {
            EmissionState::Pending { token: held, .. } if *held == token => Ok(()),
            EmissionState::Pending { .. } => Err(AppError::AlreadyInProgress(format!(
                "emission claim for batch '{}' is held by another caller",
                self.id
            ))),
            other => Err(AppError::FailedPrecondition(format!(
                "no emission claim held for batch '{}' (state '{}')",
                self.id,
                other.as_str()
            ))),
        }
    }

    /// Returns the stable batch identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning organizational scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the per-scope monotonic ordinal.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Returns the emission-coordinator state.
    #[must_use]
    pub fn emission(&self) -> &EmissionState {
        &self.emission
    }

    /// Returns when the batch was released.
    #[must_use]
    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    /// Returns when every evaluation became finalized.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns when the compliance report was issued.
    #[must_use]
    pub fn emitted_at(&self) -> Option<DateTime<Utc>> {
        self.emitted_at
    }

    /// Returns whether the batch is frozen by an issued report.
    #[must_use]
    pub fn is_emitted(&self) -> bool {
        self.emitted_at.is_some()
    }
}
