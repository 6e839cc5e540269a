use chrono::{DateTime, Utc};
use evalia_core::{AppError, AppResult, NonEmptyString, ScopeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person eligible for evaluation inside one organizational scope.
///
/// The participation index tracks the highest batch ordinal the subject has
/// completed; it is mutated only by the lifecycle service upon evaluation
/// completion or administratively via activation toggling. Subjects are
/// never deleted while referenced by historical evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    id: Uuid,
    scope: ScopeId,
    display_name: NonEmptyString,
    participation_index: u32,
    last_batch_at: Option<DateTime<Utc>>,
    active: bool,
}

impl Subject {
    /// Registers a new subject with an empty participation history.
    pub fn register(scope: ScopeId, display_name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            scope,
            display_name: NonEmptyString::new(display_name)?,
            participation_index: 0,
            last_batch_at: None,
            active: true,
        })
    }

    /// Restores a subject from persisted state.
    pub fn restore(
        id: Uuid,
        scope: ScopeId,
        display_name: impl Into<String>,
        participation_index: u32,
        last_batch_at: Option<DateTime<Utc>>,
        active: bool,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            scope,
            display_name: NonEmptyString::new(display_name)?,
            participation_index,
            last_batch_at,
            active,
        })
    }

    /// Records a completed evaluation in the batch with the given ordinal.
    ///
    /// The index is monotonic: completing an older batch after a newer one
    /// never lowers it.
    pub fn record_completion(&mut self, batch_ordinal: u32, at: DateTime<Utc>) -> AppResult<()> {
        if batch_ordinal == 0 {
            return Err(AppError::Validation(
                "batch ordinal must be greater than zero".to_owned(),
            ));
        }

        self.participation_index = self.participation_index.max(batch_ordinal);
        self.last_batch_at = Some(at);
        Ok(())
    }

    /// Toggles administrative activation.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Returns the stable subject identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning organizational scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the subject display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the highest batch ordinal completed by this subject.
    #[must_use]
    pub fn participation_index(&self) -> u32 {
        self.participation_index
    }

    /// Returns when the subject last completed an evaluation.
    #[must_use]
    pub fn last_batch_at(&self) -> Option<DateTime<Utc>> {
        self.last_batch_at
    }

    /// Returns whether the subject is considered for new batches.
    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use evalia_core::ScopeId;

    use super::Subject;

    #[test]
    fn registration_starts_with_empty_history() {
        let subject = Subject::register(ScopeId::new(), "Alice");
        assert!(subject.is_ok());
        let subject = subject.unwrap_or_else(|_| unreachable!());
        assert_eq!(subject.participation_index(), 0);
        assert!(subject.last_batch_at().is_none());
        assert!(subject.active());
    }

    #[test]
    fn completion_index_is_monotonic() {
        let subject = Subject::register(ScopeId::new(), "Alice");
        assert!(subject.is_ok());
        let mut subject = subject.unwrap_or_else(|_| unreachable!());

        assert!(subject.record_completion(3, Utc::now()).is_ok());
        assert!(subject.record_completion(2, Utc::now()).is_ok());
        assert_eq!(subject.participation_index(), 3);
    }

    #[test]
    fn completion_rejects_zero_ordinal() {
        let subject = Subject::register(ScopeId::new(), "Alice");
        assert!(subject.is_ok());
        let mut subject = subject.unwrap_or_else(|_| unreachable!());
        assert!(subject.record_completion(0, Utc::now()).is_err());
    }
}
