use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by the campaign engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a subject is registered in a scope.
    SubjectRegistered,
    /// Emitted when a subject's activation flag changes.
    SubjectActivationChanged,
    /// Emitted when a batch is released with its evaluations.
    BatchReleased,
    /// Emitted when a batch reaches completed.
    BatchCompleted,
    /// Emitted when a batch is cancelled with nothing to report.
    BatchCancelled,
    /// Emitted on the first partial response of an evaluation.
    EvaluationProgressed,
    /// Emitted when an evaluation receives its final response.
    EvaluationCompleted,
    /// Emitted when an evaluation is invalidated.
    EvaluationInvalidated,
    /// Emitted when an invalidation overrides the consecutive guard.
    EvaluationInvalidationForced,
    /// Emitted when the pre-emission gate rejects a batch.
    EmissionRejected,
    /// Emitted when a compliance report is issued.
    ReportIssued,
    /// Emitted when a compliance report is delivered.
    ReportDelivered,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubjectRegistered => "subject.registered",
            Self::SubjectActivationChanged => "subject.activation_changed",
            Self::BatchReleased => "batch.released",
            Self::BatchCompleted => "batch.completed",
            Self::BatchCancelled => "batch.cancelled",
            Self::EvaluationProgressed => "evaluation.progressed",
            Self::EvaluationCompleted => "evaluation.completed",
            Self::EvaluationInvalidated => "evaluation.invalidated",
            Self::EvaluationInvalidationForced => "evaluation.invalidation_forced",
            Self::EmissionRejected => "emission.rejected",
            Self::ReportIssued => "report.issued",
            Self::ReportDelivered => "report.delivered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuditAction;

    #[test]
    fn action_values_are_namespaced() {
        assert_eq!(AuditAction::BatchReleased.as_str(), "batch.released");
        assert_eq!(
            AuditAction::EvaluationInvalidationForced.as_str(),
            "evaluation.invalidation_forced"
        );
    }
}
