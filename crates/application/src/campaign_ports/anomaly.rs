use async_trait::async_trait;
use evalia_core::{AppResult, ScopeId};
use uuid::Uuid;

/// External anomaly-detection signal consulted by the
/// consecutive-invalidation guard.
///
/// A flagged subject bypasses the soft block entirely, so corrective
/// invalidations are never held up by the confirmation flow. Detection
/// criteria are an internal policy input, not defined by the engine.
#[async_trait]
pub trait AnomalySignal: Send + Sync {
    /// Returns whether the subject currently exhibits an anomalous
    /// participation pattern.
    async fn is_flagged(&self, scope: ScopeId, subject_id: Uuid) -> AppResult<bool>;
}
