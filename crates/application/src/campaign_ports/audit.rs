use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evalia_core::{AppResult, Principal, ScopeId};
use evalia_domain::AuditAction;
use serde_json::Value;

/// Immutable audit event emitted for every accepted state transition and
/// privileged action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    /// Scope the transition belongs to.
    pub scope: ScopeId,
    /// Acting principal; automated transitions carry the system sentinel.
    pub principal: Principal,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Snapshot of the resource before the transition.
    pub before: Option<Value>,
    /// Snapshot of the resource after the transition.
    pub after: Option<Value>,
    /// When the transition was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Port for the append-only audit sink.
///
/// Appends are safe for unsynchronized concurrent use; entries are never
/// updated or deleted.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit entry.
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()>;
}
