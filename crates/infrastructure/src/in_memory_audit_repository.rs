use async_trait::async_trait;
use evalia_application::{AuditEntry, AuditRepository};
use evalia_core::AppResult;
use tokio::sync::Mutex;
use tracing::info;

/// In-memory append-only audit sink used in development mode.
#[derive(Default)]
pub struct InMemoryAuditRepository {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append_entry(&self, entry: AuditEntry) -> AppResult<()> {
        info!(
            scope = %entry.scope,
            action = entry.action.as_str(),
            resource_type = %entry.resource_type,
            resource_id = %entry.resource_id,
            "audit entry recorded"
        );
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
