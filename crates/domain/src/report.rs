use chrono::{DateTime, Utc};
use evalia_core::{AppError, AppResult, Principal, ScopeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an issued compliance report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Report produced and hashed.
    Issued,
    /// Report handed to the recipient.
    Delivered,
}

impl ReportStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Delivered => "delivered",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "issued" => Ok(Self::Issued),
            "delivered" => Ok(Self::Delivered),
            _ => Err(AppError::Validation(format!(
                "unknown report status '{value}'"
            ))),
        }
    }
}

/// The immutable compliance artifact for one completed batch.
///
/// The content hash is set exactly once at issuance and is the sole
/// authority for integrity verification; it is never recomputed from
/// storage on read. Recording delivery is the only mutation allowed after
/// issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    batch_id: Uuid,
    scope: ScopeId,
    status: ReportStatus,
    content_hash: String,
    issued_by: Principal,
    issued_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Issues a report with its content hash.
    pub fn issue(
        batch_id: Uuid,
        scope: ScopeId,
        content_hash: impl Into<String>,
        issued_by: Principal,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let content_hash = content_hash.into();
        if content_hash.len() != 64 || !content_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AppError::Validation(
                "content hash must be a 64-character hex digest".to_owned(),
            ));
        }

        Ok(Self {
            batch_id,
            scope,
            status: ReportStatus::Issued,
            content_hash,
            issued_by,
            issued_at: now,
            delivered_at: None,
        })
    }

    /// Restores a report from persisted state.
    pub fn restore(
        batch_id: Uuid,
        scope: ScopeId,
        status: ReportStatus,
        content_hash: impl Into<String>,
        issued_by: Principal,
        issued_at: DateTime<Utc>,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            batch_id,
            scope,
            status,
            content_hash: content_hash.into(),
            issued_by,
            issued_at,
            delivered_at,
        }
    }

    /// Records delivery of the issued report.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != ReportStatus::Issued {
            return Err(AppError::FailedPrecondition(format!(
                "report for batch '{}' is already '{}'",
                self.batch_id,
                self.status.as_str()
            )));
        }

        self.status = ReportStatus::Delivered;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// Returns the reported batch identifier.
    #[must_use]
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Returns the owning organizational scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the report status.
    #[must_use]
    pub fn status(&self) -> ReportStatus {
        self.status
    }

    /// Returns the hex-encoded content digest of the rendered artifact.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        self.content_hash.as_str()
    }

    /// Returns the issuing principal.
    #[must_use]
    pub fn issued_by(&self) -> Principal {
        self.issued_by
    }

    /// Returns when the report was issued.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Returns when the report was delivered.
    #[must_use]
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use evalia_core::{Principal, ScopeId};
    use uuid::Uuid;

    use super::{Report, ReportStatus};

    const HASH: &str = "a3f5b8c2d9e1f4a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0";

    #[test]
    fn issue_rejects_malformed_hash() {
        let report = Report::issue(
            Uuid::new_v4(),
            ScopeId::new(),
            "not-a-digest",
            Principal::System,
            Utc::now(),
        );
        assert!(report.is_err());
    }

    #[test]
    fn delivery_happens_at_most_once() {
        let report = Report::issue(
            Uuid::new_v4(),
            ScopeId::new(),
            HASH,
            Principal::System,
            Utc::now(),
        );
        assert!(report.is_ok());
        let mut report = report.unwrap_or_else(|_| unreachable!());

        assert!(report.mark_delivered(Utc::now()).is_ok());
        assert_eq!(report.status(), ReportStatus::Delivered);
        assert!(report.mark_delivered(Utc::now()).is_err());
    }
}
