//! Ports consumed by the campaign services.

mod anomaly;
mod audit;
mod clock;
mod render;
mod repository;

pub use anomaly::AnomalySignal;
pub use audit::{AuditEntry, AuditRepository};
pub use clock::Clock;
pub use render::{RenderReportInput, ReportRenderer};
pub use repository::{
    BatchTransition, CampaignRepository, EmissionClaim, EvaluationHistoryEntry,
    EvaluationResolution, FinalizeEvaluationInput, FinalizeOutcome,
};
