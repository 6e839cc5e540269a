//! Domain entities and invariants for assessment campaigns.

#![forbid(unsafe_code)]

mod audit;
mod batch;
mod eligibility;
mod evaluation;
mod report;
mod scope;
mod subject;

pub use audit::AuditAction;
pub use batch::{Batch, BatchStatus, EmissionState};
pub use eligibility::{EligibilityReason, EligibleSubject, PriorityTier, rank_subjects};
pub use evaluation::{Evaluation, EvaluationStatus};
pub use report::{Report, ReportStatus};
pub use scope::ScopePolicy;
pub use subject::Subject;
