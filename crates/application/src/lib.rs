//! Application services and ports for the campaign engine.

#![forbid(unsafe_code)]

mod campaign_ports;
mod eligibility_service;
mod emission_service;
mod lifecycle_service;

#[cfg(test)]
mod test_support;

pub use campaign_ports::{
    AnomalySignal, AuditEntry, AuditRepository, BatchTransition, CampaignRepository, Clock,
    EmissionClaim, EvaluationHistoryEntry, EvaluationResolution, FinalizeEvaluationInput,
    FinalizeOutcome, RenderReportInput, ReportRenderer,
};
pub use eligibility_service::EligibilityService;
pub use emission_service::{
    EmissionConfig, EmissionRetryPolicy, EmissionService, EmissionValidation,
};
pub use lifecycle_service::{
    InvalidationCheck, InvalidationOutcome, LifecycleService, SubmitResponseOutcome,
};
