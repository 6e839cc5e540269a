use evalia_application::{EligibilityService, EmissionService, LifecycleService};

/// Shared handler state holding the wired application services.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle_service: LifecycleService,
    pub eligibility_service: EligibilityService,
    pub emission_service: EmissionService,
}
