use chrono::Duration;
use evalia_core::{AppError, AppResult, ScopeId};
use serde::{Deserialize, Serialize};

const DEFAULT_RENEWAL_WINDOW_DAYS: u32 = 365;
const DEFAULT_OVERDUE_GRACE_DAYS: u32 = 90;

/// Per-organization renewal policy consumed by the eligibility engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePolicy {
    scope: ScopeId,
    renewal_window_days: u32,
    overdue_grace_days: u32,
}

impl ScopePolicy {
    /// Creates a validated policy.
    pub fn new(
        scope: ScopeId,
        renewal_window_days: u32,
        overdue_grace_days: u32,
    ) -> AppResult<Self> {
        if renewal_window_days == 0 {
            return Err(AppError::Validation(
                "renewal_window_days must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            scope,
            renewal_window_days,
            overdue_grace_days,
        })
    }

    /// Creates the default one-year policy with a 90-day grace margin.
    #[must_use]
    pub fn with_defaults(scope: ScopeId) -> Self {
        Self {
            scope,
            renewal_window_days: DEFAULT_RENEWAL_WINDOW_DAYS,
            overdue_grace_days: DEFAULT_OVERDUE_GRACE_DAYS,
        }
    }

    /// Returns the governed scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the renewal window in days.
    #[must_use]
    pub fn renewal_window_days(&self) -> u32 {
        self.renewal_window_days
    }

    /// Returns the grace margin in days past the window before a renewal
    /// escalates from normal to high priority.
    #[must_use]
    pub fn overdue_grace_days(&self) -> u32 {
        self.overdue_grace_days
    }

    /// Returns the renewal window as a duration.
    #[must_use]
    pub fn renewal_window(&self) -> Duration {
        Duration::days(i64::from(self.renewal_window_days))
    }

    /// Returns the window plus grace margin as a duration.
    #[must_use]
    pub fn escalation_window(&self) -> Duration {
        Duration::days(i64::from(self.renewal_window_days) + i64::from(self.overdue_grace_days))
    }
}
