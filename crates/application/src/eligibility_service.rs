use std::sync::Arc;

use evalia_core::{AppError, AppResult, ScopeId};
use evalia_domain::{EligibleSubject, rank_subjects};

use crate::campaign_ports::{CampaignRepository, Clock};

/// Pure read computation deciding who must enter the next batch.
#[derive(Clone)]
pub struct EligibilityService {
    repository: Arc<dyn CampaignRepository>,
    clock: Arc<dyn Clock>,
}

impl EligibilityService {
    /// Creates an eligibility service.
    #[must_use]
    pub fn new(repository: Arc<dyn CampaignRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Computes the ordered eligible set for the batch being formed.
    ///
    /// The target ordinal must be the next unused ordinal for the scope;
    /// a stale ordinal is rejected so sequencing can neither gap nor
    /// overlap. An empty result is not an error — the caller decides
    /// whether an empty batch is a failure.
    pub async fn compute_eligible(
        &self,
        scope: ScopeId,
        target_ordinal: u32,
    ) -> AppResult<Vec<EligibleSubject>> {
        let Some(policy) = self.repository.find_scope_policy(scope).await? else {
            return Err(AppError::NotFound(format!("unknown scope '{scope}'")));
        };

        let next_ordinal = self.repository.max_batch_ordinal(scope).await? + 1;
        if target_ordinal != next_ordinal {
            return Err(AppError::Validation(format!(
                "target ordinal {target_ordinal} is stale; the next ordinal for scope '{scope}' is {next_ordinal}"
            )));
        }

        let subjects = self.repository.list_subjects(scope).await?;
        Ok(rank_subjects(
            &subjects,
            target_ordinal,
            self.clock.now(),
            &policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evalia_core::{AppError, ScopeId};
    use evalia_domain::{PriorityTier, ScopePolicy, Subject};

    use super::EligibilityService;
    use crate::test_support::{FakeCampaignRepository, FixedClock};

    fn service(repository: Arc<FakeCampaignRepository>) -> EligibilityService {
        EligibilityService::new(repository, Arc::new(FixedClock::default()))
    }

    #[tokio::test]
    async fn unknown_scope_is_not_found() {
        let repository = Arc::new(FakeCampaignRepository::default());
        let result = service(repository).compute_eligible(ScopeId::new(), 1).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn stale_ordinal_is_rejected() {
        let scope = ScopeId::new();
        let repository = Arc::new(FakeCampaignRepository::default());
        repository.seed_policy(ScopePolicy::with_defaults(scope)).await;

        let result = service(repository).compute_eligible(scope, 2).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_list() {
        let scope = ScopeId::new();
        let repository = Arc::new(FakeCampaignRepository::default());
        repository.seed_policy(ScopePolicy::with_defaults(scope)).await;

        let eligible = service(repository).compute_eligible(scope, 1).await;
        assert!(eligible.is_ok());
        assert!(eligible.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn fresh_registry_ranks_everyone_high() {
        let scope = ScopeId::new();
        let repository = Arc::new(FakeCampaignRepository::default());
        repository.seed_policy(ScopePolicy::with_defaults(scope)).await;
        for name in ["Alice", "Bob"] {
            let subject = Subject::register(scope, name);
            assert!(subject.is_ok());
            repository
                .seed_subject(subject.unwrap_or_else(|_| unreachable!()))
                .await;
        }

        let eligible = service(repository).compute_eligible(scope, 1).await;
        assert!(eligible.is_ok());
        let eligible = eligible.unwrap_or_default();
        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|entry| entry.tier == PriorityTier::High));
    }
}
