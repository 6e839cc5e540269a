use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::ScopePolicy;
use crate::subject::Subject;

/// Priority tier assigned to an eligible subject, lowest first so the
/// derived ordering matches urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// On-schedule renewal inside the grace margin.
    Normal,
    /// Missed exactly one prior wave.
    Medium,
    /// Never evaluated, or renewal overdue past window and grace.
    High,
    /// Missed two or more prior waves.
    Critical,
}

impl PriorityTier {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Why a subject must enter the next batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EligibilityReason {
    /// Participation index is zero.
    NeverEvaluated,
    /// Skipped one or more prior waves.
    MissedWaves {
        /// Number of waves skipped.
        missed: u32,
    },
    /// Last completion is older than window plus grace, or unrecorded.
    RenewalOverdue,
    /// Last completion is older than the renewal window but still inside
    /// the grace margin.
    RenewalDue,
}

/// One ranked entry produced by the eligibility computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleSubject {
    /// The subject to include in the batch.
    pub subject: Subject,
    /// Why the subject qualifies.
    pub reason: EligibilityReason,
    /// Assigned priority tier.
    pub tier: PriorityTier,
}

/// Ranks the subjects that must be included in the batch with the given
/// target ordinal.
///
/// Pure computation: inactive subjects are skipped, ineligible subjects are
/// omitted, and the result is ordered by descending tier, then ascending
/// participation index, then subject id, so the output is deterministic for
/// a given registry snapshot.
#[must_use]
pub fn rank_subjects(
    subjects: &[Subject],
    target_ordinal: u32,
    now: DateTime<Utc>,
    policy: &ScopePolicy,
) -> Vec<EligibleSubject> {
    let mut ranked: Vec<EligibleSubject> = subjects
        .iter()
        .filter(|subject| subject.active())
        .filter_map(|subject| classify(subject, target_ordinal, now, policy))
        .collect();

    ranked.sort_by(|left, right| {
        right
            .tier
            .cmp(&left.tier)
            .then_with(|| {
                left.subject
                    .participation_index()
                    .cmp(&right.subject.participation_index())
            })
            .then_with(|| left.subject.id().cmp(&right.subject.id()))
    });

    ranked
}

fn classify(
    subject: &Subject,
    target_ordinal: u32,
    now: DateTime<Utc>,
    policy: &ScopePolicy,
) -> Option<EligibleSubject> {
    let missed = target_ordinal
        .saturating_sub(1)
        .saturating_sub(subject.participation_index());

    if missed >= 2 {
        return Some(entry(subject, EligibilityReason::MissedWaves { missed }, PriorityTier::Critical));
    }

    if subject.participation_index() == 0 {
        return Some(entry(subject, EligibilityReason::NeverEvaluated, PriorityTier::High));
    }

    let Some(last_batch_at) = subject.last_batch_at() else {
        // Imported history without a completion date: treat as overdue.
        return Some(entry(subject, EligibilityReason::RenewalOverdue, PriorityTier::High));
    };

    let elapsed = now.signed_duration_since(last_batch_at);
    if elapsed > policy.escalation_window() {
        return Some(entry(subject, EligibilityReason::RenewalOverdue, PriorityTier::High));
    }

    if missed == 1 {
        return Some(entry(subject, EligibilityReason::MissedWaves { missed: 1 }, PriorityTier::Medium));
    }

    if elapsed >= policy.renewal_window() {
        return Some(entry(subject, EligibilityReason::RenewalDue, PriorityTier::Normal));
    }

    None
}

fn entry(subject: &Subject, reason: EligibilityReason, tier: PriorityTier) -> EligibleSubject {
    EligibleSubject {
        subject: subject.clone(),
        reason,
        tier,
    }
}
