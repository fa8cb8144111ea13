//! Priority cascade across the authority tiers
//!
//! Walks Primary → Secondary → Tertiary and stops at the first tier that
//! yields data. A configured tier that is still empty halts the walk with an
//! empty result (deny-by-default) while its retry runs; once its retries are
//! exhausted the walk falls past it. Manual is the final fallback.

use crate::adapter::AuthoritySourceAdapter;
use crate::normalize::has_entries;
use crate::state::{SyncPhase, TierStates};
use authsync_common::AuthorityTier;
use tracing::{debug, info};

/// Where one walk of the cascade ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeDecision {
    /// `tier` supplied `list` (raw, not yet normalized)
    ///
    /// `indicator` was sampled before `list` was read, so a write landing
    /// between the two reads shows up as drift on the next poll.
    Active {
        tier: AuthorityTier,
        list: Vec<String>,
        indicator: Option<i64>,
    },
    /// `tier` is configured but empty; `arm_retry` when no retry is running yet
    Pending { tier: AuthorityTier, arm_retry: bool },
}

/// Adapters for the three external tiers plus the static Manual list
#[derive(Debug, Clone)]
pub struct SourceResolver {
    adapters: [AuthoritySourceAdapter; 3],
    manual_list: Vec<String>,
}

impl SourceResolver {
    pub fn new(
        primary: AuthoritySourceAdapter,
        secondary: AuthoritySourceAdapter,
        tertiary: AuthoritySourceAdapter,
        manual_list: Vec<String>,
    ) -> Self {
        Self {
            adapters: [primary, secondary, tertiary],
            manual_list,
        }
    }

    /// Adapter for an external tier; `None` for Manual
    pub fn adapter(&self, tier: AuthorityTier) -> Option<&AuthoritySourceAdapter> {
        tier.index().map(|i| &self.adapters[i])
    }

    pub fn adapters(&self) -> &[AuthoritySourceAdapter] {
        &self.adapters
    }

    /// True when any external tier is configured
    pub fn any_configured(&self) -> bool {
        self.adapters.iter().any(AuthoritySourceAdapter::is_configured)
    }

    /// Does `adapter` currently have data that makes it the active tier?
    ///
    /// A non-blank list always counts; Secondary also counts when its rich
    /// channel is reachable, even with an empty list. The change indicator
    /// is read first and returned alongside the list.
    pub fn tier_has_data(adapter: &AuthoritySourceAdapter) -> Option<(Vec<String>, Option<i64>)> {
        let indicator = adapter.try_read_change_indicator();
        let list = adapter.try_read_list();
        match list {
            Some(list) if has_entries(&list) => Some((list, indicator)),
            other if adapter.is_rich_reachable() => Some((other.unwrap_or_default(), indicator)),
            _ => None,
        }
    }

    /// Walk the cascade once, updating per-tier phases
    ///
    /// With `can_schedule` false no retry can run, so an empty tier is
    /// marked exhausted on the spot and the walk continues past it.
    pub fn walk(&self, states: &mut TierStates, can_schedule: bool) -> CascadeDecision {
        for adapter in &self.adapters {
            let tier = adapter.tier();
            if !adapter.is_configured() {
                continue;
            }
            let Some(state) = states.get_or_create(tier) else {
                continue;
            };

            if let Some((list, indicator)) = Self::tier_has_data(adapter) {
                if !matches!(state.phase(), SyncPhase::Resolved) {
                    debug!(tier = %tier, "Tier supplied data");
                }
                state.mark_resolved();
                return CascadeDecision::Active {
                    tier,
                    list,
                    indicator,
                };
            }

            match state.phase() {
                SyncPhase::Waiting { .. } => {
                    return CascadeDecision::Pending {
                        tier,
                        arm_retry: false,
                    };
                }
                SyncPhase::Exhausted { .. } => {
                    debug!(tier = %tier, "Skipping exhausted tier");
                    continue;
                }
                SyncPhase::Idle | SyncPhase::Resolved => {
                    if !can_schedule {
                        info!(tier = %tier, "Tier empty and no scheduler available, treating as exhausted");
                        state.mark_exhausted();
                        continue;
                    }
                    state.begin_waiting();
                    return CascadeDecision::Pending {
                        tier,
                        arm_retry: true,
                    };
                }
            }
        }

        CascadeDecision::Active {
            tier: AuthorityTier::Manual,
            list: self.manual_list.clone(),
            indicator: None,
        }
    }
}
