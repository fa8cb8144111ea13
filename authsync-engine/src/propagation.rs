//! One-directional propagation of the resolved list
//!
//! Writes go from the active tier to every configured tier strictly below
//! it. Never into the active tier, never upward, never into Manual.

use crate::adapter::AuthoritySourceAdapter;
use authsync_common::AuthorityTier;
use tracing::debug;

/// Push `list` into the configured tiers below `active`
///
/// Returns the tiers that accepted the list. Pushing an unchanged list
/// again is harmless.
pub fn propagate(
    adapters: &[AuthoritySourceAdapter],
    active: AuthorityTier,
    list: &[String],
) -> Vec<AuthorityTier> {
    let mut pushed = Vec::new();
    for target in active.lower_external() {
        let Some(adapter) = adapters.iter().find(|a| a.tier() == target) else {
            continue;
        };
        if !adapter.is_configured() {
            continue;
        }
        if adapter.push(list) {
            debug!(from = %active, to = %target, entries = list.len(), "Propagated authorization list");
            pushed.push(target);
        }
    }
    pushed
}
