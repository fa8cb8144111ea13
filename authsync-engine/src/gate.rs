//! The allow/deny predicate every gated subsystem calls
//!
//! Decision order:
//! 1. Enforcement disabled: allow
//! 2. Session owner with owner override: allow
//! 3. Secondary active with a reachable rich channel: its verdict
//! 4. Normalized membership in the resolved set

use crate::adapter::{AuthoritySourceAdapter, RichAuthorization};
use crate::normalize::normalize;
use crate::resolved::ResolvedAuthorizationSet;
use authsync_common::config::EngineConfig;
use authsync_common::AuthorityTier;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationGate {
    enforcement_enabled: bool,
    owner_override: bool,
}

impl AuthorizationGate {
    pub fn new(enforcement_enabled: bool, owner_override: bool) -> Self {
        Self {
            enforcement_enabled,
            owner_override,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.enforcement_enabled, config.owner_override)
    }

    pub fn enforcement_enabled(&self) -> bool {
        self.enforcement_enabled
    }

    /// Decide whether `identity` may operate the surface
    ///
    /// `secondary` is the tier-2 adapter, consulted only while Secondary is
    /// the active tier.
    pub fn can_interact(
        &self,
        resolved: &ResolvedAuthorizationSet,
        secondary: Option<&AuthoritySourceAdapter>,
        identity: &str,
        is_session_owner: bool,
    ) -> bool {
        if !self.enforcement_enabled {
            return true;
        }
        if is_session_owner && self.owner_override {
            trace!("Session owner passes via override");
            return true;
        }

        let normalized = normalize(identity);

        if resolved.active_tier() == Some(AuthorityTier::Secondary) {
            if let Some(adapter) = secondary.filter(|a| a.is_rich_reachable()) {
                match adapter.try_read_rich_authorization(&normalized, resolved.normalized()) {
                    RichAuthorization::Allowed => return true,
                    RichAuthorization::Denied => return false,
                    // flags vanished between the reachability check and the read
                    RichAuthorization::Unsupported => {}
                }
            }
        }

        if normalized.is_empty() || resolved.is_empty() {
            return false;
        }
        resolved.contains_normalized(&normalized)
    }
}
