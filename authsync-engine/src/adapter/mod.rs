//! Authority source adapters
//!
//! External integrations implement [`BasicAuthoritySource`]; the tier-2
//! integration may additionally expose [`RichAuthoritySource`] through
//! [`BasicAuthoritySource::rich`]. [`AuthoritySourceAdapter`] wraps an
//! optional source and gives the engine one uniform, never-failing facade
//! per tier.

pub mod memory;

use crate::error::SourceFault;
use crate::normalize::normalize;
use authsync_common::AuthorityTier;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Capability every external authority offers: a readable list, an
/// optional change indicator and an optional push target
pub trait BasicAuthoritySource: Send + Sync {
    /// False when the integration exists but is switched off
    fn is_configured(&self) -> bool {
        true
    }

    /// Current explicit list
    ///
    /// `Ok(vec![])` means the source authoritatively holds zero entries.
    fn read_list(&self) -> Result<Vec<String>, SourceFault>;

    /// Version counter, compared only against this source's prior value
    ///
    /// Sources without one return `None`; the adapter then falls back to
    /// the count of non-blank list entries.
    fn read_change_indicator(&self) -> Option<i64> {
        None
    }

    /// Accept a list pushed down from a higher-priority tier
    ///
    /// Returns false when the source has no push target.
    fn push_list(&self, _list: &[String]) -> bool {
        false
    }

    /// Rich-authorization capability, if this source has one
    fn rich(&self) -> Option<&dyn RichAuthoritySource> {
        None
    }
}

/// Implicit rules a rich source layers beneath its explicit list
///
/// Every accessor returns `None` when the field is missing or unreadable.
pub trait RichAuthoritySource: Send + Sync {
    /// Whole session open to everyone
    fn session_unrestricted(&self) -> Option<bool>;

    /// Whether the primary controller passes implicitly
    fn primary_controller_override(&self) -> Option<bool>;

    /// Whether the session's first controller passes implicitly
    fn secondary_controller_override(&self) -> Option<bool>;

    /// Identity of the session's primary controller
    fn primary_controller(&self) -> Option<String> {
        None
    }

    /// Identity of the session's first controller
    fn first_controller(&self) -> Option<String>;
}

/// Outcome of a rich-authorization query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RichAuthorization {
    Allowed,
    Denied,
    /// Capability missing or a required field unreadable
    Unsupported,
}

/// Uniform facade over one tier's optional external integration
#[derive(Clone)]
pub struct AuthoritySourceAdapter {
    tier: AuthorityTier,
    source: Option<Arc<dyn BasicAuthoritySource>>,
}

impl std::fmt::Debug for AuthoritySourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthoritySourceAdapter")
            .field("tier", &self.tier)
            .field("present", &self.source.is_some())
            .finish()
    }
}

impl AuthoritySourceAdapter {
    pub fn new(tier: AuthorityTier, source: Option<Arc<dyn BasicAuthoritySource>>) -> Self {
        Self { tier, source }
    }

    /// Adapter for a tier with no integration wired
    pub fn unconfigured(tier: AuthorityTier) -> Self {
        Self { tier, source: None }
    }

    pub fn tier(&self) -> AuthorityTier {
        self.tier
    }

    fn configured_source(&self) -> Option<&Arc<dyn BasicAuthoritySource>> {
        self.source.as_ref().filter(|s| s.is_configured())
    }

    pub fn is_configured(&self) -> bool {
        self.configured_source().is_some()
    }

    /// Read the explicit list, degrading every fault to `None`
    ///
    /// The returned vector is owned; callers never alias source storage.
    pub fn try_read_list(&self) -> Option<Vec<String>> {
        let source = self.configured_source()?;
        match source.read_list() {
            Ok(list) => Some(list),
            Err(SourceFault::NotYetAvailable) => {
                debug!(tier = %self.tier, "Authority source not yet available");
                None
            }
            Err(SourceFault::Malformed(reason)) => {
                warn!(tier = %self.tier, %reason, "Authority source returned malformed list, treating as empty");
                None
            }
        }
    }

    /// Version counter, or the non-blank entry count when the source has none
    pub fn try_read_change_indicator(&self) -> Option<i64> {
        let source = self.configured_source()?;
        if let Some(version) = source.read_change_indicator() {
            return Some(version);
        }
        source
            .read_list()
            .ok()
            .map(|list| list.iter().filter(|s| !s.trim().is_empty()).count() as i64)
    }

    /// Push a list into this tier; no-op when unconfigured
    ///
    /// Returns true when the source accepted the list.
    pub fn push(&self, list: &[String]) -> bool {
        let Some(source) = self.configured_source() else {
            return false;
        };
        let accepted = source.push_list(list);
        if !accepted {
            trace!(tier = %self.tier, "Authority source has no push target");
        }
        accepted
    }

    fn rich_source(&self) -> Option<&dyn RichAuthoritySource> {
        if self.tier != AuthorityTier::Secondary {
            return None;
        }
        self.configured_source()?.rich()
    }

    /// True when the tier-2 rich channel can currently answer queries
    pub fn is_rich_reachable(&self) -> bool {
        self.rich_source()
            .and_then(|rich| rich.session_unrestricted())
            .is_some()
    }

    /// Evaluate the tier-2 layered rule for an already-normalized identity
    ///
    /// Layers, first match wins:
    /// 1. session-unrestricted flag
    /// 2. primary controller, when its override is on
    /// 3. first controller, when its override is on
    /// 4. membership in `explicit` (the cached normalized list)
    pub fn try_read_rich_authorization(
        &self,
        normalized_identity: &str,
        explicit: &HashSet<String>,
    ) -> RichAuthorization {
        let Some(rich) = self.rich_source() else {
            return RichAuthorization::Unsupported;
        };
        let Some(unrestricted) = rich.session_unrestricted() else {
            return RichAuthorization::Unsupported;
        };
        if unrestricted {
            return RichAuthorization::Allowed;
        }
        if normalized_identity.is_empty() {
            return RichAuthorization::Denied;
        }

        let implicit_pass = |enabled: Option<bool>, controller: Option<String>| {
            enabled == Some(true)
                && controller.is_some_and(|c| normalize(&c) == normalized_identity)
        };
        if implicit_pass(rich.primary_controller_override(), rich.primary_controller()) {
            return RichAuthorization::Allowed;
        }
        if implicit_pass(rich.secondary_controller_override(), rich.first_controller()) {
            return RichAuthorization::Allowed;
        }

        if explicit.contains(normalized_identity) {
            RichAuthorization::Allowed
        } else {
            RichAuthorization::Denied
        }
    }
}
