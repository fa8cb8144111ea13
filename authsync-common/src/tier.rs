//! Authority tier ordering

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority level of an authorization source
///
/// Declaration order is priority order: `Primary` is the highest,
/// `Manual` (the static fallback list) the lowest. `Ord` follows that
/// order, so `a < b` means "a outranks b".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityTier {
    Primary,
    Secondary,
    Tertiary,
    Manual,
}

impl AuthorityTier {
    /// Tiers backed by an external integration, highest priority first
    pub const EXTERNAL: [AuthorityTier; 3] = [
        AuthorityTier::Primary,
        AuthorityTier::Secondary,
        AuthorityTier::Tertiary,
    ];

    /// True for the three integration-backed tiers
    pub fn is_external(self) -> bool {
        self != AuthorityTier::Manual
    }

    /// External tiers strictly below `self`, in priority order
    ///
    /// Empty for `Manual` and for `Tertiary`.
    pub fn lower_external(self) -> impl Iterator<Item = AuthorityTier> {
        Self::EXTERNAL.into_iter().filter(move |t| *t > self)
    }

    /// Index into per-tier arrays (`EXTERNAL` order); `None` for `Manual`
    pub fn index(self) -> Option<usize> {
        match self {
            AuthorityTier::Primary => Some(0),
            AuthorityTier::Secondary => Some(1),
            AuthorityTier::Tertiary => Some(2),
            AuthorityTier::Manual => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityTier::Primary => "primary",
            AuthorityTier::Secondary => "secondary",
            AuthorityTier::Tertiary => "tertiary",
            AuthorityTier::Manual => "manual",
        }
    }
}

impl fmt::Display for AuthorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
