//! The resolved authorization set

use crate::normalize::{dedupe_case_insensitive, dedupe_preserve_case};
use authsync_common::AuthorityTier;
use serde::Serialize;
use std::collections::HashSet;

/// Effective identity list after one resolution pass
///
/// Built wholesale by each pass and published as an immutable value. Holds
/// the normalized set for membership tests and the case-preserving list for
/// propagation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedAuthorizationSet {
    active_tier: Option<AuthorityTier>,
    pending_tier: Option<AuthorityTier>,
    #[serde(skip)]
    normalized: HashSet<String>,
    display: Vec<String>,
}

impl ResolvedAuthorizationSet {
    /// Set supplied by `tier`
    pub fn from_list<S: AsRef<str>>(tier: AuthorityTier, list: &[S]) -> Self {
        Self {
            active_tier: Some(tier),
            pending_tier: None,
            normalized: dedupe_case_insensitive(list).into_iter().collect(),
            display: dedupe_preserve_case(list),
        }
    }

    /// Empty set while `tier` is still being waited on
    pub fn pending(tier: AuthorityTier) -> Self {
        Self {
            active_tier: None,
            pending_tier: Some(tier),
            normalized: HashSet::new(),
            display: Vec::new(),
        }
    }

    pub fn active_tier(&self) -> Option<AuthorityTier> {
        self.active_tier
    }

    pub fn pending_tier(&self) -> Option<AuthorityTier> {
        self.pending_tier
    }

    /// Membership test for an already-normalized identity
    pub fn contains_normalized(&self, identity: &str) -> bool {
        self.normalized.contains(identity)
    }

    pub fn normalized(&self) -> &HashSet<String> {
        &self.normalized
    }

    /// Case-preserving list, in first-occurrence order
    pub fn display_list(&self) -> &[String] {
        &self.display
    }

    /// Normalized members in sorted order
    pub fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self.normalized.iter().cloned().collect();
        members.sort();
        members
    }

    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// True when dependents would observe a difference
    pub fn differs_from(&self, other: &Self) -> bool {
        self.active_tier != other.active_tier
            || self.pending_tier != other.pending_tier
            || self.normalized != other.normalized
            || self.display != other.display
    }
}
