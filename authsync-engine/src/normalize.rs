//! Identity normalization and list deduplication
//!
//! Identities are plain display names compared case-insensitively after
//! trimming. Two dedupe flavours share one key:
//! - [`dedupe_case_insensitive`] yields the normalized form, for membership
//! - [`dedupe_preserve_case`] keeps the first occurrence's trimmed casing,
//!   for propagation so downstream display names aren't rewritten

use std::collections::HashSet;

/// Trim and lower-case an identity; empty input stays empty
pub fn normalize(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Normalize, drop empties, keep first occurrence, preserve order
pub fn dedupe_case_insensitive<S: AsRef<str>>(list: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(list.len());
    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        let key = normalize(entry.as_ref());
        if key.is_empty() {
            continue;
        }
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

/// Same dedup key as [`dedupe_case_insensitive`], but returns the trimmed
/// original casing of each first occurrence
pub fn dedupe_preserve_case<S: AsRef<str>>(list: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(list.len());
    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        let trimmed = entry.as_ref().trim();
        let key = trimmed.to_lowercase();
        if key.is_empty() {
            continue;
        }
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// True if the list holds at least one non-blank entry
pub fn has_entries<S: AsRef<str>>(list: &[S]) -> bool {
    list.iter().any(|s| !s.as_ref().trim().is_empty())
}
