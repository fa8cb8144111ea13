//! In-memory authority source
//!
//! Thread-safe reference implementation of both source traits. Hosts that
//! mirror an external list into memory can use it directly; tests and the
//! simulator use it to script arrival, drift and malformed reads.

use super::{BasicAuthoritySource, RichAuthoritySource};
use crate::error::SourceFault;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tier-2 flag values exposed through [`RichAuthoritySource`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichFlags {
    pub session_unrestricted: Option<bool>,
    pub primary_controller_override: Option<bool>,
    pub secondary_controller_override: Option<bool>,
    pub primary_controller: Option<String>,
    pub first_controller: Option<String>,
}

#[derive(Debug)]
struct MemoryState {
    enabled: bool,
    list: Option<Vec<String>>,
    malformed: Option<String>,
    versioned: bool,
    version: i64,
    accepts_push: bool,
    pushes: Vec<Vec<String>>,
    rich: Option<RichFlags>,
}

/// List held in process memory with a monotonically bumped version
#[derive(Debug)]
pub struct InMemorySource {
    state: Mutex<MemoryState>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySource {
    /// Configured source whose list has not arrived yet
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                enabled: true,
                list: None,
                malformed: None,
                versioned: true,
                version: 0,
                accepts_push: true,
                pushes: Vec::new(),
                rich: None,
            }),
        }
    }

    /// Configured source already holding `list`
    pub fn with_list<I, S>(list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = Self::new();
        source.set_list(list);
        source
    }

    /// Drop the version counter so the adapter falls back to entry counts
    pub fn without_version(mut self) -> Self {
        self.state_mut().versioned = false;
        self
    }

    /// Refuse pushes from higher tiers
    pub fn without_push_target(mut self) -> Self {
        self.state_mut().accepts_push = false;
        self
    }

    pub fn with_rich(mut self, flags: RichFlags) -> Self {
        self.state_mut().rich = Some(flags);
        self
    }

    fn state_mut(&mut self) -> &mut MemoryState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    /// Replace the list and bump the version
    pub fn set_list<I, S>(&self, list: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        state.list = Some(list.into_iter().map(Into::into).collect());
        state.malformed = None;
        state.version += 1;
    }

    /// Replace the list without touching the version
    pub fn set_list_silently<I, S>(&self, list: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        state.list = Some(list.into_iter().map(Into::into).collect());
        state.malformed = None;
    }

    /// Go back to "not yet available"
    pub fn clear_list(&self) {
        let mut state = self.lock();
        state.list = None;
        state.malformed = None;
    }

    /// Make subsequent reads fail as malformed
    pub fn set_malformed(&self, reason: impl Into<String>) {
        self.lock().malformed = Some(reason.into());
    }

    pub fn set_rich(&self, flags: Option<RichFlags>) {
        self.lock().rich = flags;
    }

    pub fn current_list(&self) -> Option<Vec<String>> {
        self.lock().list.clone()
    }

    pub fn version(&self) -> i64 {
        self.lock().version
    }

    /// Every list pushed into this source, oldest first
    pub fn pushed(&self) -> Vec<Vec<String>> {
        self.lock().pushes.clone()
    }

    fn rich_field<T>(&self, read: impl FnOnce(&RichFlags) -> Option<T>) -> Option<T> {
        self.lock().rich.as_ref().and_then(read)
    }
}

impl BasicAuthoritySource for InMemorySource {
    fn is_configured(&self) -> bool {
        self.lock().enabled
    }

    fn read_list(&self) -> Result<Vec<String>, SourceFault> {
        let state = self.lock();
        if let Some(reason) = &state.malformed {
            return Err(SourceFault::Malformed(reason.clone()));
        }
        state.list.clone().ok_or(SourceFault::NotYetAvailable)
    }

    fn read_change_indicator(&self) -> Option<i64> {
        let state = self.lock();
        (state.versioned && state.list.is_some()).then_some(state.version)
    }

    fn push_list(&self, list: &[String]) -> bool {
        let mut state = self.lock();
        if !state.accepts_push {
            return false;
        }
        state.pushes.push(list.to_vec());
        if state.list.as_deref() != Some(list) {
            state.list = Some(list.to_vec());
            state.malformed = None;
            state.version += 1;
        }
        true
    }

    fn rich(&self) -> Option<&dyn RichAuthoritySource> {
        if self.lock().rich.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl RichAuthoritySource for InMemorySource {
    fn session_unrestricted(&self) -> Option<bool> {
        self.rich_field(|f| f.session_unrestricted)
    }

    fn primary_controller_override(&self) -> Option<bool> {
        self.rich_field(|f| f.primary_controller_override)
    }

    fn secondary_controller_override(&self) -> Option<bool> {
        self.rich_field(|f| f.secondary_controller_override)
    }

    fn primary_controller(&self) -> Option<String> {
        self.rich_field(|f| f.primary_controller.clone())
    }

    fn first_controller(&self) -> Option<String> {
        self.rich_field(|f| f.first_controller.clone())
    }
}
