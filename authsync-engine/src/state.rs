//! Per-tier synchronization state

use authsync_common::AuthorityTier;
use serde::Serialize;

/// Lifecycle of one external tier's discovery
///
/// `Idle → Waiting → {Resolved | Exhausted}`; a reload resets to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncPhase {
    /// No empty read observed yet
    Idle,
    /// Configured but empty; a retry timer is in flight
    Waiting { retry_count: u32 },
    /// Supplied data
    Resolved,
    /// Retry budget used up; treated as empty
    Exhausted { attempts: u32 },
}

/// Sync state for one non-Manual tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSyncState {
    phase: SyncPhase,
    /// `None` until an indicator has been observed
    last_change_indicator: Option<i64>,
}

impl Default for SourceSyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceSyncState {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            last_change_indicator: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, SyncPhase::Waiting { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.phase, SyncPhase::Exhausted { .. })
    }

    /// Attempts made in the current (or last exhausted) waiting period
    pub fn retry_count(&self) -> u32 {
        match self.phase {
            SyncPhase::Waiting { retry_count } => retry_count,
            SyncPhase::Exhausted { attempts } => attempts,
            SyncPhase::Idle | SyncPhase::Resolved => 0,
        }
    }

    pub fn last_change_indicator(&self) -> Option<i64> {
        self.last_change_indicator
    }

    pub fn set_baseline(&mut self, indicator: Option<i64>) {
        self.last_change_indicator = indicator;
    }

    pub fn begin_waiting(&mut self) {
        self.phase = SyncPhase::Waiting { retry_count: 0 };
    }

    /// Count one retry tick; returns the new attempt number
    ///
    /// Only meaningful while waiting; returns 0 otherwise.
    pub fn record_attempt(&mut self) -> u32 {
        match &mut self.phase {
            SyncPhase::Waiting { retry_count } => {
                *retry_count += 1;
                *retry_count
            }
            _ => 0,
        }
    }

    pub fn mark_resolved(&mut self) {
        self.phase = SyncPhase::Resolved;
    }

    pub fn mark_exhausted(&mut self) {
        let attempts = self.retry_count();
        self.phase = SyncPhase::Exhausted { attempts };
    }

    /// Forget everything learned about the tier
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Lazily created sync states for the three external tiers
#[derive(Debug, Clone, Default)]
pub struct TierStates {
    states: [Option<SourceSyncState>; 3],
}

impl TierStates {
    pub fn get(&self, tier: AuthorityTier) -> Option<&SourceSyncState> {
        tier.index().and_then(|i| self.states[i].as_ref())
    }

    pub fn get_mut(&mut self, tier: AuthorityTier) -> Option<&mut SourceSyncState> {
        let i = tier.index()?;
        self.states[i].as_mut()
    }

    /// State for `tier`, created on first access; `None` for Manual
    pub fn get_or_create(&mut self, tier: AuthorityTier) -> Option<&mut SourceSyncState> {
        let i = tier.index()?;
        Some(self.states[i].get_or_insert_with(SourceSyncState::new))
    }

    /// Give every exhausted tier a fresh budget on the next pass
    pub fn reset_exhausted(&mut self) {
        for state in self.states.iter_mut().flatten() {
            if state.is_exhausted() {
                state.phase = SyncPhase::Idle;
            }
        }
    }
}
