//! Bounded-retry discovery for a configured tier that has no data yet
//!
//! **Algorithm (per tick):**
//! 1. Ignore the tick unless the tier is still waiting
//! 2. Count the attempt and re-read the tier
//! 3. Data present: resolved, stop
//! 4. Still empty, attempts < budget: wait another fixed delay
//! 5. Still empty, budget used: exhausted, stop

use super::{spawn_recurring, TickOutcome};
use crate::state::SourceSyncState;
use authsync_common::config::RetryBudget;
use authsync_common::AuthorityTier;
use tokio::task::JoinHandle;
use tracing::debug;

/// Result of applying one retry tick to a tier's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Tier no longer waiting; the timer outlived its purpose
    Stale,
    /// Data arrived on this attempt
    Resolved { attempt: u32 },
    /// Still empty; another tick is due
    Again { attempt: u32 },
    /// Budget used up
    Exhausted { attempts: u32 },
}

impl RetryStep {
    pub fn outcome(self) -> TickOutcome {
        match self {
            RetryStep::Again { .. } => TickOutcome::Continue,
            RetryStep::Stale | RetryStep::Resolved { .. } | RetryStep::Exhausted { .. } => {
                TickOutcome::Stop
            }
        }
    }
}

/// Apply one tick to `state`; `has_data` is the fresh read's verdict
pub fn apply_retry_tick(state: &mut SourceSyncState, budget: RetryBudget, has_data: bool) -> RetryStep {
    if !state.is_waiting() {
        return RetryStep::Stale;
    }
    let attempt = state.record_attempt();
    if has_data {
        state.mark_resolved();
        RetryStep::Resolved { attempt }
    } else if attempt < budget.max_attempts {
        RetryStep::Again { attempt }
    } else {
        state.mark_exhausted();
        RetryStep::Exhausted { attempts: attempt }
    }
}

/// Owns the single in-flight retry timer of one tier
#[derive(Debug)]
pub struct RetryScheduler {
    tier: AuthorityTier,
    budget: RetryBudget,
    handle: Option<JoinHandle<()>>,
}

impl RetryScheduler {
    pub fn new(tier: AuthorityTier, budget: RetryBudget) -> Self {
        Self {
            tier,
            budget,
            handle: None,
        }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn in_flight(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the retry timer, replacing any previous one
    ///
    /// Returns false when no runtime could take the timer.
    pub fn arm<F>(&mut self, on_tick: F) -> bool
    where
        F: FnMut() -> TickOutcome + Send + 'static,
    {
        self.cancel();
        debug!(
            tier = %self.tier,
            max_attempts = self.budget.max_attempts,
            delay_ms = self.budget.delay_ms,
            "Arming retry timer"
        );
        self.handle = spawn_recurring("retry", self.budget.delay(), on_tick);
        self.handle.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
