//! Change-indicator polling against the active tier
//!
//! External authorities offer no change notifications, so the engine polls
//! a cheap indicator instead. Only one poller runs at a time. Each arm bumps
//! a generation number; ticks carrying an older generation are ignored.

use super::{spawn_recurring, TickOutcome};
use authsync_common::AuthorityTier;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Verdict of comparing a fresh indicator with the stored baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftCheck {
    /// Indicator unreadable this tick
    Unset,
    Unchanged,
    Changed { previous: Option<i64>, current: i64 },
}

pub fn classify(baseline: Option<i64>, current: Option<i64>) -> DriftCheck {
    match current {
        None => DriftCheck::Unset,
        Some(current) if baseline == Some(current) => DriftCheck::Unchanged,
        Some(current) => DriftCheck::Changed {
            previous: baseline,
            current,
        },
    }
}

/// The single recurring drift check
#[derive(Debug)]
pub struct DriftPoller {
    interval: Duration,
    tier: Option<AuthorityTier>,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl DriftPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tier: None,
            generation: 0,
            handle: None,
        }
    }

    /// Tier currently being watched
    pub fn watched_tier(&self) -> Option<AuthorityTier> {
        self.tier
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// True if a tick from (`tier`, `generation`) still belongs to this poller
    pub fn is_current(&self, tier: AuthorityTier, generation: u64) -> bool {
        self.tier == Some(tier) && self.generation == generation
    }

    /// Watch `tier`, replacing whatever was watched before
    ///
    /// `make_tick` receives the new generation and builds the callback.
    pub fn arm<M, F>(&mut self, tier: AuthorityTier, make_tick: M) -> bool
    where
        M: FnOnce(u64) -> F,
        F: FnMut() -> TickOutcome + Send + 'static,
    {
        self.disarm();
        self.tier = Some(tier);
        debug!(tier = %tier, generation = self.generation, interval_secs = self.interval.as_secs(), "Arming drift poller");
        self.handle = spawn_recurring("drift", self.interval, make_tick(self.generation));
        if self.handle.is_none() {
            self.tier = None;
        }
        self.handle.is_some()
    }

    /// Stop watching; any in-flight tick becomes stale
    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.tier = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

impl Drop for DriftPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some(3), None), DriftCheck::Unset);
        assert_eq!(classify(None, None), DriftCheck::Unset);
        assert_eq!(classify(Some(3), Some(3)), DriftCheck::Unchanged);
        assert_eq!(
            classify(Some(3), Some(4)),
            DriftCheck::Changed {
                previous: Some(3),
                current: 4
            }
        );
        assert_eq!(
            classify(None, Some(0)),
            DriftCheck::Changed {
                previous: None,
                current: 0
            }
        );
    }

    #[test]
    fn test_disarm_invalidates_generation() {
        let mut poller = DriftPoller::new(Duration::from_secs(1));
        let generation = poller.generation;
        poller.tier = Some(AuthorityTier::Primary);
        assert!(poller.is_current(AuthorityTier::Primary, generation));

        poller.disarm();
        assert!(!poller.is_current(AuthorityTier::Primary, generation));
        assert_eq!(poller.watched_tier(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_switches_tier_and_stops_old_task() {
        let old_ticks = Arc::new(AtomicU32::new(0));
        let new_ticks = Arc::new(AtomicU32::new(0));
        let mut poller = DriftPoller::new(Duration::from_secs(10));

        let c = old_ticks.clone();
        assert!(poller.arm(AuthorityTier::Primary, move |_| move || {
            c.fetch_add(1, Ordering::SeqCst);
            TickOutcome::Continue
        }));
        let first_generation = poller.generation;

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(old_ticks.load(Ordering::SeqCst), 1);

        let c = new_ticks.clone();
        poller.arm(AuthorityTier::Secondary, move |_| move || {
            c.fetch_add(1, Ordering::SeqCst);
            TickOutcome::Continue
        });
        assert_ne!(poller.generation, first_generation);
        assert_eq!(poller.watched_tier(), Some(AuthorityTier::Secondary));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(old_ticks.load(Ordering::SeqCst), 1);
        assert_eq!(new_ticks.load(Ordering::SeqCst), 2);
        poller.disarm();
    }
}
