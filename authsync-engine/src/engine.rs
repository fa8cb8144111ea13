//! Authorization engine
//!
//! Owns the per-tier sync state, the retry timers, the drift poller and the
//! published resolved set. Every trigger (startup, retry tick, drift tick,
//! host refresh) runs one full resolution pass while holding the state lock,
//! so passes never interleave. The gate reads the published set without
//! touching that lock.
//!
//! # Examples
//!
//! ```
//! use authsync_common::config::EngineConfig;
//! use authsync_engine::AuthorizationEngine;
//!
//! let mut config = EngineConfig::default();
//! config.manual_list = vec!["Alice".to_string(), "bob ".to_string()];
//!
//! let engine = AuthorizationEngine::builder(config).build().unwrap();
//! engine.start();
//!
//! assert!(engine.can_interact("BOB", false));
//! assert!(!engine.can_interact("carol", false));
//! ```

use crate::adapter::{AuthoritySourceAdapter, BasicAuthoritySource};
use crate::gate::AuthorizationGate;
use crate::propagation::propagate;
use crate::resolved::ResolvedAuthorizationSet;
use crate::resolver::{CascadeDecision, SourceResolver};
use crate::schedule::drift::classify;
use crate::schedule::retry::apply_retry_tick;
use crate::schedule::{runtime_available, DriftCheck, DriftPoller, RetryScheduler, RetryStep, TickOutcome};
use crate::session::SessionContext;
use crate::state::{SourceSyncState, TierStates};
use authsync_common::config::{EngineConfig, RetryBudgets};
use authsync_common::events::{AuthEvent, EventBus};
use authsync_common::{time, AuthorityTier};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Builder wiring optional sources and a session into an engine
pub struct AuthorizationEngineBuilder {
    config: EngineConfig,
    primary: Option<Arc<dyn BasicAuthoritySource>>,
    secondary: Option<Arc<dyn BasicAuthoritySource>>,
    tertiary: Option<Arc<dyn BasicAuthoritySource>>,
    session: Option<Arc<dyn SessionContext>>,
}

impl AuthorizationEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            primary: None,
            secondary: None,
            tertiary: None,
            session: None,
        }
    }

    pub fn primary(mut self, source: Arc<dyn BasicAuthoritySource>) -> Self {
        self.primary = Some(source);
        self
    }

    pub fn secondary(mut self, source: Arc<dyn BasicAuthoritySource>) -> Self {
        self.secondary = Some(source);
        self
    }

    pub fn tertiary(mut self, source: Arc<dyn BasicAuthoritySource>) -> Self {
        self.tertiary = Some(source);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionContext>) -> Self {
        self.session = Some(session);
        self
    }

    /// Validate the configuration and assemble the engine
    ///
    /// Nothing is read from the sources until [`AuthorizationEngine::start`].
    pub fn build(self) -> authsync_common::Result<AuthorizationEngine> {
        self.config.validate()?;

        let resolver = SourceResolver::new(
            AuthoritySourceAdapter::new(AuthorityTier::Primary, self.primary),
            AuthoritySourceAdapter::new(AuthorityTier::Secondary, self.secondary),
            AuthoritySourceAdapter::new(AuthorityTier::Tertiary, self.tertiary),
            self.config.manual_list.clone(),
        );
        let budgets = self.config.retry.clone();
        let retries = [
            RetryScheduler::new(AuthorityTier::Primary, budgets.primary),
            RetryScheduler::new(AuthorityTier::Secondary, budgets.secondary),
            RetryScheduler::new(AuthorityTier::Tertiary, budgets.tertiary),
        ];
        let poller = DriftPoller::new(self.config.drift_poll_interval());
        let gate = AuthorizationGate::from_config(&self.config);
        let events = EventBus::new(self.config.event_bus_capacity);
        let session = self.session;

        let inner = Arc::new_cyclic(|me| EngineInner {
            me: me.clone(),
            resolver,
            gate,
            budgets,
            events,
            session,
            state: Mutex::new(EngineState {
                tiers: TierStates::default(),
                retries,
                poller,
                passes: 0,
                refresh_pending: false,
            }),
            resolved: RwLock::new(Arc::new(ResolvedAuthorizationSet::default())),
        });

        Ok(AuthorizationEngine { inner })
    }
}

/// Handle to one participant's authorization engine
///
/// Cheap to clone. Timers hold only a weak reference, so dropping the last
/// handle ends them.
#[derive(Clone)]
pub struct AuthorizationEngine {
    inner: Arc<EngineInner>,
}

impl AuthorizationEngine {
    pub fn builder(config: EngineConfig) -> AuthorizationEngineBuilder {
        AuthorizationEngineBuilder::new(config)
    }

    /// Run the first resolution pass
    ///
    /// Timers need a tokio runtime; without one, empty tiers are treated as
    /// exhausted immediately and no drift polling happens.
    pub fn start(&self) {
        info!(
            any_external = self.inner.resolver.any_configured(),
            enforcement = self.inner.gate.enforcement_enabled(),
            "Starting authorization engine"
        );
        self.resolve();
    }

    /// Run one full resolution pass now
    pub fn resolve(&self) {
        let mut state = self.inner.lock_state();
        self.inner.resolve_locked(&mut state);
        self.inner.release(state);
    }

    /// Host-forced pass that also gives exhausted tiers a fresh retry budget
    pub fn refresh(&self) {
        let mut state = self.inner.lock_state();
        state.tiers.reset_exhausted();
        self.inner.resolve_locked(&mut state);
        self.inner.release(state);
    }

    /// The host reloaded `tier`'s data: forget its sync state and re-resolve
    pub fn notify_source_reloaded(&self, tier: AuthorityTier) {
        let mut state = self.inner.lock_state();
        if let Some(sync) = state.tiers.get_mut(tier) {
            sync.reset();
        }
        if let Some(i) = tier.index() {
            state.retries[i].cancel();
        }
        debug!(tier = %tier, "Source reloaded");
        self.inner.resolve_locked(&mut state);
        self.inner.release(state);
    }

    /// May `identity` operate the surface?
    pub fn can_interact(&self, identity: &str, is_session_owner: bool) -> bool {
        let resolved = self.snapshot();
        let allowed = self.inner.gate.can_interact(
            &resolved,
            self.inner.resolver.adapter(AuthorityTier::Secondary),
            identity,
            is_session_owner,
        );
        trace!(identity, is_session_owner, allowed, "Gate decision");
        allowed
    }

    /// Gate decision for the local participant of the attached session
    ///
    /// Denies when no session is attached.
    pub fn can_interact_local(&self) -> bool {
        match &self.inner.session {
            Some(session) => self.can_interact(&session.local_identity(), session.is_local_owner()),
            None => {
                warn!("No session attached, denying local interaction");
                false
            }
        }
    }

    /// Gate check plus exclusive write ownership, for callers about to
    /// mutate replicated state
    pub fn authorize_mutation(&self) -> bool {
        let Some(session) = &self.inner.session else {
            warn!("No session attached, denying mutation");
            return false;
        };
        if !self.can_interact(&session.local_identity(), session.is_local_owner()) {
            debug!("Mutation denied for local participant");
            return false;
        }
        session.take_ownership();
        true
    }

    /// Currently published resolved set
    pub fn snapshot(&self) -> Arc<ResolvedAuthorizationSet> {
        self.inner
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sync state of an external tier, if it has been attempted
    pub fn sync_state(&self, tier: AuthorityTier) -> Option<SourceSyncState> {
        self.inner.lock_state().tiers.get(tier).cloned()
    }

    pub fn retry_in_flight(&self, tier: AuthorityTier) -> bool {
        match tier.index() {
            Some(i) => self.inner.lock_state().retries[i].in_flight(),
            None => false,
        }
    }

    /// Tier the drift poller is watching
    pub fn drift_watched_tier(&self) -> Option<AuthorityTier> {
        self.inner.lock_state().poller.watched_tier()
    }

    /// Number of resolution passes run so far
    pub fn resolution_passes(&self) -> u64 {
        self.inner.lock_state().passes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

struct EngineState {
    tiers: TierStates,
    retries: [RetryScheduler; 3],
    poller: DriftPoller,
    passes: u64,
    /// Set by a pass that changed the published set; drained on unlock
    refresh_pending: bool,
}

struct EngineInner {
    me: Weak<EngineInner>,
    resolver: SourceResolver,
    gate: AuthorizationGate,
    budgets: RetryBudgets,
    events: EventBus,
    session: Option<Arc<dyn SessionContext>>,
    state: Mutex<EngineState>,
    resolved: RwLock<Arc<ResolvedAuthorizationSet>>,
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the state lock, then deliver a display refresh if a pass queued one
    fn release(&self, mut state: MutexGuard<'_, EngineState>) {
        let refresh = std::mem::take(&mut state.refresh_pending);
        drop(state);
        if !refresh {
            return;
        }
        if let Some(session) = &self.session {
            session.request_display_refresh();
        }
    }

    fn resolve_locked(&self, state: &mut EngineState) {
        state.passes += 1;
        let decision = self.resolver.walk(&mut state.tiers, runtime_available());

        let (resolved, indicator) = match decision {
            CascadeDecision::Active {
                tier,
                list,
                indicator,
            } => (ResolvedAuthorizationSet::from_list(tier, &list), indicator),
            CascadeDecision::Pending { tier, arm_retry } => {
                if arm_retry && !self.arm_retry(state, tier) {
                    if let Some(sync) = state.tiers.get_mut(tier) {
                        sync.mark_exhausted();
                    }
                    // the walk skips exhausted tiers, so this terminates
                    return self.resolve_locked(state);
                }
                (ResolvedAuthorizationSet::pending(tier), None)
            }
        };

        self.track_active_tier(state, resolved.active_tier(), indicator);

        if let Some(active) = resolved.active_tier() {
            let list = resolved.display_list();
            for to_tier in propagate(self.resolver.adapters(), active, list) {
                self.events.emit_lossy(AuthEvent::ListPropagated {
                    from_tier: active,
                    to_tier,
                    entries: list.len(),
                    timestamp: time::now(),
                });
            }
        }

        self.publish(state, resolved);
    }

    /// Keep the drift poller on the active external tier, or stop it
    ///
    /// `indicator` is the value sampled before the tier's list was read.
    fn track_active_tier(&self, state: &mut EngineState, active: Option<AuthorityTier>, indicator: Option<i64>) {
        let tier = match active {
            Some(tier) if tier.is_external() => tier,
            _ => {
                if state.poller.watched_tier().is_some() {
                    debug!("No external tier active, stopping drift poller");
                    state.poller.disarm();
                }
                return;
            }
        };

        if let Some(sync) = state.tiers.get_mut(tier) {
            sync.set_baseline(indicator);
        }

        if state.poller.watched_tier() == Some(tier) && state.poller.is_running() {
            return;
        }

        let me = self.me.clone();
        let armed = state.poller.arm(tier, move |generation| {
            move || match me.upgrade() {
                Some(inner) => inner.on_poll_tick(tier, generation),
                None => TickOutcome::Stop,
            }
        });
        if armed {
            info!(tier = %tier, baseline = ?indicator, "Active tier established, watching for drift");
        }
    }

    fn arm_retry(&self, state: &mut EngineState, tier: AuthorityTier) -> bool {
        let Some(i) = tier.index() else {
            return false;
        };
        let me = self.me.clone();
        let armed = state.retries[i].arm(move || match me.upgrade() {
            Some(inner) => inner.on_retry_tick(tier),
            None => TickOutcome::Stop,
        });
        if armed {
            let budget = state.retries[i].budget();
            info!(
                tier = %tier,
                max_attempts = budget.max_attempts,
                delay_ms = budget.delay_ms,
                "Tier configured but empty, waiting for data"
            );
            self.events.emit_lossy(AuthEvent::SourceWaiting {
                tier,
                max_attempts: budget.max_attempts,
                timestamp: time::now(),
            });
        }
        armed
    }

    fn on_retry_tick(&self, tier: AuthorityTier) -> TickOutcome {
        let mut state = self.lock_state();
        let (Some(adapter), Some(budget)) = (self.resolver.adapter(tier), self.budgets.for_tier(tier)) else {
            return TickOutcome::Stop;
        };
        let has_data = SourceResolver::tier_has_data(adapter).is_some();
        let Some(sync) = state.tiers.get_mut(tier) else {
            return TickOutcome::Stop;
        };

        let step = apply_retry_tick(sync, budget, has_data);
        match step {
            RetryStep::Stale => {
                trace!(tier = %tier, "Stale retry tick ignored");
            }
            RetryStep::Again { attempt } => {
                debug!(
                    tier = %tier,
                    attempt,
                    max_attempts = budget.max_attempts,
                    "Tier still empty, will retry after delay"
                );
            }
            RetryStep::Resolved { attempt } => {
                info!(tier = %tier, attempt, "Tier supplied data after retry");
                self.resolve_locked(&mut state);
            }
            RetryStep::Exhausted { attempts } => {
                info!(tier = %tier, attempts, "Retry budget exhausted, treating tier as empty");
                self.events.emit_lossy(AuthEvent::SourceExhausted {
                    tier,
                    attempts,
                    timestamp: time::now(),
                });
                self.resolve_locked(&mut state);
            }
        }
        self.release(state);
        step.outcome()
    }

    fn on_poll_tick(&self, tier: AuthorityTier, generation: u64) -> TickOutcome {
        let mut state = self.lock_state();
        if !state.poller.is_current(tier, generation) {
            trace!(tier = %tier, generation, "Stale drift tick ignored");
            return TickOutcome::Stop;
        }
        let Some(adapter) = self.resolver.adapter(tier) else {
            return TickOutcome::Stop;
        };

        let baseline = state.tiers.get(tier).and_then(SourceSyncState::last_change_indicator);
        match classify(baseline, adapter.try_read_change_indicator()) {
            DriftCheck::Unset => {
                trace!(tier = %tier, "Change indicator unreadable, rescheduling");
                TickOutcome::Continue
            }
            DriftCheck::Unchanged => {
                trace!(tier = %tier, "No drift");
                TickOutcome::Continue
            }
            DriftCheck::Changed { previous, current } => {
                info!(tier = %tier, ?previous, current, "Drift detected, re-resolving");
                if let Some(sync) = state.tiers.get_mut(tier) {
                    sync.set_baseline(Some(current));
                }
                self.events.emit_lossy(AuthEvent::DriftDetected {
                    tier,
                    previous,
                    current,
                    timestamp: time::now(),
                });
                self.resolve_locked(&mut state);
                let outcome = if state.poller.is_current(tier, generation) {
                    TickOutcome::Continue
                } else {
                    TickOutcome::Stop
                };
                self.release(state);
                outcome
            }
        }
    }

    /// Swap in the new set; notify dependents only when it changed
    ///
    /// The session refresh is queued on `state` and delivered by
    /// [`EngineInner::release`] once the lock is gone.
    fn publish(&self, state: &mut EngineState, resolved: ResolvedAuthorizationSet) {
        let mut slot = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        let changed = resolved.differs_from(&slot);
        let active_tier = resolved.active_tier();
        let pending_tier = resolved.pending_tier();
        let member_count = resolved.len();
        *slot = Arc::new(resolved);
        drop(slot);

        if !changed {
            return;
        }
        info!(
            active_tier = ?active_tier,
            pending_tier = ?pending_tier,
            members = member_count,
            "Authorization set changed"
        );
        self.events.emit_lossy(AuthEvent::AuthorizationChanged {
            active_tier,
            member_count,
            timestamp: time::now(),
        });
        state.refresh_pending = true;
    }
}
