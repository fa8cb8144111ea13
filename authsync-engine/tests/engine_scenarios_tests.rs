//! End-to-end resolution scenarios
//!
//! Tests run on a paused tokio clock (`start_paused = true`): sleeping in
//! the test auto-advances time, so retry and drift timers fire
//! deterministically.

use authsync_common::config::{EngineConfig, RetryBudget};
use authsync_common::events::AuthEvent;
use authsync_engine::{
    AuthorityTier, AuthorizationEngine, BasicAuthoritySource, InMemorySource, RichFlags,
    SessionContext, SourceFault, SyncPhase,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Helpers
// ============================================================================

fn config(manual: &[&str]) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.manual_list = manual.iter().map(|s| s.to_string()).collect();
    config.drift_poll_interval_secs = 10;
    config.retry.primary = RetryBudget::new(3, 1000);
    config.retry.secondary = RetryBudget::new(2, 500);
    config.retry.tertiary = RetryBudget::new(2, 500);
    config
}

fn list(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn drain(rx: &mut broadcast::Receiver<AuthEvent>) -> Vec<String> {
    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type().to_string());
    }
    types
}

/// Source that reports "not yet available" for its first `failing_reads` reads
struct CountdownSource {
    failing_reads: u32,
    reads: AtomicU32,
    list: Vec<String>,
}

impl CountdownSource {
    fn new(failing_reads: u32, names: &[&str]) -> Self {
        Self {
            failing_reads,
            reads: AtomicU32::new(0),
            list: list(names),
        }
    }

    fn ready(&self) -> bool {
        self.reads.load(Ordering::SeqCst) > self.failing_reads
    }
}

impl BasicAuthoritySource for CountdownSource {
    fn read_list(&self) -> Result<Vec<String>, SourceFault> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if read <= self.failing_reads {
            Err(SourceFault::NotYetAvailable)
        } else {
            Ok(self.list.clone())
        }
    }

    fn read_change_indicator(&self) -> Option<i64> {
        Some(if self.ready() { 1 } else { 0 })
    }
}

/// Source whose list is rewritten by another writer right after each of
/// its first reads, before the engine can look at anything else
struct RacingSource {
    state: Mutex<(i64, Vec<String>)>,
}

impl RacingSource {
    fn new(names: &[&str]) -> Self {
        Self {
            state: Mutex::new((1, list(names))),
        }
    }
}

impl BasicAuthoritySource for RacingSource {
    fn read_list(&self) -> Result<Vec<String>, SourceFault> {
        let mut state = self.state.lock().unwrap();
        let seen = state.1.clone();
        if state.0 == 1 {
            state.0 = 2;
            state.1.push("Frank".to_string());
        }
        Ok(seen)
    }

    fn read_change_indicator(&self) -> Option<i64> {
        Some(self.state.lock().unwrap().0)
    }
}

/// Session whose refresh handler queries the engine back
#[derive(Default)]
struct InspectingSession {
    engine: OnceLock<AuthorizationEngine>,
    observed_passes: Mutex<Vec<u64>>,
}

impl SessionContext for InspectingSession {
    fn local_identity(&self) -> String {
        "alice".to_string()
    }

    fn is_local_owner(&self) -> bool {
        false
    }

    fn take_ownership(&self) {}

    fn request_display_refresh(&self) {
        if let Some(engine) = self.engine.get() {
            let passes = engine.resolution_passes();
            let _ = engine.sync_state(AuthorityTier::Primary);
            let _ = engine.drift_watched_tier();
            self.observed_passes.lock().unwrap().push(passes);
        }
    }
}

#[derive(Default)]
struct RecordingSession {
    identity: Mutex<String>,
    owner: bool,
    ownership_taken: AtomicUsize,
    refreshes: AtomicUsize,
}

impl RecordingSession {
    fn new(identity: &str, owner: bool) -> Self {
        Self {
            identity: Mutex::new(identity.to_string()),
            owner,
            ..Self::default()
        }
    }
}

impl SessionContext for RecordingSession {
    fn local_identity(&self) -> String {
        self.identity.lock().unwrap().clone()
    }

    fn is_local_owner(&self) -> bool {
        self.owner
    }

    fn take_ownership(&self) {
        self.ownership_taken.fetch_add(1, Ordering::SeqCst);
    }

    fn request_display_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Manual fallback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_only_session() {
    // Scenario A
    let engine = AuthorizationEngine::builder(config(&["Alice", "bob "])).build().unwrap();
    engine.start();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.active_tier(), Some(AuthorityTier::Manual));
    assert_eq!(snapshot.members(), vec!["alice", "bob"]);
    assert!(engine.can_interact("BOB", false));
    assert!(!engine.can_interact("carol", false));

    // no async machinery engaged
    assert!(engine.sync_state(AuthorityTier::Primary).is_none());
    assert_eq!(engine.drift_watched_tier(), None);
    for tier in AuthorityTier::EXTERNAL {
        assert!(!engine.retry_in_flight(tier));
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_manual_denies_everyone() {
    // P6
    let engine = AuthorizationEngine::builder(config(&[])).build().unwrap();
    engine.start();

    for identity in ["alice", "BOB", "", "  ", "owner"] {
        assert!(!engine.can_interact(identity, false), "{:?} allowed", identity);
    }
}

#[tokio::test(start_paused = true)]
async fn test_owner_override() {
    // P5
    let engine = AuthorizationEngine::builder(config(&[])).build().unwrap();
    engine.start();
    assert!(engine.can_interact("nobody-listed", true));
    assert!(!engine.can_interact("nobody-listed", false));

    let mut strict = config(&[]);
    strict.owner_override = false;
    let engine = AuthorizationEngine::builder(strict).build().unwrap();
    engine.start();
    assert!(!engine.can_interact("nobody-listed", true));
}

#[tokio::test(start_paused = true)]
async fn test_enforcement_disabled() {
    let mut open = config(&[]);
    open.enforcement_enabled = false;
    let engine = AuthorizationEngine::builder(open).build().unwrap();
    engine.start();
    assert!(engine.can_interact("anyone", false));
}

// ============================================================================
// Priority and propagation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_primary_wins_and_pushes_downward() {
    // P2, P4
    let primary = Arc::new(InMemorySource::with_list(["Dave"]));
    let secondary = Arc::new(InMemorySource::with_list(["Erin"]));
    let tertiary = Arc::new(InMemorySource::with_list(["Tess"]));

    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary.clone())
        .secondary(secondary.clone())
        .tertiary(tertiary.clone())
        .build()
        .unwrap();
    engine.start();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.active_tier(), Some(AuthorityTier::Primary));
    assert_eq!(snapshot.members(), vec!["dave"]);
    assert!(!engine.can_interact("erin", false));
    assert!(!engine.can_interact("manny", false));

    assert!(primary.pushed().is_empty());
    assert_eq!(secondary.pushed(), vec![list(&["Dave"])]);
    assert_eq!(tertiary.pushed(), vec![list(&["Dave"])]);
    assert_eq!(engine.drift_watched_tier(), Some(AuthorityTier::Primary));
}

#[tokio::test(start_paused = true)]
async fn test_primary_arrives_after_retries() {
    // Scenario B
    let primary = Arc::new(CountdownSource::new(3, &["Dave"]));
    let secondary = Arc::new(InMemorySource::new());

    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary.clone())
        .secondary(secondary.clone())
        .build()
        .unwrap();
    engine.start();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.pending_tier(), Some(AuthorityTier::Primary));
    assert!(snapshot.is_empty());
    assert!(engine.retry_in_flight(AuthorityTier::Primary));
    assert!(!engine.can_interact("dave", false));

    // retries at 1s and 2s still fail, the third succeeds
    advance(2_500).await;
    assert_eq!(
        engine.sync_state(AuthorityTier::Primary).unwrap().phase(),
        SyncPhase::Waiting { retry_count: 2 }
    );

    advance(1_000).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.active_tier(), Some(AuthorityTier::Primary));
    assert_eq!(snapshot.members(), vec!["dave"]);
    assert!(engine.can_interact("DAVE", false));
    assert_eq!(secondary.pushed(), vec![list(&["Dave"])]);

    let state = engine.sync_state(AuthorityTier::Primary).unwrap();
    assert_eq!(state.phase(), SyncPhase::Resolved);
    assert_eq!(state.retry_count(), 0);
    assert_eq!(state.last_change_indicator(), Some(1));
    assert_eq!(engine.drift_watched_tier(), Some(AuthorityTier::Primary));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_primary_falls_to_secondary() {
    // P3
    let primary = Arc::new(InMemorySource::new());
    let secondary = Arc::new(InMemorySource::with_list(["Erin", "erin"]));
    let tertiary = Arc::new(InMemorySource::new());

    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary.clone())
        .secondary(secondary.clone())
        .tertiary(tertiary.clone())
        .build()
        .unwrap();
    let mut rx = engine.subscribe();
    engine.start();

    assert!(!engine.can_interact("erin", false));

    advance(3_500).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.active_tier(), Some(AuthorityTier::Secondary));
    assert_eq!(snapshot.members(), vec!["erin"]);
    assert!(engine.can_interact("Erin", false));

    assert_eq!(
        engine.sync_state(AuthorityTier::Primary).unwrap().phase(),
        SyncPhase::Exhausted { attempts: 3 }
    );
    assert!(primary.pushed().is_empty());
    assert!(secondary.pushed().is_empty());
    assert_eq!(tertiary.pushed(), vec![list(&["Erin"])]);

    let events = drain(&mut rx);
    assert!(events.contains(&"SourceWaiting".to_string()));
    assert!(events.contains(&"SourceExhausted".to_string()));
    assert!(events.contains(&"ListPropagated".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_fallthrough_to_tertiary_when_secondary_unconfigured() {
    // Scenario D, first leg
    let primary = Arc::new(InMemorySource::new());
    let tertiary = Arc::new(InMemorySource::with_list(["Tess"]));

    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary)
        .tertiary(tertiary)
        .build()
        .unwrap();
    engine.start();

    advance(3_500).await;
    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Tertiary));
    assert!(engine.can_interact("tess", false));
    assert!(!engine.can_interact("manny", false));
}

#[tokio::test(start_paused = true)]
async fn test_fallthrough_to_manual_when_nothing_below() {
    // Scenario D, last leg
    let primary = Arc::new(InMemorySource::new());

    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary)
        .build()
        .unwrap();
    engine.start();
    assert!(!engine.can_interact("manny", false));

    advance(3_500).await;
    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Manual));
    assert!(engine.can_interact("manny", false));
    assert_eq!(engine.drift_watched_tier(), None);
}

#[tokio::test(start_paused = true)]
async fn test_chained_exhaustion_reaches_tertiary() {
    let primary = Arc::new(InMemorySource::new());
    let secondary = Arc::new(InMemorySource::new());
    let tertiary = Arc::new(InMemorySource::with_list(["Tess"]));

    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary)
        .secondary(secondary)
        .tertiary(tertiary)
        .build()
        .unwrap();
    engine.start();

    // primary exhausts at 3s, secondary waits 2 x 500ms after that
    advance(3_200).await;
    assert_eq!(engine.snapshot().pending_tier(), Some(AuthorityTier::Secondary));
    assert!(engine.retry_in_flight(AuthorityTier::Secondary));

    advance(1_000).await;
    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Tertiary));
    assert!(engine.can_interact("tess", false));
}

// ============================================================================
// Rich authorization
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unrestricted_secondary_allows_everyone() {
    // Scenario C
    let secondary = Arc::new(InMemorySource::with_list(Vec::<String>::new()).with_rich(RichFlags {
        session_unrestricted: Some(true),
        ..RichFlags::default()
    }));

    let engine = AuthorizationEngine::builder(config(&[]))
        .secondary(secondary)
        .build()
        .unwrap();
    engine.start();

    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Secondary));
    assert!(engine.snapshot().is_empty());
    assert!(engine.can_interact("anyone", false));
}

#[tokio::test(start_paused = true)]
async fn test_rich_first_controller_and_explicit_list() {
    let secondary = Arc::new(InMemorySource::with_list(["Listed"]).with_rich(RichFlags {
        session_unrestricted: Some(false),
        secondary_controller_override: Some(true),
        first_controller: Some("First".to_string()),
        ..RichFlags::default()
    }));

    let engine = AuthorizationEngine::builder(config(&[]))
        .secondary(secondary)
        .build()
        .unwrap();
    engine.start();

    assert!(engine.can_interact("first", false));
    assert!(engine.can_interact("LISTED", false));
    assert!(!engine.can_interact("stranger", false));
}

// ============================================================================
// Drift
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_drift_updates_membership_by_next_poll() {
    // P7
    let primary = Arc::new(InMemorySource::with_list(["Dave"]));
    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary.clone())
        .build()
        .unwrap();
    let mut rx = engine.subscribe();
    engine.start();
    drain(&mut rx);

    primary.set_list(["Dave", "Frank"]);
    assert!(!engine.can_interact("frank", false));

    advance(10_500).await;
    assert!(engine.can_interact("frank", false));
    assert_eq!(
        engine.sync_state(AuthorityTier::Primary).unwrap().last_change_indicator(),
        Some(primary.version())
    );

    let events = drain(&mut rx);
    assert!(events.contains(&"DriftDetected".to_string()));
    assert!(events.contains(&"AuthorizationChanged".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_write_between_indicator_and_list_read_is_caught() {
    let primary = Arc::new(RacingSource::new(&["Dave"]));
    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary.clone())
        .build()
        .unwrap();
    engine.start();

    // engine saw the version-1 list, so its baseline must be version 1
    assert!(!engine.can_interact("frank", false));
    assert_eq!(
        engine.sync_state(AuthorityTier::Primary).unwrap().last_change_indicator(),
        Some(1)
    );

    advance(10_500).await;
    assert!(engine.can_interact("frank", false));
    assert_eq!(
        engine.sync_state(AuthorityTier::Primary).unwrap().last_change_indicator(),
        Some(2)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_indicator_does_not_re_resolve() {
    let primary = Arc::new(InMemorySource::with_list(["Dave"]));
    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary)
        .build()
        .unwrap();
    engine.start();
    let passes = engine.resolution_passes();

    advance(35_000).await;
    assert_eq!(engine.resolution_passes(), passes);
    assert_eq!(engine.drift_watched_tier(), Some(AuthorityTier::Primary));
}

#[tokio::test(start_paused = true)]
async fn test_count_fallback_detects_unversioned_change() {
    let primary = Arc::new(InMemorySource::with_list(["Dave"]).without_version());
    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary.clone())
        .build()
        .unwrap();
    engine.start();

    primary.set_list_silently(["Dave", "Gus"]);
    advance(10_500).await;
    assert!(engine.can_interact("gus", false));
}

#[tokio::test(start_paused = true)]
async fn test_active_tier_emptied_goes_back_to_waiting() {
    let primary = Arc::new(InMemorySource::with_list(["Dave"]));
    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary.clone())
        .build()
        .unwrap();
    engine.start();

    primary.set_list(Vec::<String>::new());
    advance(10_500).await;

    assert_eq!(engine.snapshot().pending_tier(), Some(AuthorityTier::Primary));
    assert!(!engine.can_interact("dave", false));
    assert_eq!(engine.drift_watched_tier(), None);

    // retries exhaust, Manual takes over
    advance(3_500).await;
    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Manual));
}

// ============================================================================
// Host triggers and stale timers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reload_cancels_pending_retry() {
    let primary = Arc::new(InMemorySource::new());
    let engine = AuthorizationEngine::builder(config(&[]))
        .primary(primary.clone())
        .build()
        .unwrap();
    let mut rx = engine.subscribe();
    engine.start();

    advance(1_500).await;
    primary.set_list(["Late"]);
    engine.notify_source_reloaded(AuthorityTier::Primary);
    assert!(engine.can_interact("late", false));

    advance(10_000).await;
    assert_eq!(
        engine.sync_state(AuthorityTier::Primary).unwrap().phase(),
        SyncPhase::Resolved
    );
    assert!(!drain(&mut rx).contains(&"SourceExhausted".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_gives_exhausted_tier_new_budget() {
    let primary = Arc::new(InMemorySource::new());
    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary.clone())
        .build()
        .unwrap();
    engine.start();

    advance(3_500).await;
    assert!(engine.can_interact("manny", false));

    // resolve alone keeps skipping the exhausted tier
    engine.resolve();
    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Manual));

    engine.refresh();
    assert_eq!(engine.snapshot().pending_tier(), Some(AuthorityTier::Primary));
    assert!(engine.retry_in_flight(AuthorityTier::Primary));

    primary.set_list(["Dave"]);
    advance(1_500).await;
    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Primary));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_source_degrades_to_empty() {
    let primary = Arc::new(InMemorySource::with_list(["Dave"]));
    primary.set_malformed("expected array of strings");

    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary)
        .build()
        .unwrap();
    engine.start();

    assert!(!engine.can_interact("dave", false));
    advance(3_500).await;
    assert!(engine.can_interact("manny", false));
    assert!(!engine.can_interact("dave", false));
}

// ============================================================================
// Session bridging and notifications
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_display_refresh_only_on_change() {
    let session = Arc::new(RecordingSession::new("Alice", false));
    let engine = AuthorizationEngine::builder(config(&["Alice"]))
        .session(session.clone())
        .build()
        .unwrap();
    let mut rx = engine.subscribe();

    engine.start();
    assert_eq!(session.refreshes.load(Ordering::SeqCst), 1);

    engine.resolve();
    engine.refresh();
    assert_eq!(session.refreshes.load(Ordering::SeqCst), 1);

    let changed = drain(&mut rx)
        .into_iter()
        .filter(|t| t == "AuthorizationChanged")
        .count();
    assert_eq!(changed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_local_participant_and_mutation_ownership() {
    let session = Arc::new(RecordingSession::new("alice ", false));
    let engine = AuthorizationEngine::builder(config(&["Alice"]))
        .session(session.clone())
        .build()
        .unwrap();
    engine.start();

    assert!(engine.can_interact_local());
    assert!(engine.authorize_mutation());
    assert_eq!(session.ownership_taken.load(Ordering::SeqCst), 1);

    *session.identity.lock().unwrap() = "mallory".to_string();
    assert!(!engine.can_interact_local());
    assert!(!engine.authorize_mutation());
    assert_eq!(session.ownership_taken.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_handler_may_query_engine() {
    let session = Arc::new(InspectingSession::default());
    let primary = Arc::new(InMemorySource::with_list(["Dave"]));
    let engine = AuthorizationEngine::builder(config(&["Alice"]))
        .primary(primary.clone())
        .session(session.clone())
        .build()
        .unwrap();
    assert!(session.engine.set(engine.clone()).is_ok());

    engine.start();
    assert_eq!(*session.observed_passes.lock().unwrap(), vec![1]);

    // refresh delivered from the drift task as well
    primary.set_list(["Dave", "Erin"]);
    advance(10_500).await;
    assert_eq!(*session.observed_passes.lock().unwrap(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_no_session_denies_local_checks() {
    let engine = AuthorizationEngine::builder(config(&["Alice"])).build().unwrap();
    engine.start();
    assert!(!engine.can_interact_local());
    assert!(!engine.authorize_mutation());
}

// ============================================================================
// Runtime-less and configuration edge cases
// ============================================================================

#[test]
fn test_without_runtime_empty_tiers_fall_through() {
    let primary = Arc::new(InMemorySource::new());
    let engine = AuthorizationEngine::builder(config(&["Manny"]))
        .primary(primary)
        .build()
        .unwrap();
    engine.start();

    assert_eq!(engine.snapshot().active_tier(), Some(AuthorityTier::Manual));
    assert!(engine.sync_state(AuthorityTier::Primary).unwrap().is_exhausted());
    assert!(engine.can_interact("manny", false));
}

#[test]
fn test_invalid_config_rejected_at_build() {
    let mut bad = config(&[]);
    bad.drift_poll_interval_secs = 0;
    assert!(AuthorizationEngine::builder(bad).build().is_err());
}
