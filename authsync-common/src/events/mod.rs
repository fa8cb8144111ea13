//! Event types for the authsync event system
//!
//! Provides shared event definitions and the EventBus through which the
//! engine tells dependents that authorization-gated state may need
//! re-evaluation.

use crate::tier::AuthorityTier;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// authsync event types
///
/// Events are broadcast via EventBus and can be serialized for transport to
/// UI layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    /// Resolved authorization set changed
    ///
    /// Triggers:
    /// - UI: re-evaluate authorization-dependent visibility
    /// - Toggle/fader/preset subsystems: re-check gated controls
    AuthorizationChanged {
        /// Tier that supplied the list (`None` while waiting on a tier)
        active_tier: Option<AuthorityTier>,
        /// Number of distinct normalized identities
        member_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A configured tier had no data and started bounded retries
    SourceWaiting {
        tier: AuthorityTier,
        max_attempts: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A tier used up its retry budget and is treated as empty
    SourceExhausted {
        tier: AuthorityTier,
        attempts: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active tier's change indicator moved since the last poll
    DriftDetected {
        tier: AuthorityTier,
        previous: Option<i64>,
        current: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Resolved list was pushed into a lower-priority tier
    ListPropagated {
        from_tier: AuthorityTier,
        to_tier: AuthorityTier,
        entries: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AuthEvent {
    /// Get event type as string (for logging and transport)
    pub fn event_type(&self) -> &str {
        match self {
            AuthEvent::AuthorizationChanged { .. } => "AuthorizationChanged",
            AuthEvent::SourceWaiting { .. } => "SourceWaiting",
            AuthEvent::SourceExhausted { .. } => "SourceExhausted",
            AuthEvent::DriftDetected { .. } => "DriftDetected",
            AuthEvent::ListPropagated { .. } => "ListPropagated",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use authsync_common::events::{AuthEvent, EventBus};
/// use authsync_common::AuthorityTier;
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(AuthEvent::AuthorizationChanged {
///     active_tier: Some(AuthorityTier::Manual),
///     member_count: 2,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "AuthorizationChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (tokio broadcast requirement).
    /// `EngineConfig::validate` rejects that value.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AuthEvent) {
        let _ = self.tx.send(event);
    }
}
