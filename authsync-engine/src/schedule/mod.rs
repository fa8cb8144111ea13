//! Delayed, recurring callbacks for retry and drift detection
//!
//! Both schedulers run a tokio task that sleeps a fixed delay and then calls
//! back into the engine. The task keeps going until the callback answers
//! [`TickOutcome::Stop`]. Handles are aborted when superseded, and every
//! callback re-checks engine state first, so a tick that slips through an
//! abort is a no-op.

pub mod drift;
pub mod retry;

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

pub use drift::{DriftCheck, DriftPoller};
pub use retry::{RetryScheduler, RetryStep};

/// What a recurring task should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// True when called from inside a tokio runtime
pub fn runtime_available() -> bool {
    Handle::try_current().is_ok()
}

/// Spawn `on_tick` every `delay` until it returns `Stop`
///
/// Returns `None` (and logs) when no tokio runtime is reachable.
pub(crate) fn spawn_recurring<F>(task: &'static str, delay: Duration, mut on_tick: F) -> Option<JoinHandle<()>>
where
    F: FnMut() -> TickOutcome + Send + 'static,
{
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!(task, "No tokio runtime available, timer not scheduled");
            return None;
        }
    };

    Some(handle.spawn(async move {
        loop {
            tokio::time::sleep(delay).await;
            if on_tick() == TickOutcome::Stop {
                break;
            }
        }
    }))
}
