//! # authsync Engine
//!
//! Decides which identities may operate a shared, replicated control
//! surface. Up to three external authority sources (Primary, Secondary,
//! Tertiary) plus a static Manual list are arbitrated by priority:
//! - [`resolver`]: priority cascade, deny-by-default while a tier loads
//! - [`schedule`]: bounded retry for empty tiers, drift polling of the active tier
//! - [`propagation`]: one-way push of the resolved list to lower tiers
//! - [`gate`]: the allow/deny predicate gated subsystems call
//! - [`engine`]: wires it all together on a tokio runtime

pub mod adapter;
pub mod engine;
pub mod error;
pub mod gate;
pub mod normalize;
pub mod propagation;
pub mod resolved;
pub mod resolver;
pub mod schedule;
pub mod session;
pub mod state;

pub use adapter::memory::{InMemorySource, RichFlags};
pub use adapter::{AuthoritySourceAdapter, BasicAuthoritySource, RichAuthoritySource, RichAuthorization};
pub use authsync_common::AuthorityTier;
pub use engine::{AuthorizationEngine, AuthorizationEngineBuilder};
pub use error::SourceFault;
pub use gate::AuthorizationGate;
pub use resolved::ResolvedAuthorizationSet;
pub use session::SessionContext;
pub use state::{SourceSyncState, SyncPhase};
