//! # authsync Common Library
//!
//! Shared code for the authorization engine and its host tools:
//! - Error types
//! - Engine configuration (TOML loading, defaults, retry budgets)
//! - Authority tier ordering
//! - Event types (AuthEvent enum) and the EventBus
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod tier;
pub mod time;

pub use error::{Error, Result};
pub use tier::AuthorityTier;
