//! Session primitives the engine consumes from its host

/// Per-participant view of the replicated session
pub trait SessionContext: Send + Sync {
    /// Display name of the local participant
    fn local_identity(&self) -> String;

    /// Whether the local participant owns the session
    fn is_local_owner(&self) -> bool;

    /// Take exclusive write ownership of the replicated state
    fn take_ownership(&self);

    /// Ask every participant to refresh authorization-dependent visuals
    ///
    /// Called after the resolution pass has released the engine lock, so
    /// the host may query the engine from here.
    fn request_display_refresh(&self);
}
