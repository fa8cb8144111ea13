//! Source read faults
//!
//! Nothing on the authorization path returns an error to callers. A source
//! reports why a read failed with [`SourceFault`]; the adapter logs it and
//! degrades to "no data", which the engine treats as deny.

use thiserror::Error;

/// Why an external authority could not supply its list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceFault {
    /// Integration is present but has not populated its data yet
    #[error("source not yet available")]
    NotYetAvailable,

    /// Field is present but has the wrong shape
    #[error("malformed source data: {0}")]
    Malformed(String),
}
