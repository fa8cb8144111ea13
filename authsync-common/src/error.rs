//! Common error types for authsync

use thiserror::Error;

/// Common result type for authsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across authsync crates
///
/// The engine itself never surfaces these on the authorization path; they
/// cover host-side work such as configuration loading.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML document could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
