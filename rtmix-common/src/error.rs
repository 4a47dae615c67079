//! Common error types for rtmix

use thiserror::Error;

/// Common result type for rtmix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the rtmix crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML document could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Requested file or entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid value in a definition or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
