//! Error types for rtmix-engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use rtmix_common::Category;
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Audio output device errors (no device, open or negotiation failure).
    /// Fatal at startup.
    #[error("Audio device error: {0}")]
    Device(String),

    /// Lookup by a (category, id) pair that was never registered
    #[error("Sound resource does not exist: category={category}, id={id}")]
    ResourceNotFound { category: Category, id: i32 },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Background job submission failed (executor shut down)
    #[error("Job executor error: {0}")]
    Executor(String),

    /// Configuration or definition file errors
    #[error(transparent)]
    Common(#[from] rtmix_common::Error),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
