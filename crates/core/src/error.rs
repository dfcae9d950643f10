//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid repository id: {0}")]
    InvalidRepoId(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid directory entry: {0}")]
    InvalidEntry(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
