//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to start transaction: {0}")]
    TransactionStart(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to commit transaction: {0}")]
    TransactionCommit(#[source] sqlx::Error),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

impl MetadataError {
    /// Classify a write failure, separating constraint violations from other
    /// database errors.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.is_check_violation()
                    || db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation() =>
            {
                MetadataError::Constraint(db_err.message().to_string())
            }
            _ => MetadataError::Database(err),
        }
    }
}

impl From<reposize_core::Error> for MetadataError {
    fn from(e: reposize_core::Error) -> Self {
        MetadataError::InvalidData(e.to_string())
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
