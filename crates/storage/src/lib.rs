//! Object storage for reposize.
//!
//! This crate provides:
//! - The collaborator contracts size accounting relies on: commit loading,
//!   tree counting and commit diffing
//! - Tree walking and diffing over any directory store
//! - A builder that writes nested directories from a flat file listing
//! - A content-addressed filesystem backend

pub mod backends;
pub mod builder;
pub mod error;
pub mod traits;
pub mod walk;

pub use backends::filesystem::FilesystemBackend;
pub use builder::TreeBuilder;
pub use error::{StorageError, StorageResult};
pub use traits::{CommitStore, DiffProvider, DirStore, ObjectStore, TreeCounter};

use reposize_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    let backend = FilesystemBackend::new(&config.path).await?;
    Ok(Arc::new(backend))
}
