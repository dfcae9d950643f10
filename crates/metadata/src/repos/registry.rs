//! Repository registry trait.

use crate::error::MetadataResult;
use async_trait::async_trait;
use reposize_core::{RepoId, Repository};

/// Lookup and head tracking for repositories.
///
/// Size accounting only reads the registry. The head setter exists for the
/// producer that advances heads and for fixtures.
#[async_trait]
pub trait RegistryRepo: Send + Sync {
    /// Get a repository by id.
    async fn get_repository(&self, repo_id: RepoId) -> MetadataResult<Option<Repository>>;

    /// Insert or update the live head of a repository.
    async fn set_repository_head(&self, repo: &Repository) -> MetadataResult<()>;

    /// List repositories whose size record is missing or points at a head
    /// other than the live one.
    async fn list_stale_repositories(&self, limit: u32) -> MetadataResult<Vec<RepoId>>;
}
