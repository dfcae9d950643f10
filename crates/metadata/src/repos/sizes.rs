//! Size and file-count record trait.

use crate::error::MetadataResult;
use crate::models::RepoSizeRow;
use async_trait::async_trait;
use reposize_core::{ObjectId, RepoId, RepoSizeInfo};

/// Repository for persisted size accounting records.
#[async_trait]
pub trait RepoSizeRepo: Send + Sync {
    /// Get the previously persisted size, file count and head marker.
    ///
    /// Returns `None` when no size has ever been computed for the repository.
    async fn get_previous_size_info(&self, repo_id: RepoId)
    -> MetadataResult<Option<RepoSizeInfo>>;

    /// Write size, file count and head marker in one transaction.
    ///
    /// Both records are created on first write and updated in place afterwards.
    /// If either write fails the transaction is rolled back and neither record
    /// changes.
    async fn set_repo_size_and_file_count(
        &self,
        repo_id: RepoId,
        head_id: &ObjectId,
        size: i64,
        file_count: i64,
    ) -> MetadataResult<()>;

    /// Get the persisted size in bytes.
    async fn get_repo_size(&self, repo_id: RepoId) -> MetadataResult<Option<i64>>;

    /// Get the persisted file count.
    async fn get_repo_file_count(&self, repo_id: RepoId) -> MetadataResult<Option<i64>>;

    /// Get the raw size record, including its update timestamp.
    async fn get_size_record(&self, repo_id: RepoId) -> MetadataResult<Option<RepoSizeRow>>;
}
