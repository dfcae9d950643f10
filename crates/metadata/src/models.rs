//! Database models mapping to the metadata schema.

use crate::error::MetadataResult;
use reposize_core::{ObjectId, RepoId, RepoSizeInfo, Repository, StoreId};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Registry record: the live head of a repository.
#[derive(Debug, Clone, FromRow)]
pub struct RepoRow {
    pub repo_id: Uuid,
    pub store_id: Uuid,
    pub head_commit_id: String,
    pub root_id: String,
    pub updated_at: OffsetDateTime,
}

impl RepoRow {
    /// Convert into the domain type, validating the stored object ids.
    pub fn into_repository(self) -> MetadataResult<Repository> {
        Ok(Repository {
            repo_id: RepoId::from_uuid(self.repo_id),
            store_id: StoreId::from_uuid(self.store_id),
            head_commit_id: ObjectId::from_hex(&self.head_commit_id)?,
            root_id: ObjectId::from_hex(&self.root_id)?,
        })
    }
}

/// Persisted cumulative size and the head it was computed at.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RepoSizeRow {
    pub repo_id: Uuid,
    pub size: i64,
    pub head_id: String,
    pub updated_at: OffsetDateTime,
}


/// Joined view of both records.
#[derive(Debug, Clone, FromRow)]
pub struct RepoSizeInfoRow {
    pub head_id: String,
    pub size: i64,
    pub file_count: i64,
}

impl RepoSizeInfoRow {
    pub fn into_info(self) -> MetadataResult<RepoSizeInfo> {
        Ok(RepoSizeInfo {
            head_id: ObjectId::from_hex(&self.head_id)?,
            size: self.size,
            file_count: self.file_count,
        })
    }
}
