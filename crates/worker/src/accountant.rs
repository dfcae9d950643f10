//! Incremental size accounting.
//!
//! A repository's persisted size record carries the head commit it was computed
//! at. When that marker equals the live head the record is current. Otherwise
//! the accountant either applies the diff between the recorded head and the
//! live head, or, when there is no usable recorded head, walks the whole tree.

use crate::error::{ComputationError, SizeError};
use crate::scheduler::JobHandler;
use async_trait::async_trait;
use reposize_core::{ChangeEntry, DiffStatus, ROOT_PATH, RepoId, RepoSizeInfo, SizeInfo};
use reposize_metadata::MetadataStore;
use reposize_storage::ObjectStore;
use std::sync::Arc;

/// Result of a successful recomputation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SizeOutcome {
    /// The record already matched the live head. Nothing was written.
    Current(RepoSizeInfo),
    /// Totals were computed by walking the head tree.
    FullWalk(RepoSizeInfo),
    /// Totals were derived from the previous record and a diff.
    Incremental { info: RepoSizeInfo, changes: usize },
}

impl SizeOutcome {
    /// The totals now persisted for the repository.
    pub fn info(&self) -> &RepoSizeInfo {
        match self {
            SizeOutcome::Current(info) | SizeOutcome::FullWalk(info) => info,
            SizeOutcome::Incremental { info, .. } => info,
        }
    }

    /// Whether this recomputation wrote to the metadata store.
    pub fn persisted(&self) -> bool {
        !matches!(self, SizeOutcome::Current(_))
    }
}

/// Net change in size and file count described by a diff.
///
/// A modified file contributes `size - prior_size`, so applying a diff to the
/// old head's totals yields exactly the new head's full-walk totals.
pub fn apply_changes(changes: &[ChangeEntry]) -> SizeInfo {
    changes
        .iter()
        .fold(SizeInfo::default(), |mut delta, entry| {
            match entry.status {
                DiffStatus::Added => {
                    delta.size += entry.size;
                    delta.file_count += 1;
                }
                DiffStatus::Deleted => {
                    delta.size -= entry.size;
                    delta.file_count -= 1;
                }
                DiffStatus::Modified => {
                    delta.size += entry.size - entry.prior_size;
                }
            }
            delta
        })
}

/// Recomputes and persists repository sizes.
#[derive(Clone)]
pub struct SizeAccountant {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
}

impl SizeAccountant {
    pub fn new(metadata: Arc<dyn MetadataStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { metadata, objects }
    }

    /// Bring the persisted size and file count of `repo_id` up to its live head.
    ///
    /// Calling this again without a head change performs no write. Failures are
    /// not retried; the stale record stays in place until the next request.
    pub async fn recompute_size(&self, repo_id: RepoId) -> Result<SizeOutcome, ComputationError> {
        self.compute(repo_id)
            .await
            .map_err(|source| ComputationError::new(repo_id, source))
    }

    async fn compute(&self, repo_id: RepoId) -> Result<SizeOutcome, SizeError> {
        let repo = self
            .metadata
            .get_repository(repo_id)
            .await
            .map_err(SizeError::RepositoryLookup)?
            .ok_or(SizeError::RepositoryNotFound)?;

        let previous = self
            .metadata
            .get_previous_size_info(repo_id)
            .await
            .map_err(SizeError::StaleRecordLookup)?;

        if let Some(prev) = &previous
            && prev.head_id == repo.head_commit_id
        {
            tracing::debug!(
                repo_id = %repo_id,
                head_id = %prev.head_id,
                "Size record already current"
            );
            return Ok(SizeOutcome::Current(prev.clone()));
        }

        let head = self
            .objects
            .load_commit(repo.store_id, repo.head_commit_id)
            .await
            .map_err(|source| SizeError::CommitLoad {
                commit_id: repo.head_commit_id,
                source,
            })?;

        let base = match previous {
            Some(prev) => match self.objects.load_commit(repo.store_id, prev.head_id).await {
                Ok(old_head) => Some((prev, old_head)),
                Err(e) => {
                    tracing::warn!(
                        repo_id = %repo_id,
                        old_head = %prev.head_id,
                        error = %e,
                        "Recorded head unavailable, falling back to full walk"
                    );
                    None
                }
            },
            None => None,
        };

        let outcome = match base {
            Some((prev, old_head)) => {
                let changes = self
                    .objects
                    .diff_commits(repo.store_id, &old_head, &head)
                    .await
                    .map_err(|source| SizeError::Diff {
                        old: old_head.commit_id,
                        new: head.commit_id,
                        source,
                    })?;
                let totals = prev.totals() + apply_changes(&changes);
                tracing::debug!(
                    repo_id = %repo_id,
                    old_head = %old_head.commit_id,
                    new_head = %head.commit_id,
                    changes = changes.len(),
                    "Applying diff to previous size"
                );
                SizeOutcome::Incremental {
                    info: RepoSizeInfo {
                        head_id: head.commit_id,
                        size: totals.size,
                        file_count: totals.file_count,
                    },
                    changes: changes.len(),
                }
            }
            None => {
                let totals = self
                    .objects
                    .count_tree(repo.store_id, head.root_id, ROOT_PATH)
                    .await
                    .map_err(|source| SizeError::TreeCount {
                        root_id: head.root_id,
                        source,
                    })?;
                tracing::debug!(
                    repo_id = %repo_id,
                    head_id = %head.commit_id,
                    "Counted full tree"
                );
                SizeOutcome::FullWalk(RepoSizeInfo {
                    head_id: head.commit_id,
                    size: totals.size,
                    file_count: totals.file_count,
                })
            }
        };

        let info = outcome.info();
        self.metadata
            .set_repo_size_and_file_count(repo_id, &info.head_id, info.size, info.file_count)
            .await
            .map_err(SizeError::Persistence)?;

        tracing::info!(
            repo_id = %repo_id,
            head_id = %info.head_id,
            size = info.size,
            file_count = info.file_count,
            incremental = matches!(outcome, SizeOutcome::Incremental { .. }),
            "Repository size updated"
        );

        Ok(outcome)
    }
}

#[async_trait]
impl JobHandler for SizeAccountant {
    async fn handle(&self, repo_id: RepoId) -> Result<(), ComputationError> {
        self.recompute_size(repo_id).await.map(|_| ())
    }
}
