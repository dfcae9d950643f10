//! Size accounting and scheduler error types.

use reposize_core::{ObjectId, RepoId};
use reposize_metadata::MetadataError;
use reposize_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// The step of a recomputation that failed.
#[derive(Debug, Error)]
pub enum SizeError {
    #[error("repository not found")]
    RepositoryNotFound,

    #[error("repository lookup failed: {0}")]
    RepositoryLookup(#[source] MetadataError),

    #[error("previous size record lookup failed: {0}")]
    StaleRecordLookup(#[source] MetadataError),

    #[error("failed to load commit {commit_id}: {source}")]
    CommitLoad {
        commit_id: ObjectId,
        #[source]
        source: StorageError,
    },

    #[error("failed to diff {old} against {new}: {source}")]
    Diff {
        old: ObjectId,
        new: ObjectId,
        #[source]
        source: StorageError,
    },

    #[error("failed to count tree {root_id}: {source}")]
    TreeCount {
        root_id: ObjectId,
        #[source]
        source: StorageError,
    },

    #[error("failed to persist size: {0}")]
    Persistence(#[source] MetadataError),
}

/// A failed recomputation, tagged with its repository.
#[derive(Debug, Error)]
#[error("size computation failed for repository {repo_id}: {source}")]
pub struct ComputationError {
    pub repo_id: RepoId,
    #[source]
    pub source: SizeError,
}

impl ComputationError {
    pub fn new(repo_id: RepoId, source: SizeError) -> Self {
        Self { repo_id, source }
    }

    /// The failed step.
    pub fn kind(&self) -> &SizeError {
        &self.source
    }
}

/// Errors returned to producers and by scheduler-driven scans.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    ShutDown,

    #[error("job queue is full")]
    QueueFull,

    #[error("failed to list stale repositories: {0}")]
    StaleListing(#[source] MetadataError),
}

/// Why a dequeued job did not complete.
#[derive(Debug, Error)]
pub(crate) enum JobFailure {
    #[error(transparent)]
    Computation(#[from] ComputationError),

    #[error("job exceeded its time limit of {0:?}")]
    TimedOut(Duration),

    #[error("job panicked")]
    Panicked,
}
