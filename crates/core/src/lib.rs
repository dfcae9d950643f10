//! Core domain types for incremental repository size accounting.
//!
//! This crate defines the data model shared by every other crate:
//! - Repository, store and object identifiers
//! - Commits and directory objects of the content-addressed store
//! - Diff entries produced between two commits
//! - Size and file-count totals
//! - Layered configuration

pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod repo;
pub mod size;

pub use commit::{Commit, Dir, DirEntry, EntryKind};
pub use diff::{ChangeEntry, DiffStatus};
pub use error::{Error, Result};
pub use hash::ObjectId;
pub use repo::{RepoId, Repository, StoreId};
pub use size::{RepoSizeInfo, SizeInfo};

/// Path that addresses the root directory of a commit.
pub const ROOT_PATH: &str = "/";
