//! Background size accounting for reposize.
//!
//! This crate provides:
//! - The size accountant, which brings a repository's persisted size and file
//!   count up to its live head by diffing or by walking the tree
//! - Per-repository exclusion so one repository is never recomputed twice at once
//! - A bounded job scheduler with a fixed worker pool
//! - Stale-repository backfill and periodic rescans

pub mod accountant;
pub mod error;
pub mod locks;
pub mod scheduler;
pub mod stale;

pub use accountant::{SizeAccountant, SizeOutcome, apply_changes};
pub use error::{ComputationError, SchedulerError, SizeError};
pub use locks::{RepoGuard, RepoLocks};
pub use scheduler::{Job, JobHandler, SchedulerOptions, SchedulerStats, SizeScheduler};
pub use stale::{enqueue_stale_repositories, spawn_stale_scan};
