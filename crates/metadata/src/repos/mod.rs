//! Repository traits for metadata operations.

pub mod registry;
pub mod sizes;

pub use registry::RegistryRepo;
pub use sizes::RepoSizeRepo;
