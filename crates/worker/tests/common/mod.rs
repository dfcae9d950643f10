//! Common test utilities and fixtures.

pub mod fixtures;
pub mod metadata;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use metadata::*;
#[allow(unused_imports)]
pub use mocks::*;
