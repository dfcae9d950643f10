pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{TestStore, content_id};
