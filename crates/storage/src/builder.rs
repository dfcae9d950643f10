//! Build nested directory objects from a flat listing of files.

use crate::error::{StorageError, StorageResult};
use crate::traits::DirStore;
use futures::future::BoxFuture;
use reposize_core::{Dir, DirEntry, ObjectId, StoreId};
use std::collections::BTreeMap;

#[derive(Debug)]
enum Node {
    File { id: ObjectId, size: i64 },
    Dir(BTreeMap<String, Node>),
}

/// Collects files by path and writes the resulting tree bottom-up.
///
/// ```ignore
/// let mut builder = TreeBuilder::new();
/// builder.add_file("/docs/readme.md", content_id, 120)?;
/// let root_id = builder.write(&store, store_id).await?;
/// ```
#[derive(Debug, Default)]
pub struct TreeBuilder {
    root: BTreeMap<String, Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file. Intermediate directories are created implicitly.
    pub fn add_file(&mut self, path: &str, id: ObjectId, size: i64) -> StorageResult<()> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some((name, parents)) = components.split_last() else {
            return Err(StorageError::InvalidPath(format!("empty file path: {path:?}")));
        };
        if size < 0 {
            return Err(StorageError::InvalidPath(format!(
                "negative size for {path}: {size}"
            )));
        }

        let mut current = &mut self.root;
        for parent in parents {
            let node = current
                .entry(parent.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            current = match node {
                Node::Dir(children) => children,
                Node::File { .. } => {
                    return Err(StorageError::InvalidPath(format!(
                        "{parent} is a file in {path}"
                    )));
                }
            };
        }
        if let Some(Node::Dir(_)) = current.get(*name) {
            return Err(StorageError::InvalidPath(format!(
                "{path} is already a directory"
            )));
        }
        current.insert(name.to_string(), Node::File { id, size });
        Ok(())
    }

    /// Remove a file if present. Directories left empty are dropped on write.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some((name, parents)) = components.split_last() else {
            return false;
        };
        let mut current = &mut self.root;
        for parent in parents {
            current = match current.get_mut(*parent) {
                Some(Node::Dir(children)) => children,
                _ => return false,
            };
        }
        matches!(current.get(*name), Some(Node::File { .. })) && current.remove(*name).is_some()
    }

    /// Write every directory and return the root id.
    pub async fn write<S: DirStore + ?Sized>(
        &self,
        store: &S,
        store_id: StoreId,
    ) -> StorageResult<ObjectId> {
        write_dir(store, store_id, &self.root).await
    }
}

fn write_dir<'a, S: DirStore + ?Sized>(
    store: &'a S,
    store_id: StoreId,
    children: &'a BTreeMap<String, Node>,
) -> BoxFuture<'a, StorageResult<ObjectId>> {
    Box::pin(async move {
        let mut entries = Vec::with_capacity(children.len());
        for (name, node) in children {
            match node {
                Node::File { id, size } => entries.push(DirEntry::file(name, *id, *size)),
                Node::Dir(grandchildren) => {
                    let id = write_dir(store, store_id, grandchildren).await?;
                    if !id.is_empty_dir() {
                        entries.push(DirEntry::dir(name, id));
                    }
                }
            }
        }
        let dir = Dir::new(entries)?;
        store.put_dir(store_id, &dir).await
    })
}
