//! Tree walking and diffing over a [`DirStore`].
//!
//! Both walks are iterative so deep trees do not grow the async stack.

use crate::error::{StorageError, StorageResult};
use crate::traits::DirStore;
use reposize_core::{ChangeEntry, Dir, DirEntry, ObjectId, ROOT_PATH, SizeInfo, StoreId};
use std::cmp::Ordering;

/// Resolve `path` below `root_id` to a directory id.
pub async fn resolve_dir<S: DirStore + ?Sized>(
    store: &S,
    store_id: StoreId,
    root_id: ObjectId,
    path: &str,
) -> StorageResult<ObjectId> {
    if !path.starts_with(ROOT_PATH) {
        return Err(StorageError::InvalidPath(format!(
            "path must be absolute: {path}"
        )));
    }

    let mut current = root_id;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if component == "." || component == ".." {
            return Err(StorageError::InvalidPath(format!(
                "relative component in path: {path}"
            )));
        }
        let dir = store.load_dir(store_id, current).await?;
        match dir.get(component) {
            Some(entry) if entry.is_dir() => current = entry.id,
            Some(_) => {
                return Err(StorageError::InvalidPath(format!(
                    "not a directory: {path}"
                )));
            }
            None => return Err(StorageError::NotFound(format!("path {path}"))),
        }
    }
    Ok(current)
}

/// Sum sizes and count files reachable from `path` below `root_id`.
pub async fn count_tree<S: DirStore + ?Sized>(
    store: &S,
    store_id: StoreId,
    root_id: ObjectId,
    path: &str,
) -> StorageResult<SizeInfo> {
    let start = resolve_dir(store, store_id, root_id, path).await?;

    let mut totals = SizeInfo::default();
    let mut pending = vec![start];
    while let Some(dir_id) = pending.pop() {
        let dir = store.load_dir(store_id, dir_id).await?;
        for entry in dir.entries() {
            if entry.is_dir() {
                pending.push(entry.id);
            } else {
                totals += SizeInfo::new(entry.size, 1);
            }
        }
    }
    Ok(totals)
}

/// A pair of directories still to compare. `None` stands for "absent on this side".
struct DirPair {
    prefix: String,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{prefix}/{name}")
    }
}

async fn load_side<S: DirStore + ?Sized>(
    store: &S,
    store_id: StoreId,
    id: Option<ObjectId>,
) -> StorageResult<Dir> {
    match id {
        Some(id) => store.load_dir(store_id, id).await,
        None => Ok(Dir::empty()),
    }
}

/// File-level changes between two root directories, sorted by path.
///
/// Subtrees with identical ids are skipped. A path that changes between file
/// and directory is reported as the removal of one plus the additions of the
/// other.
pub async fn diff_trees<S: DirStore + ?Sized>(
    store: &S,
    store_id: StoreId,
    old_root: ObjectId,
    new_root: ObjectId,
) -> StorageResult<Vec<ChangeEntry>> {
    let mut changes = Vec::new();
    if old_root == new_root {
        return Ok(changes);
    }

    let mut pending = vec![DirPair {
        prefix: ROOT_PATH.to_string(),
        old: Some(old_root),
        new: Some(new_root),
    }];

    while let Some(pair) = pending.pop() {
        let old_dir = load_side(store, store_id, pair.old).await?;
        let new_dir = load_side(store, store_id, pair.new).await?;

        let mut old_iter = old_dir.entries().iter().peekable();
        let mut new_iter = new_dir.entries().iter().peekable();
        loop {
            let order = match (old_iter.peek(), new_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(o), Some(n)) => o.name.cmp(&n.name),
            };
            match order {
                Ordering::Less => {
                    if let Some(old) = old_iter.next() {
                        removed(&pair.prefix, old, &mut changes, &mut pending);
                    }
                }
                Ordering::Greater => {
                    if let Some(new) = new_iter.next() {
                        added(&pair.prefix, new, &mut changes, &mut pending);
                    }
                }
                Ordering::Equal => {
                    if let (Some(old), Some(new)) = (old_iter.next(), new_iter.next()) {
                        changed(&pair.prefix, old, new, &mut changes, &mut pending);
                    }
                }
            }
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

fn removed(
    prefix: &str,
    old: &DirEntry,
    changes: &mut Vec<ChangeEntry>,
    pending: &mut Vec<DirPair>,
) {
    let path = join(prefix, &old.name);
    if old.is_dir() {
        pending.push(DirPair {
            prefix: path,
            old: Some(old.id),
            new: None,
        });
    } else {
        changes.push(ChangeEntry::deleted(path, old.size));
    }
}

fn added(prefix: &str, new: &DirEntry, changes: &mut Vec<ChangeEntry>, pending: &mut Vec<DirPair>) {
    let path = join(prefix, &new.name);
    if new.is_dir() {
        pending.push(DirPair {
            prefix: path,
            old: None,
            new: Some(new.id),
        });
    } else {
        changes.push(ChangeEntry::added(path, new.size));
    }
}

fn changed(
    prefix: &str,
    old: &DirEntry,
    new: &DirEntry,
    changes: &mut Vec<ChangeEntry>,
    pending: &mut Vec<DirPair>,
) {
    match (old.is_dir(), new.is_dir()) {
        (true, true) => {
            if old.id != new.id {
                pending.push(DirPair {
                    prefix: join(prefix, &new.name),
                    old: Some(old.id),
                    new: Some(new.id),
                });
            }
        }
        (false, false) => {
            if old.id != new.id || old.size != new.size {
                changes.push(ChangeEntry::modified(
                    join(prefix, &new.name),
                    new.size,
                    old.size,
                ));
            }
        }
        _ => {
            removed(prefix, old, changes, pending);
            added(prefix, new, changes, pending);
        }
    }
}
