//! Directory copy and deletion primitives for post-compile publication.
//!
//! The copy is deny-aware and metadata-preserving: an entry is rewritten in
//! the destination only when its size or modification time differ from the
//! source and its source path is not in the deny set. Re-publishing an
//! unchanged tree is therefore a metadata-only pass that touches no file
//! contents, which is what keeps concurrent readers of the client
//! directory safe.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::rebase::rebase_path;

/// Errors from the publication filesystem helpers.
#[derive(Debug, thiserror::Error)]
pub enum FsOpsError {
    /// An I/O error occurred during the operation.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Description of the operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsOpsError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Copies the tree under `src` into `dst`, skipping denied entries.
///
/// Entries whose source path is in `deny` are never written, so stale
/// content cannot resurrect files the current compile invalidated. A file
/// already present in `dst` with matching size and modification time is
/// left alone. A missing `src` copies nothing; empty-classes sentinel
/// directories never exist on disk and flow through here on cold compiles.
///
/// Returns the number of files written.
///
/// # Errors
///
/// Returns [`FsOpsError`] on the first filesystem operation that fails.
pub fn copy_directory_tree(
    src: &Path,
    dst: &Path,
    deny: &BTreeSet<PathBuf>,
) -> Result<u64, FsOpsError> {
    if !src.exists() {
        return Ok(0);
    }
    std::fs::create_dir_all(dst)
        .map_err(|e| FsOpsError::io(format!("create {}", dst.display()), e))?;
    copy_tree_inner(src, dst, deny)
}

fn copy_tree_inner(src: &Path, dst: &Path, deny: &BTreeSet<PathBuf>) -> Result<u64, FsOpsError> {
    let mut copied = 0;
    let entries = std::fs::read_dir(src)
        .map_err(|e| FsOpsError::io(format!("read directory {}", src.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FsOpsError::io("read directory entry", e))?;
        let src_path = entry.path();
        if deny.contains(&src_path) {
            continue;
        }
        let dst_path = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| FsOpsError::io(format!("stat {}", src_path.display()), e))?;
        if file_type.is_dir() {
            std::fs::create_dir_all(&dst_path)
                .map_err(|e| FsOpsError::io(format!("create {}", dst_path.display()), e))?;
            copied += copy_tree_inner(&src_path, &dst_path, deny)?;
        } else if file_type.is_file() {
            if copy_file_if_changed(&src_path, &dst_path)? {
                copied += 1;
            }
        }
        // Symlinks and special files are not compiler outputs; skip them.
    }
    Ok(copied)
}

/// Copies `src` to `dst` unless `dst` already matches on size and mtime.
///
/// Returns `true` when the file was written.
fn copy_file_if_changed(src: &Path, dst: &Path) -> Result<bool, FsOpsError> {
    let src_meta = std::fs::metadata(src)
        .map_err(|e| FsOpsError::io(format!("stat {}", src.display()), e))?;
    if let Ok(dst_meta) = std::fs::metadata(dst) {
        let same_len = src_meta.len() == dst_meta.len();
        let same_mtime = match (src_meta.modified(), dst_meta.modified()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if same_len && same_mtime {
            return Ok(false);
        }
    }

    std::fs::copy(src, dst)
        .map_err(|e| FsOpsError::io(format!("copy {} to {}", src.display(), dst.display()), e))?;

    // Propagate the source mtime so the next pass recognizes the file as
    // unchanged.
    if let Ok(mtime) = src_meta.modified() {
        let dst_file = std::fs::OpenOptions::new()
            .write(true)
            .open(dst)
            .map_err(|e| FsOpsError::io(format!("reopen {}", dst.display()), e))?;
        dst_file
            .set_modified(mtime)
            .map_err(|e| FsOpsError::io(format!("set mtime of {}", dst.display()), e))?;
    }
    Ok(true)
}

/// Copies a single file, creating parent directories as needed.
///
/// Uses the same metadata comparison as the tree copy, so re-publishing an
/// unchanged file writes nothing. Returns `true` when the file was
/// written.
///
/// # Errors
///
/// Returns [`FsOpsError`] when the copy or a directory creation fails.
pub fn copy_file(src: &Path, dst: &Path) -> Result<bool, FsOpsError> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| FsOpsError::io(format!("create {}", parent.display()), e))?;
    }
    copy_file_if_changed(src, dst)
}

/// Deletes from `client_dir` every file whose counterpart under
/// `read_only_dir` is in `invalidated`.
///
/// Paths are rebased by prefix, matching the rebasing the analysis gets.
/// Files already absent are fine. Returns the number of files removed.
///
/// # Errors
///
/// Returns [`FsOpsError`] when a present file cannot be removed.
pub fn delete_invalidated_in_client_dir(
    invalidated: &BTreeSet<PathBuf>,
    read_only_dir: &Path,
    client_dir: &Path,
) -> Result<u64, FsOpsError> {
    let mut removed = 0;
    for path in invalidated {
        let Some(client_path) = rebase_path(path, read_only_dir, client_dir) else {
            continue;
        };
        match std::fs::remove_file(&client_path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FsOpsError::io(
                    format!("delete {}", client_path.display()),
                    e,
                ))
            }
        }
    }
    Ok(removed)
}

/// Removes `dir` and everything under it. Missing directories are fine.
///
/// # Errors
///
/// Returns [`FsOpsError`] when the directory exists but cannot be removed.
pub fn delete_directory(dir: &Path) -> Result<(), FsOpsError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FsOpsError::io(format!("delete {}", dir.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn copies_nested_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("A.class"), "a");
        write(&src.join("pkg/B.class"), "b");

        let copied = copy_directory_tree(&src, &dst, &BTreeSet::new()).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(read(&dst.join("A.class")), "a");
        assert_eq!(read(&dst.join("pkg/B.class")), "b");
    }

    #[test]
    fn unchanged_files_are_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("A.class"), "a");

        assert_eq!(copy_directory_tree(&src, &dst, &BTreeSet::new()).unwrap(), 1);
        // Second pass sees matching size and mtime.
        assert_eq!(copy_directory_tree(&src, &dst, &BTreeSet::new()).unwrap(), 0);
    }

    #[test]
    fn denied_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("keep.class"), "keep");
        write(&src.join("stale.class"), "stale");
        write(&dst.join("stale.class"), "fresh");

        let deny: BTreeSet<PathBuf> = [src.join("stale.class")].into_iter().collect();
        copy_directory_tree(&src, &dst, &deny).unwrap();

        assert_eq!(read(&dst.join("keep.class")), "keep");
        // The denied entry kept its destination contents.
        assert_eq!(read(&dst.join("stale.class")), "fresh");
    }

    #[test]
    fn missing_source_copies_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("classes-empty-project");
        let dst = tmp.path().join("dst");

        assert_eq!(
            copy_directory_tree(&missing, &dst, &BTreeSet::new()).unwrap(),
            0
        );
        assert!(!dst.exists());
    }

    #[test]
    fn copy_leaves_source_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src.join("A.class"), "a");
        write(&src.join("pkg/B.class"), "b");

        copy_directory_tree(&src, &dst, &BTreeSet::new()).unwrap();
        assert_eq!(read(&src.join("A.class")), "a");
        assert_eq!(read(&src.join("pkg/B.class")), "b");
    }

    #[test]
    fn deletes_invalidated_counterparts() {
        let tmp = tempfile::tempdir().unwrap();
        let read_only = tmp.path().join("read-only");
        let client = tmp.path().join("client");
        write(&client.join("A.class"), "a");
        write(&client.join("B.class"), "b");

        let invalidated: BTreeSet<PathBuf> = [
            read_only.join("A.class"),
            // Outside the read-only dir, so no client counterpart.
            tmp.path().join("elsewhere/C.class"),
        ]
        .into_iter()
        .collect();

        let removed =
            delete_invalidated_in_client_dir(&invalidated, &read_only, &client).unwrap();
        assert_eq!(removed, 1);
        assert!(!client.join("A.class").exists());
        assert!(client.join("B.class").exists());
    }

    #[test]
    fn delete_directory_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("gone");
        delete_directory(&dir).unwrap();

        write(&dir.join("x"), "x");
        delete_directory(&dir).unwrap();
        assert!(!dir.exists());
    }
}
