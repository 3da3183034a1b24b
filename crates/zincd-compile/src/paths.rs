//! Directory layout for one compile.
//!
//! Three directories matter per compile:
//!
//! - the **external classes directory**, stable per project and client,
//!   which outside readers observe;
//! - the **internal read-only classes directory**, produced by the previous
//!   successful run, which the engine may read but never write;
//! - the **internal new classes directory**, created fresh per run under
//!   `<out>/bloop-internal-classes/<externalName>-<uuid>`, the only
//!   writable destination during the run.
//!
//! The `<externalName>-<uuid>` naming is load-bearing: orphan cleanup and
//! cross-client attribution both parse it. Projects that have never
//! compiled successfully use an *empty classes directory* as their
//! read-only directory: a sentinel path that is never created on disk and
//! is recognized purely by the `/classes-empty-` substring, so the engine
//! skips it during classpath lookup. The match is on substring rather than
//! final segment because project names may themselves contain path
//! separators.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use once_cell::sync::OnceCell;
use uuid::Uuid;

/// Name of the per-run directory root under a project's `out` directory.
pub const INTERNAL_CLASSES_ROOT_NAME: &str = "bloop-internal-classes";

/// Prefix of the empty-classes-directory sentinel segment.
pub const EMPTY_CLASSES_DIR_PREFIX: &str = "classes-empty-";

/// Errors while computing or creating the compile directory layout.
#[derive(Debug, thiserror::Error)]
pub enum PathLayoutError {
    /// A directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A freshly created directory could not be canonicalized.
    #[error("failed to canonicalize {}: {source}", path.display())]
    Canonicalize {
        /// Directory that could not be canonicalized.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The external classes directory has no final path segment to derive
    /// the run directory name from.
    #[error("external classes directory has no name: {}", path.display())]
    NoExternalName {
        /// The offending path.
        path: PathBuf,
    },
}

/// The set of directories used by one compile.
///
/// The new-directory accessors are lazy: nothing touches the filesystem
/// until a run actually needs its fresh directory, and repeated calls
/// return the same created path.
#[derive(Debug)]
pub struct CompileOutPaths {
    out_dir: PathBuf,
    external_classes_dir: PathBuf,
    internal_read_only_classes_dir: PathBuf,
    internal_new_classes_dir: OnceCell<PathBuf>,
    internal_new_pickles_dir: OnceCell<PathBuf>,
}

impl CompileOutPaths {
    /// Creates the layout for one compile.
    ///
    /// `out_dir` is the project output root the internal run directories
    /// live under. `internal_read_only_classes_dir` is the product of the
    /// previous successful run, or an empty-classes sentinel when there is
    /// none.
    #[must_use]
    pub fn new(
        out_dir: impl Into<PathBuf>,
        external_classes_dir: impl Into<PathBuf>,
        internal_read_only_classes_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            external_classes_dir: external_classes_dir.into(),
            internal_read_only_classes_dir: internal_read_only_classes_dir.into(),
            internal_new_classes_dir: OnceCell::new(),
            internal_new_pickles_dir: OnceCell::new(),
        }
    }

    /// The stable, client-visible classes directory.
    #[must_use]
    pub fn external_classes_dir(&self) -> &Path {
        &self.external_classes_dir
    }

    /// The read-only classes directory of the previous successful run.
    #[must_use]
    pub fn internal_read_only_classes_dir(&self) -> &Path {
        &self.internal_read_only_classes_dir
    }

    /// Creates (if needed) and returns the internal root that parents all
    /// per-run directories of `out`.
    ///
    /// # Errors
    ///
    /// Returns [`PathLayoutError`] when the root cannot be created or
    /// canonicalized.
    pub fn create_internal_classes_root_dir(out: &Path) -> Result<PathBuf, PathLayoutError> {
        let root = out.join(INTERNAL_CLASSES_ROOT_NAME);
        std::fs::create_dir_all(&root).map_err(|source| PathLayoutError::CreateDir {
            path: root.clone(),
            source,
        })?;
        root.canonicalize()
            .map_err(|source| PathLayoutError::Canonicalize { path: root, source })
    }

    /// The fresh per-run classes directory, created on first access.
    ///
    /// Named `<externalName>-<uuid>` under the internal root, where
    /// `<externalName>` is the final segment of the external classes
    /// directory. The uuid suffix keeps concurrent and successive runs
    /// disjoint.
    ///
    /// # Errors
    ///
    /// Returns [`PathLayoutError`] when the directory cannot be created.
    pub fn internal_new_classes_dir(&self) -> Result<&Path, PathLayoutError> {
        self.internal_new_classes_dir
            .get_or_try_init(|| {
                let external_name = self.external_classes_dir.file_name().ok_or_else(|| {
                    PathLayoutError::NoExternalName {
                        path: self.external_classes_dir.clone(),
                    }
                })?;
                let root = Self::create_internal_classes_root_dir(&self.out_dir)?;
                let name = format!("{}-{}", external_name.to_string_lossy(), Uuid::new_v4());
                let dir = root.join(name);
                std::fs::create_dir_all(&dir).map_err(|source| PathLayoutError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
                dir.canonicalize()
                    .map_err(|source| PathLayoutError::Canonicalize { path: dir, source })
            })
            .map(PathBuf::as_path)
    }

    /// The fresh per-run pickles directory, created on first access.
    ///
    /// Derived from the new classes directory name by substituting
    /// `classes` with `pickles`, or prepending `pickles-` when `classes`
    /// does not occur in the name.
    ///
    /// # Errors
    ///
    /// Returns [`PathLayoutError`] when either directory cannot be created.
    pub fn internal_new_pickles_dir(&self) -> Result<&Path, PathLayoutError> {
        self.internal_new_pickles_dir
            .get_or_try_init(|| {
                let classes_dir = self.internal_new_classes_dir()?;
                let classes_name = classes_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let pickles_name = if classes_name.contains("classes") {
                    classes_name.replace("classes", "pickles")
                } else {
                    format!("pickles-{classes_name}")
                };
                let dir = classes_dir
                    .parent()
                    .map_or_else(|| PathBuf::from(&pickles_name), |p| p.join(&pickles_name));
                std::fs::create_dir_all(&dir).map_err(|source| PathLayoutError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
                Ok(dir)
            })
            .map(PathBuf::as_path)
    }

    /// Returns the new classes directory if it was already created during
    /// this compile, without touching the filesystem.
    #[must_use]
    pub fn created_new_classes_dir(&self) -> Option<&Path> {
        self.internal_new_classes_dir.get().map(PathBuf::as_path)
    }

    /// Derives the empty-classes sentinel directory for `project` next to
    /// `generic_classes_dir`.
    ///
    /// The returned path must never be created on disk.
    #[must_use]
    pub fn derive_empty_classes_dir(project: &str, generic_classes_dir: &Path) -> PathBuf {
        let name = format!("{EMPTY_CLASSES_DIR_PREFIX}{project}");
        generic_classes_dir
            .parent()
            .map_or_else(|| PathBuf::from(&name), |parent| parent.join(&name))
    }

    /// Returns `true` if `path` is an empty-classes sentinel.
    #[must_use]
    pub fn has_empty_classes_dir(path: &Path) -> bool {
        let needle = format!("{MAIN_SEPARATOR}{EMPTY_CLASSES_DIR_PREFIX}");
        path.to_string_lossy().contains(&needle)
    }

    /// Lists run directories under `internal_root` that follow the
    /// `<externalName>-<uuid>` convention and are not in `live`.
    ///
    /// Such directories are left behind when a process is killed between
    /// creating its run directory and publishing it; callers garbage-collect
    /// them at their own pace. The orchestrator itself never deletes them.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the root cannot be read.
    pub fn orphaned_run_dirs(
        internal_root: &Path,
        live: &BTreeSet<PathBuf>,
    ) -> std::io::Result<Vec<PathBuf>> {
        let mut orphans = Vec::new();
        for entry in std::fs::read_dir(internal_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            if live.contains(&path) {
                continue;
            }
            let name = entry.file_name();
            if is_run_dir_name(&name.to_string_lossy()) {
                orphans.push(path);
            }
        }
        orphans.sort();
        Ok(orphans)
    }
}

/// Returns `true` when `name` ends in `-<uuid>`.
fn is_run_dir_name(name: &str) -> bool {
    const UUID_LEN: usize = 36;
    if name.len() <= UUID_LEN || !name.is_char_boundary(name.len() - UUID_LEN) {
        return false;
    }
    let (prefix, suffix) = name.split_at(name.len() - UUID_LEN);
    prefix.ends_with('-') && Uuid::parse_str(suffix).is_ok()
}
