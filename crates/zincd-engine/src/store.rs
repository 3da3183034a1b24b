//! Persistence of the analysis artifact.
//!
//! The analysis file is the only engine artifact the orchestrator writes.
//! Writes go through the temp-file + rename protocol so a crash at any
//! point leaves either the old complete file or the new complete file on
//! disk, never a partial one. Reads are bounded before deserialization so a
//! corrupted or adversarial file cannot exhaust memory.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::Analysis;
use crate::setup::Setup;

/// Upper bound on the size of an analysis file accepted by the reader.
///
/// Analyses of large projects reach tens of megabytes; 256 MiB is far above
/// any legitimate file while still bounding allocation.
pub const MAX_ANALYSIS_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Errors from analysis persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The analysis file exceeds [`MAX_ANALYSIS_FILE_SIZE`].
    #[error("analysis file too large: {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge {
        /// Actual file size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },

    /// The target path has no parent directory to stage the temp file in.
    #[error("path has no parent directory: {}", path.display())]
    NoParentDirectory {
        /// Path with no parent.
        path: std::path::PathBuf,
    },

    /// Serialization of the analysis contents failed.
    #[error("analysis serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Deserialization of the analysis contents failed.
    #[error("analysis deserialization failed: {0}")]
    Deserialize(#[source] serde_json::Error),

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

impl StoreError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// What an analysis file holds: the analysis and the setup it was produced
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisContents {
    /// The persisted analysis.
    pub analysis: Analysis,
    /// The setup recorded alongside it.
    pub setup: Setup,
}

/// Reads and writes analysis files.
///
/// Implementations choose the encoding; the orchestrator only cares that
/// `store` is atomic per file and that an empty analysis is never written.
pub trait AnalysisStore: Send + Sync {
    /// Persists `contents` to `path`, unless the analysis is empty.
    ///
    /// Returns `true` when a file was written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or any filesystem operation
    /// fails.
    fn store(&self, path: &Path, contents: &AnalysisContents) -> Result<bool, StoreError>;

    /// Loads the contents of the analysis file at `path`.
    ///
    /// Returns `None` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read or decoded.
    fn load(&self, path: &Path) -> Result<Option<AnalysisContents>, StoreError>;
}

/// JSON-encoded analysis store with atomic writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAnalysisStore;

impl JsonAnalysisStore {
    /// Creates the store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AnalysisStore for JsonAnalysisStore {
    fn store(&self, path: &Path, contents: &AnalysisContents) -> Result<bool, StoreError> {
        if contents.analysis.is_empty() {
            debug!(path = %path.display(), "skipping persistence of empty analysis");
            return Ok(false);
        }

        let json = serde_json::to_vec(contents).map_err(StoreError::Serialize)?;

        let parent = path.parent().ok_or_else(|| StoreError::NoParentDirectory {
            path: path.to_path_buf(),
        })?;
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::io("create analysis parent directory", e))?;

        // Temp file in the same directory keeps the rename on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| StoreError::io("create temp analysis file", e))?;
        tmp.write_all(&json)
            .map_err(|e| StoreError::io("write temp analysis file", e))?;
        tmp.flush()
            .map_err(|e| StoreError::io("flush temp analysis file", e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io("fsync temp analysis file", e))?;
        tmp.persist(path)
            .map_err(|e| StoreError::io("rename analysis file into place", e.error))?;

        Ok(true)
    }

    fn load(&self, path: &Path) -> Result<Option<AnalysisContents>, StoreError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("open analysis file", e)),
        };

        let size = file
            .metadata()
            .map_err(|e| StoreError::io("stat analysis file", e))?
            .len();
        if size > MAX_ANALYSIS_FILE_SIZE {
            return Err(StoreError::FileTooLarge {
                size,
                max: MAX_ANALYSIS_FILE_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        file.read_to_end(&mut buf)
            .map_err(|e| StoreError::io("read analysis file", e))?;

        let contents = serde_json::from_slice(&buf).map_err(StoreError::Deserialize)?;
        Ok(Some(contents))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::analysis::Stamp;
    use crate::setup::CompileOrder;

    fn sample_contents() -> AnalysisContents {
        let mut analysis = Analysis::empty();
        analysis.stamps.products.insert(
            PathBuf::from("/classes/A.class"),
            Stamp::LastModified { millis: 1 },
        );
        AnalysisContents {
            analysis,
            setup: Setup {
                classes_dir: PathBuf::from("/classes"),
                scalac_options: vec![],
                javac_options: vec![],
                order: CompileOrder::Mixed,
                classpath_hashes: vec![],
            },
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let contents = sample_contents();

        let store = JsonAnalysisStore::new();
        assert!(store.store(&path, &contents).unwrap());

        let loaded = store.load(&path).unwrap().unwrap();
        assert_eq!(loaded, contents);
    }

    #[test]
    fn empty_analysis_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let contents = AnalysisContents {
            analysis: Analysis::empty(),
            setup: sample_contents().setup,
        };

        let store = JsonAnalysisStore::new();
        assert!(!store.store(&path, &contents).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonAnalysisStore::new();
        assert!(store.load(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn store_overwrites_previous_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let store = JsonAnalysisStore::new();

        let first = sample_contents();
        store.store(&path, &first).unwrap();

        let mut second = sample_contents();
        second.analysis.stamps.products.insert(
            PathBuf::from("/classes/B.class"),
            Stamp::LastModified { millis: 2 },
        );
        store.store(&path, &second).unwrap();

        let loaded = store.load(&path).unwrap().unwrap();
        assert_eq!(loaded, second);
        // Temp files must not linger next to the analysis file.
        let entries: BTreeMap<_, _> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.file_name(), e.path())
            })
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
