//! The incremental engine trait and its callback seams.
//!
//! The orchestrator drives one engine invocation per compile request. The
//! engine is handed everything it needs up front: the inputs, the reporter
//! it pushes diagnostics into, a progress callback that doubles as the
//! cooperative cancellation channel, and a class file manager it must
//! notify about invalidated and generated files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::Analysis;
use crate::problem::ProblemsPerPhase;
use crate::reporter::Reporter;
use crate::setup::{
    ClasspathOptions, CompileOptions, IncrementalOptions, PreviousResult, Setup, UniqueInputs,
};

/// Lookup of previous results keyed by classes directory.
///
/// The engine resolves classpath entries that belong to other projects of
/// the same build through this table instead of re-reading their analyses
/// from disk. The orchestrator registers this project's own read-only and
/// new directories here as well, both mapped to the previous result, so
/// lookups work no matter which of the two a dependent classpath mentions.
#[derive(Debug, Clone, Default)]
pub struct ResultLookup {
    entries: BTreeMap<PathBuf, PreviousResult>,
}

impl ResultLookup {
    /// Creates an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `result` for `classes_dir`.
    pub fn insert(&mut self, classes_dir: impl Into<PathBuf>, result: PreviousResult) {
        self.entries.insert(classes_dir.into(), result);
    }

    /// Returns the previous result registered for `classes_dir`, if any.
    #[must_use]
    pub fn get(&self, classes_dir: &Path) -> Option<&PreviousResult> {
        self.entries.get(classes_dir)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one engine invocation consumes.
#[derive(Debug, Clone)]
pub struct EngineInputs {
    /// Compile options, with the classes directory pointing at the fresh
    /// per-run directory.
    pub options: CompileOptions,
    /// Result of the previous run for this project.
    pub previous: PreviousResult,
    /// Incremental-compilation options.
    pub incremental: IncrementalOptions,
    /// Engine-owned cache file, kept under the project base directory.
    pub cache_file: PathBuf,
    /// Previous results of dependent projects keyed by classes directory.
    pub lookup: ResultLookup,
    /// Classpath handling flags.
    pub classpath_options: ClasspathOptions,
    /// Inputs descriptor used for cache keying.
    pub unique_inputs: UniqueInputs,
}

/// Progress callbacks invoked by the engine while compiling.
pub trait CompileProgress: Send + Sync {
    /// The engine is about to run `phase` over `unit_path`.
    fn start_unit(&self, phase: &str, unit_path: &Path);

    /// Reports progress between phases.
    ///
    /// Returning `false` asks the engine to abort cooperatively; the engine
    /// then fails with [`EngineError::Cancelled`] at its next safe point.
    fn advance(&self, current: u64, total: u64, prev_phase: &str, next_phase: &str) -> bool;
}

/// Callback through which the engine announces class file changes.
///
/// The engine calls `delete` before invalidating products of a previous run
/// and `generated` after writing new products, then `complete` exactly once
/// when it knows whether the run produced a usable analysis.
pub trait ClassFileManager: Send {
    /// The listed class files are invalidated by this run.
    fn delete(&mut self, class_files: &[PathBuf]);

    /// The listed class files were generated by this run.
    fn generated(&mut self, class_files: &[PathBuf]);

    /// The run finished; `success` is `true` when a new analysis exists.
    fn complete(&mut self, success: bool);
}

/// Failure modes of an engine invocation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine observed the cancellation request and aborted.
    #[error("compilation cancelled")]
    Cancelled,

    /// Compilation failed with diagnostics.
    #[error("compilation failed")]
    Failed {
        /// Diagnostics the engine attached to the failure. May overlap with
        /// what it already pushed through the reporter.
        problems: Vec<ProblemsPerPhase>,
    },

    /// The engine failed without diagnostics.
    #[error("engine failure: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A successful engine invocation.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// The analysis describing this run. Paths in its product stamps point
    /// at the classes directory the engine compiled into.
    pub analysis: Analysis,
    /// The setup recorded for this run.
    pub setup: Setup,
}

/// The external incremental-compilation engine.
///
/// `compile` is synchronous and CPU-bound; the orchestrator runs it on a
/// dedicated compute pool. Implementations report diagnostics through
/// `reporter` as they occur and must poll `progress` often enough for
/// cancellation to be responsive.
pub trait IncrementalEngine: Send + Sync {
    /// Runs one incremental compile.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] when aborted through the progress
    /// callback, [`EngineError::Failed`] for compilation errors with
    /// diagnostics, and [`EngineError::Internal`] for anything else.
    fn compile(
        &self,
        inputs: EngineInputs,
        reporter: Arc<dyn Reporter>,
        progress: Arc<dyn CompileProgress>,
        file_manager: &mut dyn ClassFileManager,
    ) -> Result<EngineOutput, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_by_classes_dir() {
        let mut lookup = ResultLookup::new();
        assert!(lookup.is_empty());

        lookup.insert("/out/a/classes", PreviousResult::empty());
        lookup.insert("/out/b/classes", PreviousResult::empty());

        assert_eq!(lookup.len(), 2);
        assert!(lookup.get(Path::new("/out/a/classes")).is_some());
        assert!(lookup.get(Path::new("/out/c/classes")).is_none());
    }
}
