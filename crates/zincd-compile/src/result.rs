//! Compile outcome and product types.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use zincd_engine::{PreviousResult, ProblemsPerPhase, UniqueInputs};

use crate::background::CompileBackgroundTasks;

/// What a finished compile hands to its consumers.
///
/// The read-only directory is the source of truth for unchanged outputs,
/// the new directory for changed ones. Both previous-result views are
/// carried: the dependent-run result holds the raw analysis for projects
/// compiling against this run right now, the future-run result holds the
/// rebased analysis the next compile of this project starts from.
#[derive(Debug, Clone)]
pub struct CompileProducts {
    /// Output of the previous successful run; never written by this run.
    pub read_only_classes_dir: PathBuf,
    /// Fresh output directory of this run. Equal to the read-only
    /// directory on the no-op path.
    pub new_classes_dir: PathBuf,
    /// Previous result for dependent projects, carrying the raw analysis.
    pub result_for_dependent_compilations: PreviousResult,
    /// Previous result for the next run of this project, carrying the
    /// rebased analysis.
    pub result_for_future_compilations: PreviousResult,
    /// Class files and extra products this run invalidated.
    pub invalidated_compile_products: BTreeSet<PathBuf>,
    /// Generated class files keyed by path relative to the new directory.
    pub generated_relative_class_file_paths: BTreeMap<String, PathBuf>,
}

/// Outcome of one compile request.
///
/// `Empty`, `Blocked`, and `GlobalError` are constructed upstream of the
/// orchestrator; they are part of the type so every layer of the server
/// speaks one outcome language.
#[derive(Debug, Clone)]
pub enum ResultKind {
    /// Nothing to compile.
    Empty,
    /// The compile never ran because upstream projects are failing.
    Blocked {
        /// Names of the projects blocking this one.
        blocked_on: Vec<String>,
    },
    /// The compile never ran because of a build-level error.
    GlobalError {
        /// Rendered error message.
        message: String,
        /// Underlying error, when one exists.
        cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },
    /// The engine finished and produced (or confirmed) an analysis.
    Success {
        /// Descriptor of the compiled inputs.
        inputs: UniqueInputs,
        /// Directories, analyses, and invalidation data of the run.
        products: CompileProducts,
        /// Wall-clock duration of the compile in milliseconds.
        elapsed_ms: u64,
        /// Deferred per-client publication work.
        background_tasks: CompileBackgroundTasks,
        /// `true` when the engine confirmed the previous analysis instead
        /// of producing a new one.
        is_no_op: bool,
        /// `true` when the build succeeded but fatal warnings demote its
        /// client-visible status to an error.
        reported_fatal_warnings: bool,
    },
    /// Compilation failed with diagnostics or an engine error.
    Failed {
        /// Diagnostics grouped by phase, reporter and engine unioned.
        problems: Vec<ProblemsPerPhase>,
        /// Engine error when the failure produced no diagnostics.
        cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
        /// Wall-clock duration of the compile in milliseconds.
        elapsed_ms: u64,
        /// Deferred per-client cleanup work.
        background_tasks: CompileBackgroundTasks,
    },
    /// Compilation was cancelled.
    Cancelled {
        /// Diagnostics reported before the cancellation took effect.
        problems: Vec<ProblemsPerPhase>,
        /// Wall-clock duration of the compile in milliseconds.
        elapsed_ms: u64,
        /// Deferred per-client cleanup work.
        background_tasks: CompileBackgroundTasks,
    },
}

impl ResultKind {
    /// Returns `true` for outcomes downstream consumers can build on.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Empty)
    }

    /// Returns `true` for outcomes that stop downstream consumers.
    #[must_use]
    pub const fn is_not_ok(&self) -> bool {
        !self.is_ok()
    }

    /// The background tasks of this outcome, when it carries any.
    #[must_use]
    pub const fn background_tasks(&self) -> Option<&CompileBackgroundTasks> {
        match self {
            Self::Success {
                background_tasks, ..
            }
            | Self::Failed {
                background_tasks, ..
            }
            | Self::Cancelled {
                background_tasks, ..
            } => Some(background_tasks),
            Self::Empty | Self::Blocked { .. } | Self::GlobalError { .. } => None,
        }
    }
}
