//! Reporter contract shared by the engine and the orchestrator.
//!
//! The engine pushes diagnostics and phase transitions into the reporter
//! while compiling; the orchestrator drives the start/end lifecycle and
//! reads the accumulated state back when it classifies the outcome. The
//! rendering of diagnostics is entirely the implementation's business.
//!
//! # Ordering
//!
//! Implementations may assume `report_start_compilation` is called before
//! any engine callback and that the engine has returned before
//! `all_problems_per_phase` or `source_files_with_fatal_warnings` are read.
//! The orchestrator guarantees both by awaiting the engine call.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::problem::{Problem, ProblemsPerPhase};

/// Build status surfaced to clients at the end of a compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Compilation succeeded.
    Ok,
    /// Compilation failed, or succeeded with fatal warnings.
    Error,
    /// Compilation was cancelled.
    Cancelled,
}

/// Sink for compile lifecycle events and diagnostics.
///
/// Implementations must be safe to share across threads; the engine reports
/// from its own compute thread while the orchestrator owns the lifecycle
/// calls.
pub trait Reporter: Send + Sync {
    /// Signals the start of a compile, carrying the problems recovered from
    /// the previous result so clients can clear or replay them.
    fn report_start_compilation(&self, previous_problems: Vec<Problem>);

    /// Signals that the engine is about to run `phase` on `source`.
    fn report_next_phase(&self, phase: String, source: PathBuf);

    /// Reports overall compilation progress.
    fn report_compilation_progress(&self, current: u64, total: u64);

    /// Records a diagnostic reported by the engine during `phase`.
    fn report_problem(&self, phase: &str, problem: Problem);

    /// Signals that the compile was cancelled before completion.
    fn report_cancelled_compilation(&self);

    /// Processes the end of a compile for one client.
    ///
    /// `client_classes_dir` and `analysis_out` are populated on the
    /// successful paths where the background tasks know which directory the
    /// client observes and where the analysis was persisted.
    fn process_end_compilation(
        &self,
        previous_problems: Vec<Problem>,
        status: StatusCode,
        client_classes_dir: Option<&Path>,
        analysis_out: Option<&Path>,
    );

    /// Signals that all work for a compile, including deferred background
    /// I/O, has finished. Fired exactly once per triggered client, on
    /// success and on error alike.
    fn report_end_compilation(&self);

    /// Switches the reporter into fatal-warnings mode, in which warning
    /// diagnostics mark their source file for forced recompilation.
    fn enable_fatal_warnings(&self);

    /// Source files that produced a warning while fatal-warnings mode was
    /// enabled.
    fn source_files_with_fatal_warnings(&self) -> BTreeSet<PathBuf>;

    /// Every problem reported so far, grouped by phase.
    fn all_problems_per_phase(&self) -> Vec<ProblemsPerPhase>;
}
