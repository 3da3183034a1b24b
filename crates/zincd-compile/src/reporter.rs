//! A reporter that renders the compile lifecycle as `tracing` events.
//!
//! Headless embeddings of the orchestrator use this reporter directly; it
//! also tracks everything the orchestrator reads back at classification
//! time: the per-phase problem groups and the set of sources that produced
//! warnings while fatal-warnings mode was enabled.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};
use zincd_engine::{Problem, ProblemsPerPhase, Reporter, Severity, StatusCode};

/// Reporter state guarded by one lock.
#[derive(Default)]
struct ReporterState {
    problems: Vec<ProblemsPerPhase>,
    fatal_warning_sources: BTreeSet<PathBuf>,
}

/// Reporter backed by `tracing`.
pub struct TracingReporter {
    state: Mutex<ReporterState>,
    fatal_warnings: AtomicBool,
}

impl TracingReporter {
    /// Creates a reporter with fatal-warnings mode off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReporterState::default()),
            fatal_warnings: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        // A poisoned reporter lock means a reporting thread panicked; the
        // recorded problems are still the best information available.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for TracingReporter {
    fn report_start_compilation(&self, previous_problems: Vec<Problem>) {
        info!(
            previous_problems = previous_problems.len(),
            "compilation started"
        );
    }

    fn report_next_phase(&self, phase: String, source: PathBuf) {
        debug!(phase = %phase, source = %source.display(), "entering phase");
    }

    fn report_compilation_progress(&self, current: u64, total: u64) {
        debug!(current, total, "compilation progress");
    }

    fn report_problem(&self, phase: &str, problem: Problem) {
        match problem.severity {
            Severity::Error => warn!(phase, message = %problem.message, "compiler error"),
            Severity::Warning => info!(phase, message = %problem.message, "compiler warning"),
            Severity::Info => debug!(phase, message = %problem.message, "compiler info"),
        }

        let mut state = self.state();
        if self.fatal_warnings.load(Ordering::Acquire)
            && problem.severity == Severity::Warning
        {
            if let Some(source) = &problem.source {
                state.fatal_warning_sources.insert(source.clone());
            }
        }
        if let Some(group) = state.problems.iter_mut().find(|g| g.phase == phase) {
            group.problems.push(problem);
        } else {
            state
                .problems
                .push(ProblemsPerPhase::new(phase, vec![problem]));
        }
    }

    fn report_cancelled_compilation(&self) {
        info!("compilation cancelled");
    }

    fn process_end_compilation(
        &self,
        previous_problems: Vec<Problem>,
        status: StatusCode,
        client_classes_dir: Option<&Path>,
        analysis_out: Option<&Path>,
    ) {
        debug!(
            previous_problems = previous_problems.len(),
            ?status,
            client_classes_dir = client_classes_dir.map(|p| p.display().to_string()),
            analysis_out = analysis_out.map(|p| p.display().to_string()),
            "processing end of compilation"
        );
    }

    fn report_end_compilation(&self) {
        info!("compilation finished");
    }

    fn enable_fatal_warnings(&self) {
        self.fatal_warnings.store(true, Ordering::Release);
    }

    fn source_files_with_fatal_warnings(&self) -> BTreeSet<PathBuf> {
        self.state().fatal_warning_sources.clone()
    }

    fn all_problems_per_phase(&self) -> Vec<ProblemsPerPhase> {
        self.state().problems.clone()
    }
}
