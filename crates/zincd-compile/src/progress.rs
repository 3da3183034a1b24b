//! Bridges engine progress callbacks to the reporter and the cancel flag.

use std::path::Path;
use std::sync::Arc;

use zincd_engine::{CompileProgress, Reporter};

use crate::cancel::CancelHandle;

/// Progress adapter installed into every engine invocation.
///
/// `start_unit` forwards phase transitions to the reporter. `advance`
/// reports progress only while the request is not cancelled and answers the
/// engine's continue-or-abort question by returning the negated flag.
#[derive(Clone)]
pub struct ProgressAdapter {
    reporter: Arc<dyn Reporter>,
    cancel: CancelHandle,
}

impl ProgressAdapter {
    /// Creates the adapter for one request.
    #[must_use]
    pub fn new(reporter: Arc<dyn Reporter>, cancel: CancelHandle) -> Self {
        Self { reporter, cancel }
    }
}

impl CompileProgress for ProgressAdapter {
    fn start_unit(&self, phase: &str, unit_path: &Path) {
        self.reporter
            .report_next_phase(phase.to_owned(), unit_path.to_owned());
    }

    fn advance(&self, current: u64, total: u64, _prev_phase: &str, _next_phase: &str) -> bool {
        if self.cancel.is_cancelled() {
            false
        } else {
            self.reporter.report_compilation_progress(current, total);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use zincd_engine::{Problem, ProblemsPerPhase, StatusCode};

    use super::*;

    #[derive(Default)]
    struct ProbeReporter {
        phases: Mutex<Vec<(String, PathBuf)>>,
        progress: Mutex<Vec<(u64, u64)>>,
    }

    impl Reporter for ProbeReporter {
        fn report_start_compilation(&self, _previous_problems: Vec<Problem>) {}

        fn report_next_phase(&self, phase: String, source: PathBuf) {
            self.phases.lock().unwrap().push((phase, source));
        }

        fn report_compilation_progress(&self, current: u64, total: u64) {
            self.progress.lock().unwrap().push((current, total));
        }

        fn report_problem(&self, _phase: &str, _problem: Problem) {}

        fn report_cancelled_compilation(&self) {}

        fn process_end_compilation(
            &self,
            _previous_problems: Vec<Problem>,
            _status: StatusCode,
            _client_classes_dir: Option<&Path>,
            _analysis_out: Option<&Path>,
        ) {
        }

        fn report_end_compilation(&self) {}

        fn enable_fatal_warnings(&self) {}

        fn source_files_with_fatal_warnings(&self) -> BTreeSet<PathBuf> {
            BTreeSet::new()
        }

        fn all_problems_per_phase(&self) -> Vec<ProblemsPerPhase> {
            Vec::new()
        }
    }

    #[test]
    fn advance_reports_progress_until_cancelled() {
        let reporter = Arc::new(ProbeReporter::default());
        let cancel = CancelHandle::new();
        let adapter = ProgressAdapter::new(reporter.clone(), cancel.clone());

        assert!(adapter.advance(1, 10, "parser", "typer"));
        assert_eq!(reporter.progress.lock().unwrap().len(), 1);

        cancel.cancel();
        assert!(!adapter.advance(2, 10, "typer", "jvm"));
        // No progress reported after cancellation.
        assert_eq!(reporter.progress.lock().unwrap().len(), 1);
    }

    #[test]
    fn start_unit_forwards_to_reporter() {
        let reporter = Arc::new(ProbeReporter::default());
        let adapter = ProgressAdapter::new(reporter.clone(), CancelHandle::new());

        adapter.start_unit("typer", Path::new("/src/A.scala"));
        let phases = reporter.phases.lock().unwrap();
        assert_eq!(
            phases.as_slice(),
            &[("typer".to_string(), PathBuf::from("/src/A.scala"))]
        );
    }
}
