//! The compile orchestrator.
//!
//! `compile` is the top-level state machine of one compile request. It
//! builds the engine inputs, drives the engine on the compute pool with
//! the progress adapter and class file manager installed, classifies the
//! outcome, and constructs the result value whose embedded background
//! tasks publish the run to each client that triggers them.
//!
//! # Ordering
//!
//! Within one compile, `report_start_compilation` happens before the
//! engine is invoked, the engine returns before the reporter is read for
//! classification, and end-of-compilation reporting is owned by the
//! background tasks (or by the cancellation branch, which reports
//! inline).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tracing::error;
use zincd_engine::{
    flatten_problems, union_problems, Analysis, AnalysisContents, AnalysisStore, ClasspathOptions,
    CompileOptions, CompileOrder, CompileProgress, EngineError, EngineInputs, FileHash,
    IncrementalEngine, IncrementalOptions, PreviousResult, Problem, Reporter, ResultLookup,
    StatusCode, UniqueInputs,
};

use crate::background::BackgroundTasksBuilder;
use crate::cancel::CancelHandle;
use crate::classfiles::BookkeepingClassFileManager;
use crate::config::CompileConfig;
use crate::jdk;
use crate::paths::CompileOutPaths;
use crate::progress::ProgressAdapter;
use crate::rebase::rebase_analysis;
use crate::refresh::refresh_classpath_hashes;
use crate::result::{CompileProducts, ResultKind};

/// Flag that promotes warnings to errors. Stripped from the options passed
/// to the engine; its presence switches the reporter into fatal-warnings
/// mode instead.
const FATAL_WARNINGS_FLAG: &str = "-Xfatal-warnings";

/// Name of the engine-owned cache file under the project base directory.
const ENGINE_CACHE_FILE: &str = "cache";

/// The two executors of one compile request.
///
/// The engine call is the only long synchronous step and runs on the
/// blocking pool of `compute`; post-compile persistence, copies, and
/// deletions run as tasks on `io`.
#[derive(Debug, Clone)]
pub struct CompileSchedulers {
    /// Runtime driving the CPU-bound engine call.
    pub compute: Handle,
    /// Runtime driving parallel background I/O.
    pub io: Handle,
}

impl CompileSchedulers {
    /// Uses the current runtime for both roles.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self {
            compute: Handle::current(),
            io: Handle::current(),
        }
    }
}

/// One compile request, immutable for the duration of the compile.
pub struct CompileRequest {
    /// Project the compile belongs to.
    pub project_name: String,
    /// Source files to compile.
    pub sources: Vec<PathBuf>,
    /// Compilation classpath.
    pub classpath: Vec<PathBuf>,
    /// Hashes of the classpath entries, computed upstream.
    pub classpath_hashes: Vec<FileHash>,
    /// Options for the Scala compiler as configured by the user.
    pub scalac_options: Vec<String>,
    /// Options for the Java compiler.
    pub javac_options: Vec<String>,
    /// Mixed-compilation order.
    pub order: CompileOrder,
    /// Project base directory; hosts the engine cache file.
    pub base_directory: PathBuf,
    /// Directory layout of this compile.
    pub out_paths: CompileOutPaths,
    /// Where the analysis artifact is persisted.
    pub analysis_out: PathBuf,
    /// Result of the previous run of this project.
    pub previous_result: PreviousResult,
    /// Outcome of the previous compile of this project, used to derive the
    /// problems replayed at start.
    pub previous_compile_result: ResultKind,
    /// Previous results of dependent projects keyed by their classes
    /// directory.
    pub dependent_results: BTreeMap<PathBuf, PreviousResult>,
    /// Class files dependent projects invalidated before this compile.
    pub invalidated_by_dependents: BTreeSet<PathBuf>,
    /// Class files dependent projects generated before this compile.
    pub generated_by_dependents: BTreeSet<PathBuf>,
    /// Reporter attached to this request.
    pub reporter: Arc<dyn Reporter>,
    /// Request-scoped cancellation flag.
    pub cancel: CancelHandle,
    /// Executors of this request.
    pub schedulers: CompileSchedulers,
    /// The javac binary the build targets, when one is configured.
    pub javac_binary: Option<PathBuf>,
}

/// Drives the incremental engine for one project.
pub struct Orchestrator {
    engine: Arc<dyn IncrementalEngine>,
    store: Arc<dyn AnalysisStore>,
    config: CompileConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over `engine` and `store`.
    #[must_use]
    pub fn new(
        engine: Arc<dyn IncrementalEngine>,
        store: Arc<dyn AnalysisStore>,
        config: CompileConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// Runs one compile request to completion and classifies the outcome.
    ///
    /// Cancellation is cooperative: setting the request's cancel flag makes
    /// the progress adapter answer "stop" to the engine, and the result is
    /// classified as cancelled even when the engine races to a success.
    #[allow(clippy::too_many_lines)]
    pub async fn compile(&self, request: CompileRequest) -> ResultKind {
        let start = Instant::now();
        let CompileRequest {
            project_name,
            sources,
            classpath,
            classpath_hashes,
            scalac_options,
            javac_options,
            order,
            base_directory,
            out_paths,
            analysis_out,
            previous_result,
            previous_compile_result,
            dependent_results,
            invalidated_by_dependents,
            generated_by_dependents,
            reporter,
            cancel,
            schedulers,
            javac_binary,
        } = request;

        let read_only = out_paths.internal_read_only_classes_dir().to_path_buf();
        let new_dir = match out_paths.internal_new_classes_dir() {
            Ok(dir) => dir.to_path_buf(),
            Err(e) => {
                return global_error(
                    format!("failed to prepare compile directories for {project_name}"),
                    e,
                )
            }
        };

        let adjusted = jdk::adjust_release_options(
            scalac_options,
            javac_binary.as_deref(),
            &self.config.server_java_home,
            self.config.server_jvm_major,
        );
        let fatal_warnings_enabled = adjusted.iter().any(|opt| opt == FATAL_WARNINGS_FLAG);
        if fatal_warnings_enabled {
            reporter.enable_fatal_warnings();
        }
        let scalac_for_engine: Vec<String> = adjusted
            .into_iter()
            .filter(|opt| opt != FATAL_WARNINGS_FLAG)
            .collect();

        let unique_inputs = UniqueInputs {
            sources: sources.clone(),
            classpath_hashes: classpath_hashes.clone(),
            scalac_options: scalac_for_engine.clone(),
            javac_options: javac_options.clone(),
        };

        // Dependent results, plus this project's own directories mapped to
        // its previous result so classpath lookups resolve through either.
        let mut lookup = ResultLookup::new();
        for (classes_dir, result) in dependent_results {
            lookup.insert(classes_dir, result);
        }
        lookup.insert(read_only.clone(), previous_result.clone());
        lookup.insert(new_dir.clone(), previous_result.clone());

        let incremental = if self.config.disable_incremental {
            IncrementalOptions::disabled()
        } else {
            IncrementalOptions::default()
        };
        let inputs = EngineInputs {
            options: CompileOptions {
                classes_dir: new_dir.clone(),
                sources,
                classpath,
                scalac_options: scalac_for_engine,
                javac_options,
                order,
                classpath_hashes,
            },
            previous: previous_result.clone(),
            incremental,
            cache_file: base_directory.join(ENGINE_CACHE_FILE),
            lookup,
            classpath_options: ClasspathOptions::default(),
            unique_inputs: unique_inputs.clone(),
        };

        reporter.report_start_compilation(previous_problems(&previous_compile_result));

        let manager = match BookkeepingClassFileManager::new(
            read_only.clone(),
            new_dir.clone(),
            invalidated_by_dependents,
            generated_by_dependents,
        ) {
            Ok(manager) => manager,
            Err(e) => {
                return global_error(
                    format!("failed to prepare class file staging for {project_name}"),
                    e,
                )
            }
        };

        let progress: Arc<dyn CompileProgress> =
            Arc::new(ProgressAdapter::new(Arc::clone(&reporter), cancel.clone()));
        let engine = Arc::clone(&self.engine);
        let engine_reporter = Arc::clone(&reporter);
        let mut join = schedulers.compute.spawn_blocking(move || {
            let mut manager = manager;
            let result = engine.compile(inputs, engine_reporter, progress, &mut manager);
            (manager, result)
        });

        // Await the engine while watching the cancel flag so the cancel
        // routine runs exactly once, as soon as cancellation is requested.
        let mut cancel_observed = cancel.is_cancelled();
        if cancel_observed {
            reporter.report_cancelled_compilation();
        }
        let joined = loop {
            tokio::select! {
                res = &mut join => break res,
                () = cancel.cancelled(), if !cancel_observed => {
                    reporter.report_cancelled_compilation();
                    cancel_observed = true;
                }
            }
        };
        // A cancellation can land in the same poll that completes the
        // engine; make sure the routine ran before classifying.
        if cancel.is_cancelled() && !cancel_observed {
            reporter.report_cancelled_compilation();
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let builder = BackgroundTasksBuilder {
            read_only_classes_dir: read_only.clone(),
            analysis_out,
            store: Arc::clone(&self.store),
            io: schedulers.io,
        };
        let previous_successful = previous_successful_problems(&previous_result);

        let (manager, engine_result) = match joined {
            Ok(pair) => pair,
            Err(join_error) => {
                error!(project = %project_name, error = %join_error, "engine task died");
                let background_tasks = builder.for_failure(Vec::new(), previous_successful);
                let cause: Arc<dyn std::error::Error + Send + Sync> = Arc::new(join_error);
                return ResultKind::Failed {
                    problems: Vec::new(),
                    cause: Some(cause),
                    elapsed_ms,
                    background_tasks,
                };
            }
        };
        let bookkeeping = manager.into_bookkeeping();

        match engine_result {
            // The engine can race past a late cancellation; the request is
            // still cancelled.
            Ok(_) if cancel.is_cancelled() => cancelled_result(
                reporter.as_ref(),
                &builder,
                bookkeeping.on_failure_factories,
                previous_successful,
                elapsed_ms,
            ),
            Ok(output) => {
                let fatal_sources = reporter.source_files_with_fatal_warnings();
                let reported_fatal_warnings = fatal_warnings_enabled && !fatal_sources.is_empty();
                let status = if reported_fatal_warnings {
                    StatusCode::Error
                } else {
                    StatusCode::Ok
                };

                let is_no_op = previous_result.analysis.as_ref() == Some(&output.analysis);
                if is_no_op {
                    let refreshed = refresh_classpath_hashes(&previous_result, &unique_inputs);
                    let previous_contents = previous_result
                        .analysis
                        .clone()
                        .zip(previous_result.setup.clone())
                        .map(|(analysis, setup)| AnalysisContents { analysis, setup });
                    let products = CompileProducts {
                        read_only_classes_dir: read_only.clone(),
                        new_classes_dir: read_only,
                        result_for_dependent_compilations: refreshed.clone(),
                        result_for_future_compilations: refreshed,
                        invalidated_compile_products: BTreeSet::new(),
                        generated_relative_class_file_paths: BTreeMap::new(),
                    };
                    let background_tasks = builder.for_no_op(
                        Some(new_dir),
                        previous_contents,
                        previous_successful,
                        status,
                    );
                    ResultKind::Success {
                        inputs: unique_inputs,
                        products,
                        elapsed_ms,
                        background_tasks,
                        is_no_op: true,
                        reported_fatal_warnings,
                    }
                } else {
                    let rebased =
                        rebase_analysis(&output.analysis, &read_only, &new_dir, &fatal_sources);
                    let result_for_dependent_compilations =
                        PreviousResult::new(output.analysis, output.setup.clone());
                    let result_for_future_compilations =
                        PreviousResult::new(rebased.clone(), output.setup.clone());

                    let invalidated = bookkeeping.all_invalidated();
                    let mut copy_deny = bookkeeping.read_only_copy_denylist.clone();
                    copy_deny.extend(invalidated.iter().cloned());

                    // An invalidated file that was regenerated under the
                    // same relative path is not stale; only files with no
                    // fresh counterpart are pruned from client directories.
                    let regenerated: BTreeSet<PathBuf> = bookkeeping
                        .generated_relative_paths
                        .keys()
                        .map(|relative| read_only.join(relative))
                        .collect();
                    let stale: BTreeSet<PathBuf> =
                        invalidated.difference(&regenerated).cloned().collect();

                    let products = CompileProducts {
                        read_only_classes_dir: read_only,
                        new_classes_dir: new_dir,
                        result_for_dependent_compilations,
                        result_for_future_compilations,
                        invalidated_compile_products: invalidated.clone(),
                        generated_relative_class_file_paths: bookkeeping
                            .generated_relative_paths
                            .clone(),
                    };
                    let background_tasks = builder.for_success(
                        AnalysisContents {
                            analysis: rebased,
                            setup: output.setup,
                        },
                        copy_deny,
                        stale,
                        bookkeeping.on_success_factories.clone(),
                        previous_successful,
                        status,
                    );
                    ResultKind::Success {
                        inputs: unique_inputs,
                        products,
                        elapsed_ms,
                        background_tasks,
                        is_no_op: false,
                        reported_fatal_warnings,
                    }
                }
            }
            Err(EngineError::Cancelled) => cancelled_result(
                reporter.as_ref(),
                &builder,
                bookkeeping.on_failure_factories,
                previous_successful,
                elapsed_ms,
            ),
            Err(EngineError::Failed { problems }) => {
                let problems = union_problems(reporter.all_problems_per_phase(), problems);
                let background_tasks =
                    builder.for_failure(bookkeeping.on_failure_factories, previous_successful);
                ResultKind::Failed {
                    problems,
                    cause: None,
                    elapsed_ms,
                    background_tasks,
                }
            }
            Err(EngineError::Internal(e)) => {
                error!(
                    project = %project_name,
                    error = %e,
                    "compilation failed with an unexpected engine error"
                );
                let background_tasks =
                    builder.for_failure(bookkeeping.on_failure_factories, previous_successful);
                ResultKind::Failed {
                    problems: Vec::new(),
                    cause: Some(Arc::from(e)),
                    elapsed_ms,
                    background_tasks,
                }
            }
        }
    }
}

/// Builds a setup-stage error result.
fn global_error(
    message: String,
    cause: impl std::error::Error + Send + Sync + 'static,
) -> ResultKind {
    let cause: Arc<dyn std::error::Error + Send + Sync> = Arc::new(cause);
    ResultKind::GlobalError {
        message,
        cause: Some(cause),
    }
}

/// Problems replayed at the start of a compile, derived from the previous
/// outcome: failures and cancellations replay their own problems, a
/// success replays the problems recovered from its analysis.
fn previous_problems(previous: &ResultKind) -> Vec<Problem> {
    match previous {
        ResultKind::Failed { problems, .. } | ResultKind::Cancelled { problems, .. } => {
            flatten_problems(problems)
        }
        ResultKind::Success { products, .. } => products
            .result_for_future_compilations
            .analysis
            .as_ref()
            .map(Analysis::all_problems)
            .unwrap_or_default(),
        ResultKind::Empty | ResultKind::Blocked { .. } | ResultKind::GlobalError { .. } => {
            Vec::new()
        }
    }
}

/// Problems recorded by the previous successful analysis, if any.
fn previous_successful_problems(previous: &PreviousResult) -> Vec<Problem> {
    previous
        .analysis
        .as_ref()
        .map(Analysis::all_problems)
        .unwrap_or_default()
}

/// Shared cancellation epilogue: end-processing is reported inline and the
/// failure tasks are still attached for per-client cleanup.
fn cancelled_result(
    reporter: &dyn Reporter,
    builder: &BackgroundTasksBuilder,
    failure_factories: Vec<crate::background::BackgroundTaskFactory>,
    previous_successful: Vec<Problem>,
    elapsed_ms: u64,
) -> ResultKind {
    reporter.process_end_compilation(
        previous_successful.clone(),
        StatusCode::Cancelled,
        None,
        None,
    );
    reporter.report_end_compilation();
    ResultKind::Cancelled {
        problems: reporter.all_problems_per_phase(),
        elapsed_ms,
        background_tasks: builder.for_failure(failure_factories, previous_successful),
    }
}
