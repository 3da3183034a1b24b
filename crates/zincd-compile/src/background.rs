//! Deferred post-compile I/O, triggered per client.
//!
//! Directory state becomes visible to a client only when that client
//! triggers the background-task handle embedded in the compile result.
//! Distinct clients may trigger concurrently; their external directories
//! are disjoint. Within one trigger the phases are ordered: analysis
//! persistence and the success factories complete before the client
//! directory is copied into and pruned. Analysis persistence is shared
//! work and runs at most once across all clients; everything else runs per
//! client.
//!
//! Any error is logged and propagated, and `report_end_compilation` fires
//! exactly once per trigger no matter what.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{error, info_span, Instrument};
use zincd_engine::{AnalysisContents, AnalysisStore, Problem, Reporter, StatusCode};

use crate::fsops;

/// Future returned by one background task for one client.
pub type ClientTaskFuture = Pin<Box<dyn Future<Output = Result<(), BackgroundError>> + Send>>;

/// Factory producing one background task per triggering client.
///
/// Factories are registered through the class file manager hook during
/// compilation and invoked once per client at trigger time.
pub type BackgroundTaskFactory = Arc<dyn Fn(&ClientContext) -> ClientTaskFuture + Send + Sync>;

/// Errors from deferred background work.
///
/// Payloads are rendered strings so one failure can be shared across every
/// client waiting on the memoized analysis write.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackgroundError {
    /// Persisting the analysis artifact failed.
    #[error("analysis persistence failed: {0}")]
    Persist(String),

    /// A copy or delete in the client directory failed.
    #[error("client directory update failed: {0}")]
    ClientDir(String),

    /// A registered background task failed.
    #[error("background task failed: {0}")]
    Task(String),

    /// A spawned background task was aborted or panicked.
    #[error("background task did not finish: {0}")]
    Join(String),
}

/// Per-client inputs of one background-task trigger.
#[derive(Clone)]
pub struct ClientContext {
    /// The external classes directory this client observes.
    pub client_classes_dir: PathBuf,
    /// The reporter attached to this client's compile request.
    pub reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("client_classes_dir", &self.client_classes_dir)
            .finish_non_exhaustive()
    }
}

type TriggerFn = dyn Fn(ClientContext) -> ClientTaskFuture + Send + Sync;

/// Deferred work handle embedded in a compile result.
///
/// Trigger it once per client; triggers for distinct clients may run
/// concurrently. The higher-level server serializes triggers of a single
/// client.
#[derive(Clone)]
pub struct CompileBackgroundTasks {
    run: Arc<TriggerFn>,
}

impl std::fmt::Debug for CompileBackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileBackgroundTasks").finish_non_exhaustive()
    }
}

impl CompileBackgroundTasks {
    /// Wraps a trigger function.
    #[must_use]
    pub fn new(run: impl Fn(ClientContext) -> ClientTaskFuture + Send + Sync + 'static) -> Self {
        Self { run: Arc::new(run) }
    }

    /// A handle that performs no work.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|_client| Box::pin(async { Ok(()) }))
    }

    /// Runs the deferred work for one client.
    ///
    /// # Errors
    ///
    /// Propagates the first [`BackgroundError`] of the underlying tasks
    /// after all of them settled and end-of-compilation was reported.
    pub async fn trigger(&self, client: ClientContext) -> Result<(), BackgroundError> {
        (self.run)(client).await
    }
}

/// Awaits every spawned task, returning the first error after all settled.
async fn join_settled(
    handles: Vec<JoinHandle<Result<(), BackgroundError>>>,
) -> Result<(), BackgroundError> {
    let mut first_error = None;
    for handle in handles {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(join) => Err(BackgroundError::Join(join.to_string())),
        };
        if let Err(e) = outcome {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Runs `work` for one client, reporting end-of-compilation exactly once.
async fn finish_reporting(
    client: &ClientContext,
    work: impl Future<Output = Result<(), BackgroundError>>,
) -> Result<(), BackgroundError> {
    let result = work.await;
    if let Err(e) = &result {
        error!(
            client = %client.client_classes_dir.display(),
            error = %e,
            "post-compile background tasks failed"
        );
    }
    client.reporter.report_end_compilation();
    result
}

/// Builds the background-task handles for the three outcome classes.
pub(crate) struct BackgroundTasksBuilder {
    pub read_only_classes_dir: PathBuf,
    pub analysis_out: PathBuf,
    pub store: Arc<dyn AnalysisStore>,
    pub io: Handle,
}

impl BackgroundTasksBuilder {
    /// Tasks for a compile the engine confirmed as a no-op.
    ///
    /// In parallel: delete the unused fresh directory, copy the read-only
    /// directory into the client directory, and persist the previous
    /// analysis when no analysis file exists on disk yet.
    pub(crate) fn for_no_op(
        &self,
        created_new_classes_dir: Option<PathBuf>,
        previous_contents: Option<AnalysisContents>,
        previous_problems: Vec<Problem>,
        status: StatusCode,
    ) -> CompileBackgroundTasks {
        let read_only = self.read_only_classes_dir.clone();
        let analysis_out = self.analysis_out.clone();
        let store = Arc::clone(&self.store);
        let io = self.io.clone();
        let persist_memo: Arc<OnceCell<Result<(), BackgroundError>>> = Arc::new(OnceCell::new());

        CompileBackgroundTasks::new(move |client: ClientContext| {
            let read_only = read_only.clone();
            let analysis_out = analysis_out.clone();
            let store = Arc::clone(&store);
            let io = io.clone();
            let persist_memo = Arc::clone(&persist_memo);
            let created_dir = created_new_classes_dir.clone();
            let previous_contents = previous_contents.clone();
            let previous_problems = previous_problems.clone();

            let span = info_span!(
                "background_tasks",
                outcome = "no_op",
                client = %client.client_classes_dir.display()
            );
            Box::pin(
                async move {
                    client.reporter.process_end_compilation(
                        previous_problems,
                        status,
                        Some(&client.client_classes_dir),
                        Some(&analysis_out),
                    );

                    let work = async {
                        let mut handles = Vec::new();

                        if let Some(dir) = created_dir {
                            handles.push(io.spawn_blocking(move || {
                                fsops::delete_directory(&dir)
                                    .map_err(|e| BackgroundError::ClientDir(e.to_string()))
                            }));
                        }

                        let client_dir = client.client_classes_dir.clone();
                        let copy_src = read_only.clone();
                        handles.push(io.spawn_blocking(move || {
                            fsops::copy_directory_tree(&copy_src, &client_dir, &BTreeSet::new())
                                .map(|_| ())
                                .map_err(|e| BackgroundError::ClientDir(e.to_string()))
                        }));

                        let persist = persist_if_absent(
                            &io,
                            &persist_memo,
                            &store,
                            &analysis_out,
                            previous_contents,
                        );

                        let (joined, persisted) = tokio::join!(join_settled(handles), persist);
                        joined.and(persisted)
                    };
                    finish_reporting(&client, work).await
                }
                .instrument(span),
            )
        })
    }

    /// Tasks for a compile that produced a new analysis.
    ///
    /// Phase A persists the rebased analysis (shared across clients) and
    /// runs the registered success factories. Phase B, strictly after A,
    /// copies the read-only directory into the client directory under the
    /// deny set and prunes the stale counterparts (invalidated files with
    /// no regenerated replacement) from the client directory.
    pub(crate) fn for_success(
        &self,
        rebased_contents: AnalysisContents,
        copy_deny: BTreeSet<PathBuf>,
        stale: BTreeSet<PathBuf>,
        success_factories: Vec<BackgroundTaskFactory>,
        previous_problems: Vec<Problem>,
        status: StatusCode,
    ) -> CompileBackgroundTasks {
        let read_only = self.read_only_classes_dir.clone();
        let analysis_out = self.analysis_out.clone();
        let store = Arc::clone(&self.store);
        let io = self.io.clone();
        let persist_memo: Arc<OnceCell<Result<(), BackgroundError>>> = Arc::new(OnceCell::new());

        CompileBackgroundTasks::new(move |client: ClientContext| {
            let read_only = read_only.clone();
            let analysis_out = analysis_out.clone();
            let store = Arc::clone(&store);
            let io = io.clone();
            let persist_memo = Arc::clone(&persist_memo);
            let rebased_contents = rebased_contents.clone();
            let copy_deny = copy_deny.clone();
            let stale = stale.clone();
            let factories = success_factories.clone();
            let previous_problems = previous_problems.clone();

            let span = info_span!(
                "background_tasks",
                outcome = "success",
                client = %client.client_classes_dir.display()
            );
            Box::pin(
                async move {
                    client.reporter.process_end_compilation(
                        previous_problems,
                        status,
                        Some(&client.client_classes_dir),
                        Some(&analysis_out),
                    );

                    let work = async {
                        // Phase A: shared analysis write plus per-client
                        // factories.
                        let persist = persist_memoized(
                            &io,
                            &persist_memo,
                            &store,
                            &analysis_out,
                            rebased_contents,
                        );
                        let factory_handles = factories
                            .iter()
                            .map(|factory| io.spawn(factory(&client)))
                            .collect::<Vec<_>>();
                        let (persisted, factories_done) =
                            tokio::join!(persist, join_settled(factory_handles));
                        persisted.and(factories_done)?;

                        // Phase B: publish into the client directory.
                        let copy_client = client.client_classes_dir.clone();
                        let copy_src = read_only.clone();
                        let copy = io.spawn_blocking(move || {
                            fsops::copy_directory_tree(&copy_src, &copy_client, &copy_deny)
                                .map(|_| ())
                                .map_err(|e| BackgroundError::ClientDir(e.to_string()))
                        });
                        let delete_client = client.client_classes_dir.clone();
                        let delete_src = read_only.clone();
                        let delete = io.spawn_blocking(move || {
                            fsops::delete_invalidated_in_client_dir(
                                &stale,
                                &delete_src,
                                &delete_client,
                            )
                            .map(|_| ())
                            .map_err(|e| BackgroundError::ClientDir(e.to_string()))
                        });
                        join_settled(vec![copy, delete]).await
                    };
                    finish_reporting(&client, work).await
                }
                .instrument(span),
            )
        })
    }

    /// Tasks for a failed or cancelled compile.
    ///
    /// Runs the registered failure factories so half-written artifacts are
    /// cleaned up per client.
    pub(crate) fn for_failure(
        &self,
        failure_factories: Vec<BackgroundTaskFactory>,
        previous_problems: Vec<Problem>,
    ) -> CompileBackgroundTasks {
        let io = self.io.clone();

        CompileBackgroundTasks::new(move |client: ClientContext| {
            let io = io.clone();
            let factories = failure_factories.clone();
            let previous_problems = previous_problems.clone();

            let span = info_span!(
                "background_tasks",
                outcome = "failure",
                client = %client.client_classes_dir.display()
            );
            Box::pin(
                async move {
                    client.reporter.process_end_compilation(
                        previous_problems,
                        StatusCode::Error,
                        None,
                        None,
                    );

                    let work = async {
                        let handles = factories
                            .iter()
                            .map(|factory| io.spawn(factory(&client)))
                            .collect::<Vec<_>>();
                        join_settled(handles).await
                    };
                    finish_reporting(&client, work).await
                }
                .instrument(span),
            )
        })
    }
}

/// Persists `contents` at most once across all clients.
async fn persist_memoized(
    io: &Handle,
    memo: &OnceCell<Result<(), BackgroundError>>,
    store: &Arc<dyn AnalysisStore>,
    analysis_out: &Path,
    contents: AnalysisContents,
) -> Result<(), BackgroundError> {
    let store = Arc::clone(store);
    let out = analysis_out.to_path_buf();
    memo.get_or_init(|| async move {
        let joined = io
            .spawn_blocking(move || {
                store
                    .store(&out, &contents)
                    .map(|_| ())
                    .map_err(|e| BackgroundError::Persist(e.to_string()))
            })
            .await;
        match joined {
            Ok(result) => result,
            Err(join) => Err(BackgroundError::Join(join.to_string())),
        }
    })
    .await
    .clone()
}

/// Persists `contents` at most once, and only when no analysis file exists
/// on disk and a previous analysis is actually available.
async fn persist_if_absent(
    io: &Handle,
    memo: &OnceCell<Result<(), BackgroundError>>,
    store: &Arc<dyn AnalysisStore>,
    analysis_out: &Path,
    contents: Option<AnalysisContents>,
) -> Result<(), BackgroundError> {
    let Some(contents) = contents else {
        return Ok(());
    };
    if analysis_out.exists() {
        return Ok(());
    }
    persist_memoized(io, memo, store, analysis_out, contents).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn empty_handle_is_a_no_op() {
        let tasks = CompileBackgroundTasks::empty();
        let client = ClientContext {
            client_classes_dir: PathBuf::from("/tmp/unused"),
            reporter: Arc::new(crate::reporter::TracingReporter::new()),
        };
        tasks.trigger(client).await.unwrap();
    }

    #[tokio::test]
    async fn join_settled_returns_first_error_after_all_settle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&counter);
        let c2 = Arc::clone(&counter);
        let handles = vec![
            tokio::spawn(async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Err(BackgroundError::Task("first".to_string()))
            }),
            tokio::spawn(async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let result = join_settled(handles).await;
        assert!(matches!(result, Err(BackgroundError::Task(msg)) if msg == "first"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
