//! # zincd-compile
//!
//! Per-project incremental compilation orchestrator for the zincd build
//! server. For each compile request it stages output into an isolated
//! per-run directory, drives the external incremental engine with the right
//! inputs, reporter, and progress/cancellation hooks, detects no-op
//! outcomes, rebases the engine's analysis artifact onto the staged
//! directory, and schedules the post-compile I/O that publishes results to
//! client-visible directories.
//!
//! ## Features
//!
//! - **Path layout**: stable external directories for clients, fresh
//!   run-unique internal directories for the engine, and the empty-dir
//!   sentinel convention
//! - **Cancellation**: a request-scoped one-shot flag observed by the
//!   engine through the progress adapter
//! - **Analysis rebasing**: pure rewrite of product paths and
//!   fatal-warning stamps so a persisted analysis advertises the
//!   authoritative directory
//! - **Background tasks**: deferred per-client publication with ordered
//!   phases, a shared memoized analysis write, and end-of-compilation
//!   reporting on success and error alike
//!
//! ## Example
//!
//! ```rust,ignore
//! use zincd_compile::{CompileConfig, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(engine, store, CompileConfig::from_env(java_home, 21));
//! let result = orchestrator.compile(request).await;
//! assert!(result.is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod background;
pub mod cancel;
pub mod classfiles;
pub mod config;
pub mod fsops;
pub mod jdk;
pub mod orchestrator;
pub mod paths;
pub mod progress;
pub mod rebase;
pub mod refresh;
pub mod reporter;
pub mod result;

pub use background::{
    BackgroundError, BackgroundTaskFactory, ClientContext, ClientTaskFuture,
    CompileBackgroundTasks,
};
pub use cancel::CancelHandle;
pub use classfiles::{BookkeepingClassFileManager, CompileBookkeeping};
pub use config::CompileConfig;
pub use orchestrator::{CompileRequest, CompileSchedulers, Orchestrator};
pub use paths::CompileOutPaths;
pub use progress::ProgressAdapter;
pub use reporter::TracingReporter;
pub use result::{CompileProducts, ResultKind};
