//! # zincd-engine
//!
//! The engine seam for the zincd build server: every type the external
//! incremental-compilation engine exchanges with the compile orchestrator
//! lives behind this crate so that the orchestrator can be driven against a
//! fake engine in tests.
//!
//! ## Features
//!
//! - **Analysis model**: stamps, relations, and per-source diagnostics with
//!   structural equality (the engine's equality is authoritative for no-op
//!   detection)
//! - **Compile setup**: options, incremental toggles, previous results, and
//!   the unique-inputs descriptor used for cache keying
//! - **Engine trait**: the compile entry point with its progress and
//!   class-file-manager callbacks
//! - **Analysis store**: atomic persistence of the analysis artifact
//!
//! ## Example
//!
//! ```rust,no_run
//! use zincd_engine::{Analysis, PreviousResult};
//!
//! let previous = PreviousResult::empty();
//! assert!(previous.analysis.is_none());
//! assert!(Analysis::empty().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod analysis;
pub mod engine;
pub mod problem;
pub mod reporter;
pub mod setup;
pub mod store;

pub use analysis::{Analysis, Relations, Stamp, Stamps};
pub use engine::{
    ClassFileManager, CompileProgress, EngineError, EngineInputs, EngineOutput, IncrementalEngine,
    ResultLookup,
};
pub use problem::{flatten_problems, union_problems, Problem, ProblemsPerPhase, Severity};
pub use reporter::{Reporter, StatusCode};
pub use setup::{
    ClasspathOptions, CompileOptions, CompileOrder, FileHash, IncrementalOptions, PreviousResult,
    Setup, UniqueInputs,
};
pub use store::{AnalysisContents, AnalysisStore, JsonAnalysisStore, StoreError};
