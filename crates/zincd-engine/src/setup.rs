//! Compile options, setup, and previous-result types exchanged with the
//! engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analysis::Analysis;

/// Order in which mixed Scala/Java sources are fed to the compilers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileOrder {
    /// Scala and Java sources are compiled together.
    #[default]
    Mixed,
    /// Java sources are compiled before Scala sources.
    JavaThenScala,
    /// Scala sources are compiled before Java sources.
    ScalaThenJava,
}

/// Hash of a single classpath entry.
///
/// Hashing itself is performed upstream of the orchestrator; these values
/// are carried through so the engine can skip its expensive classpath
/// comparison when they match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    /// The classpath entry.
    pub file: PathBuf,
    /// Hash of the entry's contents.
    pub hash: i64,
}

impl FileHash {
    /// Creates a classpath entry hash.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, hash: i64) -> Self {
        Self {
            file: file.into(),
            hash,
        }
    }
}

/// Classpath handling flags forwarded to the engine verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClasspathOptions {
    /// Prepend the Scala library to the boot classpath.
    pub boot_library: bool,
    /// Add the compiler jar to the classpath.
    pub compiler: bool,
    /// Add extra jars shipped with the compiler to the classpath.
    pub extra: bool,
    /// Let the compiler resolve its own boot classpath.
    pub auto_boot: bool,
    /// Filter the Scala library out of the user classpath.
    pub filter_library: bool,
}

impl Default for ClasspathOptions {
    /// Defaults match a plain javac-style invocation where the build tool
    /// manages the whole classpath.
    fn default() -> Self {
        Self {
            boot_library: false,
            compiler: false,
            extra: false,
            auto_boot: false,
            filter_library: false,
        }
    }
}

/// Options for one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Directory the engine writes class files to. Always the fresh per-run
    /// directory, never a shared one.
    pub classes_dir: PathBuf,
    /// Source files to compile.
    pub sources: Vec<PathBuf>,
    /// Compilation classpath.
    pub classpath: Vec<PathBuf>,
    /// Options for the Scala compiler.
    pub scalac_options: Vec<String>,
    /// Options for the Java compiler.
    pub javac_options: Vec<String>,
    /// Mixed-compilation order.
    pub order: CompileOrder,
    /// Hashes of the classpath entries, when known.
    pub classpath_hashes: Vec<FileHash>,
}

/// Incremental-compilation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalOptions {
    /// Whether incremental compilation is enabled. When disabled the engine
    /// recompiles everything on every run but still produces an analysis.
    pub enabled: bool,
}

impl Default for IncrementalOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl IncrementalOptions {
    /// Options with incremental compilation turned off.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { enabled: false }
    }
}

/// The setup the engine records alongside an analysis.
///
/// A later run compares its own setup against this one to decide whether
/// the previous analysis is still usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setup {
    /// Classes directory of the recorded run.
    pub classes_dir: PathBuf,
    /// Scala compiler options of the recorded run.
    pub scalac_options: Vec<String>,
    /// Java compiler options of the recorded run.
    pub javac_options: Vec<String>,
    /// Mixed-compilation order of the recorded run.
    pub order: CompileOrder,
    /// Classpath hashes of the recorded run.
    pub classpath_hashes: Vec<FileHash>,
}

/// The previous engine result a new run starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousResult {
    /// Analysis of the previous run, if any.
    pub analysis: Option<Analysis>,
    /// Setup of the previous run, if any.
    pub setup: Option<Setup>,
}

impl PreviousResult {
    /// A previous result with nothing in it, used for cold compiles.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            analysis: None,
            setup: None,
        }
    }

    /// Wraps an analysis and setup produced by a finished run.
    #[must_use]
    pub const fn new(analysis: Analysis, setup: Setup) -> Self {
        Self {
            analysis: Some(analysis),
            setup: Some(setup),
        }
    }
}

/// Descriptor of the inputs that uniquely identify one compile.
///
/// Used by the engine's caches and surfaced in successful results so
/// downstream deduplication can tell identical requests apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueInputs {
    /// Source files of the compile.
    pub sources: Vec<PathBuf>,
    /// Hashes of the classpath entries.
    pub classpath_hashes: Vec<FileHash>,
    /// Scala compiler options.
    pub scalac_options: Vec<String>,
    /// Java compiler options.
    pub javac_options: Vec<String>,
}
