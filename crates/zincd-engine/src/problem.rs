//! Compiler diagnostics as reported by the engine.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Diagnostic severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational message.
    Info,
    /// Warning. May be promoted to an error by build policy.
    #[default]
    Warning,
    /// Error.
    Error,
}

/// A single compiler diagnostic.
///
/// Identity (equality and hashing) covers every field, which is what the
/// orchestrator relies on when it unions reporter-tracked and
/// engine-reported problems without duplicating entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Rendered message.
    pub message: String,
    /// Source file the diagnostic points at, when known.
    pub source: Option<PathBuf>,
    /// One-based line number, when known.
    pub line: Option<u32>,
}

impl Problem {
    /// Creates a problem with no position information.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source: None,
            line: None,
        }
    }

    /// Attaches a source position to the problem.
    #[must_use]
    pub fn at(mut self, source: impl Into<PathBuf>, line: u32) -> Self {
        self.source = Some(source.into());
        self.line = Some(line);
        self
    }

    /// Returns `true` if the diagnostic is an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

/// Diagnostics grouped by the compiler phase that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemsPerPhase {
    /// Compiler phase name (for example `typer`).
    pub phase: String,
    /// Diagnostics reported during the phase.
    pub problems: Vec<Problem>,
}

impl ProblemsPerPhase {
    /// Groups `problems` under a single phase.
    #[must_use]
    pub fn new(phase: impl Into<String>, problems: Vec<Problem>) -> Self {
        Self {
            phase: phase.into(),
            problems,
        }
    }
}

/// Unions two per-phase problem collections, preserving `known` order and
/// appending only the `reported` problems not already present.
///
/// Problem identity is full structural equality, so the same diagnostic
/// observed through the reporter and through the engine's failure payload
/// appears once in the result.
#[must_use]
pub fn union_problems(
    known: Vec<ProblemsPerPhase>,
    reported: Vec<ProblemsPerPhase>,
) -> Vec<ProblemsPerPhase> {
    let mut seen: HashSet<Problem> = known
        .iter()
        .flat_map(|group| group.problems.iter().cloned())
        .collect();

    let mut merged = known;
    for group in reported {
        let fresh: Vec<Problem> = group
            .problems
            .into_iter()
            .filter(|problem| seen.insert(problem.clone()))
            .collect();
        if fresh.is_empty() {
            continue;
        }
        if let Some(existing) = merged.iter_mut().find(|g| g.phase == group.phase) {
            existing.problems.extend(fresh);
        } else {
            merged.push(ProblemsPerPhase::new(group.phase, fresh));
        }
    }
    merged
}

/// Flattens per-phase problems into a single list, preserving order.
#[must_use]
pub fn flatten_problems(groups: &[ProblemsPerPhase]) -> Vec<Problem> {
    groups
        .iter()
        .flat_map(|group| group.problems.iter().cloned())
        .collect()
}
