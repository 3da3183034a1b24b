//! Analysis artifact data model.
//!
//! The analysis is the structured record of the last compile. The engine
//! reads it to decide what to recompile and writes an updated one after every
//! run. The orchestrator treats it as a value: it rebases product paths,
//! forces recompilation of selected sources by emptying their stamps, and
//! compares analyses structurally to detect no-op compiles.
//!
//! # Invariants
//!
//! - Structural equality of two analyses is authoritative for the no-op
//!   check. Two runs over identical inputs must produce equal analyses.
//! - All maps are ordered so that serialization is deterministic and
//!   equality does not depend on insertion order.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::problem::Problem;

/// A per-file fingerprint used by the engine to detect change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stamp {
    /// Content hash of the file.
    Hash {
        /// Hex digest of the file contents.
        digest: String,
    },
    /// Last-modified timestamp of the file.
    LastModified {
        /// Milliseconds since the Unix epoch.
        millis: u64,
    },
    /// Sentinel stamp that never matches the on-disk state, forcing the
    /// engine to recompile the stamped file on the next run.
    Empty,
}

impl Stamp {
    /// Returns the empty sentinel stamp.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// Returns `true` if this is the empty sentinel.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Stamps for the three file domains the engine tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamps {
    /// Stamps of compiled source files.
    pub sources: BTreeMap<PathBuf, Stamp>,
    /// Stamps of produced class files and extra compile products.
    pub products: BTreeMap<PathBuf, Stamp>,
    /// Stamps of classpath library entries.
    pub libraries: BTreeMap<PathBuf, Stamp>,
}

impl Stamps {
    fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.products.is_empty() && self.libraries.is_empty()
    }
}

/// Relations recorded by the engine during a compile.
///
/// Only the source-to-product relation matters to the orchestrator; it must
/// be rewritten in lockstep with the product stamps when the analysis is
/// rebased onto a different classes directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relations {
    /// Products generated for each source file.
    pub products: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl Relations {
    fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Structured record of the last compile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Analysis {
    /// Per-file stamps.
    pub stamps: Stamps,
    /// Source-to-product relations.
    pub relations: Relations,
    /// Diagnostics reported for each source during the recorded compile.
    ///
    /// Recovered as "previous problems" when a later compile starts from
    /// this analysis.
    pub source_problems: BTreeMap<PathBuf, Vec<Problem>>,
}

impl Analysis {
    /// Returns the empty analysis.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if this analysis records nothing.
    ///
    /// An empty analysis is never persisted to disk.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty() && self.relations.is_empty() && self.source_problems.is_empty()
    }

    /// Returns every problem recorded for any source, in source order.
    #[must_use]
    pub fn all_problems(&self) -> Vec<Problem> {
        self.source_problems.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Severity;

    fn analysis_with_one_product() -> Analysis {
        let mut analysis = Analysis::empty();
        analysis.stamps.sources.insert(
            PathBuf::from("/src/A.scala"),
            Stamp::Hash {
                digest: "abc".to_string(),
            },
        );
        analysis.stamps.products.insert(
            PathBuf::from("/classes/A.class"),
            Stamp::LastModified { millis: 42 },
        );
        analysis.relations.products.insert(
            PathBuf::from("/src/A.scala"),
            [PathBuf::from("/classes/A.class")].into_iter().collect(),
        );
        analysis
    }

    #[test]
    fn empty_analysis_is_empty() {
        assert!(Analysis::empty().is_empty());
        assert!(!analysis_with_one_product().is_empty());
    }

    #[test]
    fn empty_stamp_sentinel() {
        assert!(Stamp::empty().is_empty());
        assert!(!Stamp::LastModified { millis: 0 }.is_empty());
    }

    #[test]
    fn structural_equality_ignores_insertion_order() {
        let mut a = Analysis::empty();
        a.stamps
            .sources
            .insert(PathBuf::from("/src/B.scala"), Stamp::empty());
        a.stamps
            .sources
            .insert(PathBuf::from("/src/A.scala"), Stamp::empty());

        let mut b = Analysis::empty();
        b.stamps
            .sources
            .insert(PathBuf::from("/src/A.scala"), Stamp::empty());
        b.stamps
            .sources
            .insert(PathBuf::from("/src/B.scala"), Stamp::empty());

        assert_eq!(a, b);
    }

    #[test]
    fn all_problems_flattens_in_source_order() {
        let mut analysis = analysis_with_one_product();
        analysis.source_problems.insert(
            PathBuf::from("/src/B.scala"),
            vec![Problem::new(Severity::Warning, "unused import")],
        );
        analysis.source_problems.insert(
            PathBuf::from("/src/A.scala"),
            vec![Problem::new(Severity::Error, "not found: value x")],
        );

        let all = analysis.all_problems();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "not found: value x");
        assert_eq!(all[1].message, "unused import");
    }

    #[test]
    fn analysis_round_trips_through_json() {
        let analysis = analysis_with_one_product();
        let json = serde_json::to_string(&analysis).unwrap();
        let back: Analysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, analysis);
    }
}
