//! Pure rebasing of an analysis onto a different classes directory.
//!
//! Each run writes class files into a fresh directory, but a persisted
//! analysis must advertise paths under the directory that is authoritative
//! after the run, so that downstream projects reading the analysis see a
//! consistent world. Rebasing rewrites product paths from the read-only
//! directory to the new directory while preserving stamp values, since the
//! post-compile copy preserves file metadata.
//!
//! Sources that produced fatal warnings get the empty stamp sentinel
//! instead: their files did not change on disk, but the next run must
//! recompile them to resurface the diagnostics as errors.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use zincd_engine::{Analysis, Stamp};

/// Rewrites `path` from the `from` prefix onto `to`.
///
/// Returns `None` when `path` does not start with `from`. Shared by the
/// rebaser and by the client-directory deletion in the background tasks,
/// which must agree on prefix semantics.
#[must_use]
pub fn rebase_path(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    path.strip_prefix(from).ok().map(|rel| to.join(rel))
}

/// Rebases `analysis` from `read_only_classes_dir` onto `new_classes_dir`.
///
/// - Product stamps whose path starts with the read-only directory move to
///   the new directory; their stamp values are preserved. Products outside
///   the read-only directory are left untouched.
/// - Source stamps of files in `fatal_warning_sources` become the empty
///   sentinel; all other source stamps are untouched.
/// - Source-to-product relations get the same product rewrite.
/// - Library stamps and recorded diagnostics are preserved verbatim.
///
/// Rebasing an analysis already rooted at `new_classes_dir` is a no-op.
#[must_use]
pub fn rebase_analysis(
    analysis: &Analysis,
    read_only_classes_dir: &Path,
    new_classes_dir: &Path,
    fatal_warning_sources: &BTreeSet<PathBuf>,
) -> Analysis {
    let rebase = |path: &Path| -> PathBuf {
        rebase_path(path, read_only_classes_dir, new_classes_dir)
            .unwrap_or_else(|| path.to_path_buf())
    };

    let mut rebased = Analysis::empty();

    rebased.stamps.products = analysis
        .stamps
        .products
        .iter()
        .map(|(path, stamp)| (rebase(path), stamp.clone()))
        .collect();

    rebased.stamps.sources = analysis
        .stamps
        .sources
        .iter()
        .map(|(source, stamp)| {
            let stamp = if fatal_warning_sources.contains(source) {
                Stamp::empty()
            } else {
                stamp.clone()
            };
            (source.clone(), stamp)
        })
        .collect();

    rebased.stamps.libraries = analysis.stamps.libraries.clone();

    rebased.relations.products = analysis
        .relations
        .products
        .iter()
        .map(|(source, products)| {
            let products = products.iter().map(|p| rebase(p)).collect();
            (source.clone(), products)
        })
        .collect();

    rebased.source_problems = analysis.source_problems.clone();

    rebased
}
