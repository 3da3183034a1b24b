//! Refreshes a previous result with the latest classpath hashes.
//!
//! A no-op compile returns the previous result unchanged except for the
//! classpath hashes embedded in its setup. Substituting the current hashes
//! means the engine's expensive classpath equivalence check is paid once
//! and skipped on every following no-op compile over the same inputs.

use zincd_engine::{FileHash, PreviousResult, UniqueInputs};

/// Returns `previous` with its setup carrying the classpath hashes of
/// `inputs`, restricted to non-directory entries.
///
/// Directory entries are dropped because their hashes go stale without the
/// file itself changing; the engine re-checks directories every time
/// regardless. A previous result without a setup is returned unchanged.
#[must_use]
pub fn refresh_classpath_hashes(previous: &PreviousResult, inputs: &UniqueInputs) -> PreviousResult {
    let mut refreshed = previous.clone();
    if let Some(setup) = refreshed.setup.as_mut() {
        setup.classpath_hashes = inputs
            .classpath_hashes
            .iter()
            .filter(|hash| !hash.file.is_dir())
            .cloned()
            .collect::<Vec<FileHash>>();
    }
    refreshed
}
