//! Per-run bookkeeping and the engine-facing class file manager hook.
//!
//! One compile owns one [`CompileBookkeeping`] value. The engine populates
//! it through [`BookkeepingClassFileManager`] while compiling; the
//! background task builder consumes it verbatim afterwards. Nothing in here
//! is shared across compiles.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::debug;
use zincd_engine::ClassFileManager;

use crate::background::{BackgroundError, BackgroundTaskFactory, ClientContext};
use crate::fsops;

/// Mutable state accumulated during one compile.
#[derive(Default)]
pub struct CompileBookkeeping {
    /// Generated class files keyed by their path relative to the new
    /// classes directory. Downstream consumers discover generated
    /// artifacts through this map.
    pub generated_relative_paths: BTreeMap<String, PathBuf>,
    /// Read-only entries the post-compile copier must not overwrite into
    /// the client directory.
    pub read_only_copy_denylist: BTreeSet<PathBuf>,
    /// Class files invalidated by this run.
    pub invalidated_class_files: BTreeSet<PathBuf>,
    /// Extra compile products invalidated by this run.
    pub invalidated_extra_products: BTreeSet<PathBuf>,
    /// Tasks to run, per client, only when the run produced a new analysis.
    pub on_success_factories: Vec<BackgroundTaskFactory>,
    /// Tasks to run, per client, when the compilation failed.
    pub on_failure_factories: Vec<BackgroundTaskFactory>,
}

impl std::fmt::Debug for CompileBookkeeping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileBookkeeping")
            .field("generated_relative_paths", &self.generated_relative_paths)
            .field("read_only_copy_denylist", &self.read_only_copy_denylist)
            .field("invalidated_class_files", &self.invalidated_class_files)
            .field(
                "invalidated_extra_products",
                &self.invalidated_extra_products,
            )
            .field("on_success_factories", &self.on_success_factories.len())
            .field("on_failure_factories", &self.on_failure_factories.len())
            .finish()
    }
}

impl CompileBookkeeping {
    /// Union of invalidated class files and invalidated extra products.
    #[must_use]
    pub fn all_invalidated(&self) -> BTreeSet<PathBuf> {
        self.invalidated_class_files
            .union(&self.invalidated_extra_products)
            .cloned()
            .collect()
    }
}

/// The class file manager installed into every engine invocation.
///
/// Invalidated files under the fresh new directory are moved aside into a
/// run-private temp directory and restored when the run fails, so a failed
/// incremental pass cannot leave the new directory half-invalidated.
/// Invalidated files under the read-only directory are never touched on
/// disk; they only join the copy denylist.
pub struct BookkeepingClassFileManager {
    read_only_classes_dir: PathBuf,
    new_classes_dir: PathBuf,
    dependent_generated: BTreeSet<PathBuf>,
    backup_dir: TempDir,
    moved_aside: Vec<(PathBuf, PathBuf)>,
    bookkeeping: CompileBookkeeping,
}

impl std::fmt::Debug for BookkeepingClassFileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookkeepingClassFileManager")
            .field("read_only_classes_dir", &self.read_only_classes_dir)
            .field("new_classes_dir", &self.new_classes_dir)
            .field("moved_aside", &self.moved_aside.len())
            .field("bookkeeping", &self.bookkeeping)
            .finish()
    }
}

impl BookkeepingClassFileManager {
    /// Creates a manager for one run.
    ///
    /// `invalidated_by_dependents` seeds the invalidated set with class
    /// files dependent projects already invalidated, so the copy and delete
    /// phases treat them like this run's own invalidations. Files in
    /// `generated_by_dependents` belong to other projects; they are
    /// recorded when invalidated but never touched on disk.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the private temp directory
    /// cannot be created.
    pub fn new(
        read_only_classes_dir: impl Into<PathBuf>,
        new_classes_dir: impl Into<PathBuf>,
        invalidated_by_dependents: BTreeSet<PathBuf>,
        generated_by_dependents: BTreeSet<PathBuf>,
    ) -> std::io::Result<Self> {
        let bookkeeping = CompileBookkeeping {
            invalidated_class_files: invalidated_by_dependents,
            ..CompileBookkeeping::default()
        };
        Ok(Self {
            read_only_classes_dir: read_only_classes_dir.into(),
            new_classes_dir: new_classes_dir.into(),
            dependent_generated: generated_by_dependents,
            backup_dir: tempfile::tempdir()?,
            moved_aside: Vec::new(),
            bookkeeping,
        })
    }

    /// Registers a task to run, per client, only after a successful new
    /// analysis.
    pub fn add_on_success_task(&mut self, factory: BackgroundTaskFactory) {
        self.bookkeeping.on_success_factories.push(factory);
    }

    /// Registers a task to run, per client, when the compilation fails.
    pub fn add_on_failure_task(&mut self, factory: BackgroundTaskFactory) {
        self.bookkeeping.on_failure_factories.push(factory);
    }

    /// Records an invalidated extra compile product.
    pub fn invalidate_extra_product(&mut self, product: impl Into<PathBuf>) {
        self.bookkeeping
            .invalidated_extra_products
            .insert(product.into());
    }

    /// Consumes the manager and yields the accumulated bookkeeping.
    #[must_use]
    pub fn into_bookkeeping(self) -> CompileBookkeeping {
        self.bookkeeping
    }
}

impl ClassFileManager for BookkeepingClassFileManager {
    fn delete(&mut self, class_files: &[PathBuf]) {
        for file in class_files {
            self.bookkeeping
                .invalidated_class_files
                .insert(file.clone());
            if self.dependent_generated.contains(file) {
                // Another project owns this file; recording it is enough.
            } else if file.starts_with(&self.read_only_classes_dir) {
                // Never mutate the read-only directory; keeping the entry
                // out of the copy is enough.
                self.bookkeeping
                    .read_only_copy_denylist
                    .insert(file.clone());
            } else if file.starts_with(&self.new_classes_dir) && file.exists() {
                let backup = self
                    .backup_dir
                    .path()
                    .join(format!("{}", self.moved_aside.len()));
                if std::fs::rename(file, &backup).is_ok() {
                    self.moved_aside.push((file.clone(), backup));
                }
            }
        }
    }

    fn generated(&mut self, class_files: &[PathBuf]) {
        for file in class_files {
            let Ok(relative) = file.strip_prefix(&self.new_classes_dir) else {
                continue;
            };
            self.bookkeeping
                .generated_relative_paths
                .insert(relative.to_string_lossy().into_owned(), file.clone());

            // A counterpart in the read-only directory is now stale; the
            // copier must not resurrect it over the regenerated file.
            let read_only_counterpart = self.read_only_classes_dir.join(relative);
            if read_only_counterpart.exists() {
                self.bookkeeping
                    .read_only_copy_denylist
                    .insert(read_only_counterpart);
            }
        }
    }

    fn complete(&mut self, success: bool) {
        if !success {
            for (original, backup) in self.moved_aside.drain(..) {
                if let Err(e) = std::fs::rename(&backup, &original) {
                    debug!(
                        file = %original.display(),
                        error = %e,
                        "failed to restore class file after failed run"
                    );
                }
            }
            return;
        }

        self.moved_aside.clear();

        // Changed outputs live only in the new directory; the read-only
        // copy cannot publish them. Register their publication as a
        // per-client task gated on the new analysis.
        let generated = self.bookkeeping.generated_relative_paths.clone();
        if generated.is_empty() {
            return;
        }
        self.bookkeeping
            .on_success_factories
            .push(Arc::new(move |client: &ClientContext| {
                let generated = generated.clone();
                let client_dir = client.client_classes_dir.clone();
                Box::pin(async move {
                    for (relative, source) in &generated {
                        fsops::copy_file(source, &client_dir.join(relative))
                            .map_err(|e| BackgroundError::ClientDir(e.to_string()))?;
                    }
                    Ok(())
                })
            }));
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn manager(root: &Path) -> BookkeepingClassFileManager {
        BookkeepingClassFileManager::new(
            root.join("read-only"),
            root.join("new"),
            BTreeSet::new(),
            BTreeSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn generated_records_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let generated = tmp.path().join("new/pkg/A.class");
        write(&generated, "a");

        mgr.generated(&[generated.clone()]);

        let bookkeeping = mgr.into_bookkeeping();
        let recorded = bookkeeping
            .generated_relative_paths
            .iter()
            .map(|(rel, path)| (rel.clone(), path.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            recorded,
            vec![(
                Path::new("pkg/A.class").to_string_lossy().into_owned(),
                generated
            )]
        );
    }

    #[test]
    fn regenerated_read_only_counterpart_joins_denylist() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let stale = tmp.path().join("read-only/pkg/A.class");
        write(&stale, "old");
        let fresh = tmp.path().join("new/pkg/A.class");
        write(&fresh, "new");

        mgr.generated(&[fresh]);

        let bookkeeping = mgr.into_bookkeeping();
        assert!(bookkeeping.read_only_copy_denylist.contains(&stale));
        // The read-only file itself is untouched.
        assert_eq!(std::fs::read_to_string(&stale).unwrap(), "old");
    }

    #[test]
    fn deleted_read_only_files_are_denied_not_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let invalidated = tmp.path().join("read-only/B.class");
        write(&invalidated, "b");

        mgr.delete(&[invalidated.clone()]);

        assert!(invalidated.exists());
        let bookkeeping = mgr.into_bookkeeping();
        assert!(bookkeeping.read_only_copy_denylist.contains(&invalidated));
        assert!(bookkeeping.invalidated_class_files.contains(&invalidated));
    }

    #[test]
    fn failed_run_restores_moved_class_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let file = tmp.path().join("new/C.class");
        write(&file, "c");

        mgr.delete(&[file.clone()]);
        assert!(!file.exists());

        mgr.complete(false);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "c");
    }

    #[test]
    fn successful_run_discards_moved_class_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let file = tmp.path().join("new/C.class");
        write(&file, "c");

        mgr.delete(&[file.clone()]);
        mgr.complete(true);
        assert!(!file.exists());
    }

    #[test]
    fn dependent_invalidations_seed_the_set() {
        let tmp = tempfile::tempdir().unwrap();
        let seeded: BTreeSet<PathBuf> = [tmp.path().join("read-only/D.class")]
            .into_iter()
            .collect();
        let mgr = BookkeepingClassFileManager::new(
            tmp.path().join("read-only"),
            tmp.path().join("new"),
            seeded.clone(),
            BTreeSet::new(),
        )
        .unwrap();

        assert_eq!(mgr.into_bookkeeping().invalidated_class_files, seeded);
    }

    #[tokio::test]
    async fn successful_completion_registers_publication_of_generated_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let generated = tmp.path().join("new/pkg/A.class");
        write(&generated, "fresh");

        mgr.generated(&[generated]);
        mgr.complete(true);

        let bookkeeping = mgr.into_bookkeeping();
        assert_eq!(bookkeeping.on_success_factories.len(), 1);

        let client_dir = tmp.path().join("client");
        let client = ClientContext {
            client_classes_dir: client_dir.clone(),
            reporter: Arc::new(crate::reporter::TracingReporter::new()),
        };
        bookkeeping.on_success_factories[0](&client).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(client_dir.join("pkg/A.class")).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn dependent_generated_files_are_never_touched() {
        let tmp = tempfile::tempdir().unwrap();
        let foreign = tmp.path().join("other-project/new/E.class");
        write(&foreign, "e");
        let mut mgr = BookkeepingClassFileManager::new(
            tmp.path().join("read-only"),
            tmp.path().join("new"),
            BTreeSet::new(),
            [foreign.clone()].into_iter().collect(),
        )
        .unwrap();

        mgr.delete(&[foreign.clone()]);

        assert!(foreign.exists());
        let bookkeeping = mgr.into_bookkeeping();
        assert!(bookkeeping.invalidated_class_files.contains(&foreign));
        assert!(bookkeeping.read_only_copy_denylist.is_empty());
    }

    #[test]
    fn all_invalidated_unions_both_sets() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let class_file = tmp.path().join("read-only/A.class");
        write(&class_file, "a");
        mgr.delete(&[class_file.clone()]);
        mgr.invalidate_extra_product(tmp.path().join("read-only/A.sjsir"));

        let bookkeeping = mgr.into_bookkeeping();
        let all = bookkeeping.all_invalidated();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&class_file));
    }
}
