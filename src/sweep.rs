//! Orphan sweep: remove everything traceable to a source root.
//!
//! Finds every artifact across a set of target roots that traces back to a
//! given source root — through the ledger, or by probing for symlinks that
//! resolve into it — and removes them in parallel, each removal independent
//! and individually fault-tolerant. Emptied directories are pruned without
//! ever deleting a protected target root or ascending above one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::executor::DeploymentExecutor;
use crate::fsops;
use crate::model::TransferMode;
use crate::pathnorm;
use crate::registry::Registry;

/// Outcome of a sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Whether anything was removed.
    pub any_removed: bool,
    /// Targets that could not be removed; siblings were still processed.
    pub failed: Vec<PathBuf>,
}

/// Removes every artifact under a set of target roots that traces back to
/// one source root.
pub struct SweepCleaner<'a> {
    registry: &'a dyn Registry,
}

impl std::fmt::Debug for SweepCleaner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepCleaner").finish_non_exhaustive()
    }
}

impl<'a> SweepCleaner<'a> {
    /// Cleaner consulting (and updating) `registry`.
    #[must_use]
    pub const fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Remove every artifact tracing back to `source_root` across
    /// `target_roots`, then prune emptied directories.
    ///
    /// The target roots themselves are protected: they are never deleted
    /// and pruning never ascends past them.
    #[must_use]
    pub fn sweep(&self, source_root: &Path, target_roots: &[PathBuf]) -> SweepReport {
        let mut candidates: BTreeMap<String, PathBuf> = BTreeMap::new();

        // Ledger first: everything we know we created from this source.
        for record in self.registry.artifacts_under_source(source_root) {
            candidates.insert(pathnorm::norm_key(&record.target), record.target);
        }
        // Filesystem fallback: links that resolve into the source root but
        // were never recorded (or whose records were lost).
        for root in target_roots {
            collect_links_into(root, source_root, &mut candidates);
        }
        debug!(
            source = %source_root.display(),
            candidates = candidates.len(),
            "sweep candidates gathered"
        );

        let executor = DeploymentExecutor::new(self.registry, target_roots.to_vec());
        let outcomes: Vec<(PathBuf, bool)> = candidates
            .into_values()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|target| {
                // A stale ledger entry whose target is already gone is not
                // a failure; just drop the record.
                if !fsops::entry_exists(&target) {
                    if let Err(e) = self.registry.remove_artifact(&target) {
                        warn!(target = %target.display(), error = %e,
                            "could not drop stale artifact record");
                    }
                    return (target, true);
                }
                match executor.undeploy(&target, TransferMode::Symlink, Some(source_root)) {
                    Ok(_) => (target, true),
                    Err(e) => {
                        warn!(target = %target.display(), error = %e, "sweep removal failed");
                        (target, false)
                    }
                }
            })
            .collect();

        let mut report = SweepReport::default();
        for (target, ok) in outcomes {
            if ok {
                report.any_removed = true;
            } else {
                report.failed.push(target);
            }
        }
        report
    }
}

/// Recursively collect symlinks under `dir` resolving into `source_root`.
fn collect_links_into(dir: &Path, source_root: &Path, out: &mut BTreeMap<String, PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        if meta.is_symlink() {
            if let Ok(dest) = std::fs::read_link(&path) {
                let resolved = pathnorm::absolutize_link_dest(&path, &dest);
                if pathnorm::is_within(&resolved, source_root) {
                    out.insert(pathnorm::norm_key(&path), path);
                }
            }
        } else if meta.is_dir() {
            collect_links_into(&path, source_root, out);
        }
    }
}
