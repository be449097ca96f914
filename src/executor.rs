//! Plan execution: parallel apply, and the undeploy inverse.
//!
//! A validated plan is applied one pair per unit of work on a bounded
//! worker pool. The unit of atomicity is the single file: one item's
//! failure never rolls back or blocks its siblings, and callers must
//! tolerate mixed outcomes. Each worker performs its own registry write
//! after its filesystem work; write order across items is not guaranteed.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::conflict::{ConflictResolver, Resolution};
use crate::error::ItemError;
use crate::fsops;
use crate::model::TransferMode;
use crate::pathnorm;
use crate::planner::{DeploymentPlan, PlanPair};
use crate::registry::{ArtifactRecord, Registry};

/// Upper bound on worker threads, independent of core count.
const MAX_WORKERS: usize = 16;

/// Worker pool width: available CPUs, capped at [`MAX_WORKERS`].
fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map_or(4, std::num::NonZeroUsize::get)
        .min(MAX_WORKERS)
}

/// Outcome of applying or skipping one plan pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The artifact was created and recorded.
    Applied,
    /// The item was deliberately not applied.
    Skipped {
        /// Why the item was skipped.
        reason: String,
    },
    /// The item failed; siblings were unaffected.
    Failed(ItemError),
}

/// Per-pair result returned from [`DeploymentExecutor::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    /// Source path of the pair.
    pub source: PathBuf,
    /// Target path of the pair.
    pub target: PathBuf,
    /// What happened.
    pub outcome: ItemOutcome,
}

impl ItemResult {
    /// Whether the item did not fail (applied or skipped).
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        !matches!(self.outcome, ItemOutcome::Failed(_))
    }
}

/// Applies validated plans and undoes recorded artifacts.
pub struct DeploymentExecutor<'a> {
    registry: &'a dyn Registry,
    protected_roots: Vec<PathBuf>,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for DeploymentExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentExecutor")
            .field("protected_roots", &self.protected_roots)
            .finish_non_exhaustive()
    }
}

impl<'a> DeploymentExecutor<'a> {
    /// Executor writing through `registry`, never pruning at or above any
    /// of `protected_roots`.
    #[must_use]
    pub fn new(registry: &'a dyn Registry, protected_roots: Vec<PathBuf>) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count())
            .build()
            .map_err(|e| warn!(error = %e, "dedicated worker pool unavailable, using shared pool"))
            .ok();
        Self {
            registry,
            protected_roots,
            pool,
        }
    }

    /// Apply every pair of a validated plan in parallel.
    ///
    /// Pre-execution validation (collisions, safety) must already have
    /// happened; this function mutates the filesystem. Results are
    /// per-item; a failed item never aborts its siblings.
    #[must_use]
    pub fn apply(&self, plan: &DeploymentPlan) -> Vec<ItemResult> {
        let resolver = ConflictResolver::new(self.registry, plan.conflict_policy, &plan.package);
        let run = || {
            plan.pairs
                .par_iter()
                .map(|pair| self.apply_pair(plan, &resolver, pair))
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn apply_pair(
        &self,
        plan: &DeploymentPlan,
        resolver: &ConflictResolver<'_>,
        pair: &PlanPair,
    ) -> ItemResult {
        let result = |outcome| ItemResult {
            source: pair.source.clone(),
            target: pair.target.clone(),
            outcome,
        };

        if let Err(e) = fsops::ensure_parent_dir(&pair.target) {
            return result(ItemOutcome::Failed(ItemError::Apply {
                target: pair.target.clone(),
                reason: format!("{e:#}"),
            }));
        }

        match resolver.resolve(&pair.target) {
            Err(e) => result(ItemOutcome::Failed(e)),
            Ok(Resolution::Skipped) => result(ItemOutcome::Skipped {
                reason: "existing target kept".to_string(),
            }),
            Ok(Resolution::Ready | Resolution::BackedUp(_)) => {
                let created = match plan.transfer_mode {
                    TransferMode::Symlink => fsops::create_symlink(&pair.source, &pair.target),
                    TransferMode::Copy => fsops::copy_recursive(&pair.source, &pair.target),
                };
                match created {
                    Err(e) => result(ItemOutcome::Failed(ItemError::Apply {
                        target: pair.target.clone(),
                        reason: format!("{e:#}"),
                    })),
                    Ok(()) => {
                        debug!(
                            target = %pair.target.display(),
                            mode = %plan.transfer_mode,
                            "artifact created"
                        );
                        if let Err(e) = self.registry.register_artifact(ArtifactRecord {
                            target: pair.target.clone(),
                            source: pair.source.clone(),
                            package: plan.package.clone(),
                            kind: plan.transfer_mode,
                        }) {
                            warn!(target = %pair.target.display(), error = %e,
                                "artifact created but not recorded");
                        }
                        result(ItemOutcome::Applied)
                    }
                }
            }
        }
    }

    /// Remove the artifact at `target`, restore any backup, and prune
    /// directories the removal emptied.
    ///
    /// A registered artifact is removed unconditionally. An unregistered
    /// symlink is removed only when it resolves into `source_hint` (or
    /// unconditionally when no hint is given). An unregistered directory is
    /// searched for nested links into `source_hint` — folder-mode deploys
    /// can leave those among ordinary user content. Unregistered copies are
    /// never removed: without the ledger there is no proof of ownership.
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::Remove`] when a removal fails.
    pub fn undeploy(
        &self,
        target: &Path,
        mode: TransferMode,
        source_hint: Option<&Path>,
    ) -> Result<bool, ItemError> {
        if self.registry.is_artifact(target) {
            self.remove_tracked(target)?;
            return Ok(true);
        }

        let Ok(meta) = target.symlink_metadata() else {
            return Ok(false);
        };

        if meta.is_symlink() {
            if self.link_points_into(target, source_hint) {
                self.remove_tracked(target)?;
                return Ok(true);
            }
            return Ok(false);
        }

        if fsops::is_dir_like(&meta) && mode == TransferMode::Symlink {
            if let Some(hint) = source_hint {
                let removed = self.remove_nested_links(target, hint);
                if removed > 0 {
                    self.prune_empty_dirs(target);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Remove `target`, drop its ledger entry, restore any backup, prune.
    fn remove_tracked(&self, target: &Path) -> Result<(), ItemError> {
        fsops::remove_path(target).map_err(|e| ItemError::Remove {
            target: target.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        if let Err(e) = self.registry.remove_artifact(target) {
            warn!(target = %target.display(), error = %e, "artifact removed but still recorded");
        }
        self.restore_backup(target);
        if let Some(parent) = target.parent() {
            self.prune_empty_dirs(parent);
        }
        Ok(())
    }

    /// Whether the symlink at `link` resolves into `hint` (trivially true
    /// when no hint was provided).
    fn link_points_into(&self, link: &Path, hint: Option<&Path>) -> bool {
        let Some(hint) = hint else { return true };
        std::fs::read_link(link).is_ok_and(|dest| {
            let resolved = pathnorm::absolutize_link_dest(link, &dest);
            pathnorm::is_within(&resolved, hint)
        })
    }

    /// Remove every symlink under `dir` resolving into `source`. Failures
    /// are logged and counted as not-removed; siblings proceed.
    fn remove_nested_links(&self, dir: &Path, source: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = path.symlink_metadata() else {
                continue;
            };
            if meta.is_symlink() {
                if self.link_points_into(&path, Some(source)) {
                    match fsops::remove_path(&path) {
                        Ok(()) => {
                            if let Err(e) = self.registry.remove_artifact(&path) {
                                warn!(target = %path.display(), error = %e,
                                    "nested link removed but still recorded");
                            }
                            self.restore_backup(&path);
                            removed += 1;
                        }
                        Err(e) => {
                            warn!(target = %path.display(), error = %e, "could not remove nested link");
                        }
                    }
                }
            } else if meta.is_dir() {
                removed += self.remove_nested_links(&path, source);
            }
        }
        removed
    }

    /// Restore the recorded backup for `original`, if any, then forget the
    /// backup record. Best-effort: a failed restore is logged, not fatal.
    fn restore_backup(&self, original: &Path) {
        let Some(backup) = self.registry.backup_of(original) else {
            return;
        };
        if let Err(e) = std::fs::rename(&backup, original) {
            warn!(
                original = %original.display(),
                backup = %backup.display(),
                error = %e,
                "could not restore backup"
            );
            return;
        }
        debug!(original = %original.display(), "backup restored");
        if let Err(e) = self.registry.remove_backup(original) {
            warn!(original = %original.display(), error = %e, "backup restored but still recorded");
        }
    }

    /// Walk upward from `start`, removing directories left empty, stopping
    /// at (and never deleting) any protected root or ancestor of one.
    fn prune_empty_dirs(&self, start: &Path) {
        let mut current = Some(start.to_path_buf());
        while let Some(dir) = current {
            if self.is_protected(&dir) || !fsops::is_empty_dir(&dir) {
                break;
            }
            if let Err(e) = std::fs::remove_dir(&dir) {
                debug!(dir = %dir.display(), error = %e, "stopped pruning");
                break;
            }
            debug!(dir = %dir.display(), "pruned empty directory");
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    /// A directory is protected when it is a protected root or an ancestor
    /// of one.
    fn is_protected(&self, dir: &Path) -> bool {
        self.protected_roots
            .iter()
            .any(|root| pathnorm::paths_match(dir, root) || pathnorm::is_within(root, dir))
    }
}
