//! Resolution of already-existing targets: skip, overwrite, or back up.
//!
//! Runs per item, immediately before the executor materializes a pair. A
//! failure here is fatal to that item only — sibling items in the same plan
//! proceed regardless.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ItemError;
use crate::fsops;
use crate::model::ConflictPolicy;
use crate::registry::{BackupRecord, Registry};

/// What the resolver decided for one existing target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The target path is clear; the executor may apply the pair.
    Ready,
    /// Policy says leave the existing target untouched; skip the item.
    Skipped,
    /// The existing target was moved to the contained backup path.
    BackedUp(PathBuf),
}

/// Decides what happens when a computed target already exists on disk.
pub struct ConflictResolver<'a> {
    registry: &'a dyn Registry,
    policy: ConflictPolicy,
    package: &'a str,
}

impl std::fmt::Debug for ConflictResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("policy", &self.policy)
            .field("package", &self.package)
            .finish_non_exhaustive()
    }
}

impl<'a> ConflictResolver<'a> {
    /// Resolver for one package's deploy pass.
    #[must_use]
    pub const fn new(registry: &'a dyn Registry, policy: ConflictPolicy, package: &'a str) -> Self {
        Self {
            registry,
            policy,
            package,
        }
    }

    /// Resolve a single target prior to applying one pair.
    ///
    /// Targets the engine already owns are overwritten even under the
    /// backup policy — re-backing-up our own artifact would accumulate a
    /// new backup on every deploy cycle of the same package.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::ConflictResolution`] when the existing target
    /// cannot be removed or moved aside.
    pub fn resolve(&self, target: &Path) -> Result<Resolution, ItemError> {
        if !fsops::entry_exists(target) {
            return Ok(Resolution::Ready);
        }
        match self.policy {
            ConflictPolicy::Skip => {
                debug!(target = %target.display(), "existing target kept (skip policy)");
                Ok(Resolution::Skipped)
            }
            ConflictPolicy::Overwrite => self.clear(target),
            ConflictPolicy::Backup => {
                if self.registry.is_artifact(target) {
                    self.clear(target)
                } else {
                    self.back_up(target)
                }
            }
        }
    }

    fn clear(&self, target: &Path) -> Result<Resolution, ItemError> {
        fsops::remove_path(target).map_err(|e| ItemError::ConflictResolution {
            target: target.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        Ok(Resolution::Ready)
    }

    fn back_up(&self, target: &Path) -> Result<Resolution, ItemError> {
        let backup = next_backup_path(target);
        std::fs::rename(target, &backup).map_err(|e| ItemError::ConflictResolution {
            target: target.to_path_buf(),
            reason: format!("move to {}: {e}", backup.display()),
        })?;
        debug!(target = %target.display(), backup = %backup.display(), "existing target backed up");
        if let Err(e) = self.registry.register_backup(BackupRecord {
            original: target.to_path_buf(),
            backup: backup.clone(),
            package: self.package.to_string(),
        }) {
            warn!(target = %target.display(), error = %e, "backup created but not recorded");
        }
        Ok(Resolution::BackedUp(backup))
    }
}

/// First unused managed backup name for `target`: `path.bak`, then
/// `path.bak_1`, `path.bak_2`, …
fn next_backup_path(target: &Path) -> PathBuf {
    let with_suffix = |suffix: &str| {
        let mut name = target.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    let mut candidate = with_suffix(".bak");
    let mut n = 0_u32;
    while fsops::entry_exists(&candidate) {
        n += 1;
        candidate = with_suffix(&format!(".bak_{n}"));
    }
    candidate
}
