//! Path planning: turn one package's deploy rule into (source, target) pairs.
//!
//! Planning only reads the filesystem. The returned pairs are validated for
//! intra-plan target collisions before anything downstream is allowed to
//! mutate; a plan with collisions yields the full structured list and no
//! pairs at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Collision, CollisionError, EngineError};
use crate::model::{ConflictPolicy, DeployRule, RuleDetail, TransferMode};
use crate::pathnorm;

/// Folders the planner never deploys, regardless of rule or excludes.
///
/// `.packdeck` holds the registry store; `_meta` is the per-package
/// metadata folder convention of the library layout. Dot-prefixed names
/// are excluded wholesale.
pub const INTERNAL_FOLDERS: &[&str] = &[".packdeck", "_meta"];

/// One source path mapped onto one target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPair {
    /// Absolute path inside the package.
    pub source: PathBuf,
    /// Absolute path the artifact will occupy.
    pub target: PathBuf,
}

/// A validated, ready-to-apply mapping for one package.
///
/// Ephemeral: owned by the deploy call that produced it and discarded after
/// use. Invariant: no two pairs share a target.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// Relative path of the package being deployed.
    pub package: String,
    /// How artifacts are materialized.
    pub transfer_mode: TransferMode,
    /// What to do when a target already exists.
    pub conflict_policy: ConflictPolicy,
    /// The ordered (source, target) pairs.
    pub pairs: Vec<PlanPair>,
}

/// Whether a directory entry name is always excluded from planning.
fn always_excluded(name: &str) -> bool {
    name.starts_with('.') || INTERNAL_FOLDERS.contains(&name)
}

/// Compile the user exclude globs, warning (once each) on invalid patterns
/// rather than failing the plan.
fn compile_excludes(excludes: &[String]) -> Vec<glob::Pattern> {
    excludes
        .iter()
        .filter_map(|raw| match glob::Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %raw, error = %e, "ignoring invalid exclude pattern");
                None
            }
        })
        .collect()
}

/// Whether `rel`'s path or basename matches any exclude pattern.
fn matches_exclude(patterns: &[glob::Pattern], rel_key: &str, name: &str) -> bool {
    patterns
        .iter()
        .any(|p| p.matches(rel_key) || p.matches(name))
}

/// Immediate children of `dir`, sorted by name for deterministic plans.
fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let iter = std::fs::read_dir(dir).map_err(|source| EngineError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut children = Vec::new();
    for entry in iter {
        let entry = entry.map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Map a source-relative path onto the target root, dropping the first
/// `skip_levels` components.
///
/// Paths with too few components are excluded entirely; the boundary is
/// `parts.len() > skip_levels`. The `files` rule deliberately ignores
/// `skip_levels` — the two rules' semantics are independent.
fn skip_mapped_target(target_root: &Path, rel: &Path, skip_levels: usize) -> Option<PathBuf> {
    let parts = pathnorm::rel_components(rel);
    if parts.len() > skip_levels {
        let mut target = target_root.to_path_buf();
        for part in &parts[skip_levels..] {
            target.push(part);
        }
        Some(target)
    } else {
        None
    }
}

/// Recursively gather pairs for the `tree` rule.
fn walk_tree(
    root: &Path,
    dir: &Path,
    target_root: &Path,
    skip_levels: usize,
    pairs: &mut Vec<PlanPair>,
) -> Result<(), EngineError> {
    for child in sorted_children(dir)? {
        let name = file_name_of(&child);
        if always_excluded(&name) {
            continue;
        }
        if child.is_dir() {
            walk_tree(root, &child, target_root, skip_levels, pairs)?;
        } else {
            let rel = child.strip_prefix(root).unwrap_or(&child);
            if let Some(target) = skip_mapped_target(target_root, rel, skip_levels) {
                pairs.push(PlanPair {
                    source: child,
                    target,
                });
            }
        }
    }
    Ok(())
}

/// Recursively gather pairs for the `custom` rule.
///
/// Excludes prune whole subtrees. An override on an exact relative path
/// redirects that entry — file or entire directory — and bypasses
/// `skip_levels`; overridden directories are not recursed into.
fn walk_custom(
    root: &Path,
    dir: &Path,
    target_root: &Path,
    detail: &RuleDetail,
    patterns: &[glob::Pattern],
    pairs: &mut Vec<PlanPair>,
) -> Result<(), EngineError> {
    for child in sorted_children(dir)? {
        let name = file_name_of(&child);
        if always_excluded(&name) {
            continue;
        }
        let rel = child.strip_prefix(root).unwrap_or(&child).to_path_buf();
        let rel_key = pathnorm::rel_key(&rel);
        if matches_exclude(patterns, &rel_key, &name) {
            continue;
        }
        if let Some(redirect) = detail.overrides.get(&rel_key) {
            pairs.push(PlanPair {
                source: child,
                target: target_root.join(redirect),
            });
            continue;
        }
        if child.is_dir() {
            walk_custom(root, &child, target_root, detail, patterns, pairs)?;
        } else if let Some(target) = skip_mapped_target(target_root, &rel, detail.skip_levels) {
            pairs.push(PlanPair {
                source: child,
                target,
            });
        }
    }
    Ok(())
}

/// Compute the (source, target) pairs for one package.
///
/// # Errors
///
/// Returns [`EngineError::Collision`] when two pairs claim the same
/// (normalized) target — the error carries every collision and no pairs are
/// produced — or [`EngineError::Io`] when the source tree cannot be read.
pub fn plan(
    source_root: &Path,
    target_root: &Path,
    rule: DeployRule,
    detail: &RuleDetail,
) -> Result<Vec<PlanPair>, EngineError> {
    let pairs = match rule {
        DeployRule::Folder => vec![PlanPair {
            source: source_root.to_path_buf(),
            target: target_root.to_path_buf(),
        }],
        DeployRule::Files => {
            let mut pairs = Vec::new();
            for child in sorted_children(source_root)? {
                let name = file_name_of(&child);
                if always_excluded(&name) || child.is_dir() {
                    continue;
                }
                pairs.push(PlanPair {
                    target: target_root.join(&name),
                    source: child,
                });
            }
            pairs
        }
        DeployRule::Tree => {
            let mut pairs = Vec::new();
            walk_tree(
                source_root,
                source_root,
                target_root,
                detail.skip_levels,
                &mut pairs,
            )?;
            pairs
        }
        DeployRule::Custom => {
            let patterns = compile_excludes(&detail.excludes);
            let mut pairs = Vec::new();
            walk_custom(
                source_root,
                source_root,
                target_root,
                detail,
                &patterns,
                &mut pairs,
            )?;
            pairs
        }
    };
    check_collisions(pairs).map_err(EngineError::from)
}

/// Validate that no two pairs share a (normalized) target.
fn check_collisions(pairs: Vec<PlanPair>) -> Result<Vec<PlanPair>, CollisionError> {
    let mut claimed: HashMap<String, PathBuf> = HashMap::with_capacity(pairs.len());
    let mut collisions = Vec::new();
    for pair in &pairs {
        let key = pathnorm::norm_key(&pair.target);
        if let Some(existing) = claimed.get(&key) {
            collisions.push(Collision {
                target: pair.target.clone(),
                existing_source: existing.clone(),
                incoming_source: pair.source.clone(),
            });
        } else {
            claimed.insert(key, pair.source.clone());
        }
    }
    if collisions.is_empty() {
        Ok(pairs)
    } else {
        Err(CollisionError { collisions })
    }
}

/// The excludes-aware immediate child names a `files` or `custom` plan
/// would consider, used by status reconciliation to tally expectations.
///
/// For `files` only file children count (subdirectories are never
/// flattened); for `custom` both files and directories survive unless an
/// exclude prunes them. Other rules have no child-set semantics and yield
/// an empty list.
#[must_use]
pub fn expected_children(source_root: &Path, rule: DeployRule, detail: &RuleDetail) -> Vec<String> {
    let Ok(children) = sorted_children(source_root) else {
        return Vec::new();
    };
    let patterns = match rule {
        DeployRule::Custom => compile_excludes(&detail.excludes),
        _ => Vec::new(),
    };
    let mut names = Vec::new();
    for child in children {
        let name = file_name_of(&child);
        if always_excluded(&name) {
            continue;
        }
        match rule {
            DeployRule::Files => {
                if !child.is_dir() {
                    names.push(name);
                }
            }
            DeployRule::Custom => {
                if !matches_exclude(&patterns, &name, &name) {
                    names.push(name);
                }
            }
            DeployRule::Folder | DeployRule::Tree => {}
        }
    }
    names
}
