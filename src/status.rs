//! Status reconciliation: what is actually at a target right now?
//!
//! The registry is the fast path, but it is a ledger, not the truth — the
//! reconciler probes the filesystem so stale UI state can never claim a
//! deployment that is not there. Reconciliation never raises: when state
//! cannot be determined it degrades to `none` or `conflict`.

use std::path::{Path, PathBuf};

use crate::model::{DeployRule, LinkState, RuleDetail, TransferMode};
use crate::pathnorm;
use crate::planner;
use crate::registry::Registry;

/// Maximum missing-entry names carried in a partial-status report.
const PARTIAL_SAMPLE: usize = 3;

/// Reconciled state plus a human-readable detail for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// The reconciled state.
    pub state: LinkState,
    /// Optional diagnostic: sample missing names, the stray link
    /// destination, or the partial-folder marker.
    pub detail: Option<String>,
}

impl StatusReport {
    fn new(state: LinkState) -> Self {
        Self {
            state,
            detail: None,
        }
    }

    fn with_detail(state: LinkState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: Some(detail.into()),
        }
    }
}

/// Answers "what is the current state of this target?".
pub struct StatusReconciler<'a> {
    registry: &'a dyn Registry,
    target_roots: Vec<PathBuf>,
}

impl std::fmt::Debug for StatusReconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReconciler")
            .field("target_roots", &self.target_roots)
            .finish_non_exhaustive()
    }
}

impl<'a> StatusReconciler<'a> {
    /// Reconciler consulting `registry`, aware of the configured target
    /// roots (a bare root directory is never mistaken for a deployed copy).
    #[must_use]
    pub fn new(registry: &'a dyn Registry, target_roots: Vec<PathBuf>) -> Self {
        Self {
            registry,
            target_roots,
        }
    }

    /// Reconcile `target` against the expectation that `expected_source`
    /// was deployed there with `mode` under `rule`.
    #[must_use]
    pub fn status(
        &self,
        target: &Path,
        expected_source: &Path,
        mode: TransferMode,
        rule: DeployRule,
        detail: &RuleDetail,
    ) -> StatusReport {
        // Fast path: our own ledger says we created this exact target.
        if self.registry.is_artifact(target) {
            return StatusReport::new(LinkState::Linked);
        }

        // Per-child tally for the flattening rules.
        if matches!(rule, DeployRule::Files | DeployRule::Custom) && expected_source.is_dir() {
            return self.tally_children(target, expected_source, rule, detail);
        }

        // A physical copy leaves no link to verify; existence is the
        // accepted evidence, except for the target roots themselves.
        if mode == TransferMode::Copy {
            if target.is_file() {
                return StatusReport::new(LinkState::Linked);
            }
            if target.is_dir() && !self.is_target_root(target) {
                return StatusReport::new(LinkState::Linked);
            }
        }

        let Ok(meta) = target.symlink_metadata() else {
            return StatusReport::new(LinkState::None);
        };

        if meta.is_symlink() {
            return match std::fs::read_link(target) {
                Ok(dest) => {
                    let resolved = pathnorm::absolutize_link_dest(target, &dest);
                    if pathnorm::paths_match(
                        &pathnorm::canonical(&resolved),
                        &pathnorm::canonical(expected_source),
                    ) {
                        StatusReport::new(LinkState::Linked)
                    } else {
                        StatusReport::with_detail(
                            LinkState::Conflict,
                            format!("links to {}", resolved.display()),
                        )
                    }
                }
                Err(_) => StatusReport::new(LinkState::Conflict),
            };
        }

        // Directory fallback: a folder-mode deploy may have materialized as
        // individual links nested inside an ordinary directory.
        if meta.is_dir() && self.contains_link_into(target, expected_source) {
            return StatusReport::with_detail(LinkState::Linked, "partial folder link");
        }

        // Last registry resort: a copy recorded for exactly this source.
        if self
            .registry
            .artifacts_under_source(expected_source)
            .iter()
            .any(|r| pathnorm::paths_match(&r.source, expected_source))
        {
            return StatusReport::new(LinkState::Linked);
        }

        StatusReport::with_detail(LinkState::Conflict, "unrelated content at target")
    }

    /// Step 2: tally expected children of a `files`/`custom` deployment.
    fn tally_children(
        &self,
        target: &Path,
        expected_source: &Path,
        rule: DeployRule,
        detail: &RuleDetail,
    ) -> StatusReport {
        let expected = planner::expected_children(expected_source, rule, detail);
        if expected.is_empty() {
            return if target.is_dir() {
                StatusReport::new(LinkState::Linked)
            } else {
                StatusReport::new(LinkState::None)
            };
        }

        let mut missing = Vec::new();
        for name in &expected {
            if !self.child_present(&target.join(name), &expected_source.join(name)) {
                missing.push(name.clone());
            }
        }

        let found = expected.len() - missing.len();
        if missing.is_empty() {
            StatusReport::new(LinkState::Linked)
        } else if found == 0 {
            StatusReport::new(LinkState::None)
        } else {
            missing.truncate(PARTIAL_SAMPLE);
            StatusReport::with_detail(
                LinkState::Partial,
                format!("missing: {}", missing.join(", ")),
            )
        }
    }

    /// A child counts as present when it is a symlink resolving to the
    /// matching source child, or when anything at all exists there
    /// (evidence of a copy).
    fn child_present(&self, target_child: &Path, source_child: &Path) -> bool {
        if let Ok(meta) = target_child.symlink_metadata() {
            if meta.is_symlink() {
                if let Ok(dest) = std::fs::read_link(target_child) {
                    let resolved = pathnorm::absolutize_link_dest(target_child, &dest);
                    return pathnorm::paths_match(
                        &pathnorm::canonical(&resolved),
                        &pathnorm::canonical(source_child),
                    );
                }
                return false;
            }
            return true;
        }
        false
    }

    /// Whether any symlink under `dir` resolves into `source`.
    fn contains_link_into(&self, dir: &Path, source: &Path) -> bool {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = path.symlink_metadata() else {
                continue;
            };
            if meta.is_symlink() {
                if let Ok(dest) = std::fs::read_link(&path) {
                    let resolved = pathnorm::absolutize_link_dest(&path, &dest);
                    if pathnorm::is_within(&resolved, source) {
                        return true;
                    }
                }
            } else if meta.is_dir() && self.contains_link_into(&path, source) {
                return true;
            }
        }
        false
    }

    fn is_target_root(&self, path: &Path) -> bool {
        self.target_roots
            .iter()
            .any(|root| pathnorm::paths_match(path, root))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::fsops;
    use crate::registry::{ArtifactRecord, JsonRegistry};

    struct Fixture {
        dir: tempfile::TempDir,
        registry: JsonRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let registry = JsonRegistry::open(dir.path().join("registry.json")).unwrap();
            Self { dir, registry }
        }

        fn source_dir(&self, files: &[&str]) -> PathBuf {
            let pkg = self.dir.path().join("library/pack");
            for rel in files {
                let path = pkg.join(rel);
                fsops::ensure_parent_dir(&path).unwrap();
                std::fs::write(&path, b"x").unwrap();
            }
            std::fs::create_dir_all(&pkg).unwrap();
            pkg
        }

        fn target_root(&self) -> PathBuf {
            let root = self.dir.path().join("deploy");
            std::fs::create_dir_all(&root).unwrap();
            root
        }

        fn reconciler(&self) -> StatusReconciler<'_> {
            StatusReconciler::new(&self.registry, vec![self.dir.path().join("deploy")])
        }
    }

    // -----------------------------------------------------------------------
    // Fast path
    // -----------------------------------------------------------------------

    #[test]
    fn registered_artifact_is_linked_without_probing() {
        let fx = Fixture::new();
        let target = fx.target_root().join("ghost.txt");
        fx.registry
            .register_artifact(ArtifactRecord {
                target: target.clone(),
                source: fx.dir.path().join("library/pack/ghost.txt"),
                package: "pack".to_string(),
                kind: TransferMode::Symlink,
            })
            .unwrap();

        let report = fx.reconciler().status(
            &target,
            &fx.dir.path().join("library/pack/ghost.txt"),
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    // -----------------------------------------------------------------------
    // files/custom child tally
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    #[test]
    fn files_rule_all_children_linked() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt", "b.txt"]);
        let root = fx.target_root();
        std::os::unix::fs::symlink(pkg.join("a.txt"), root.join("a.txt")).unwrap();
        std::os::unix::fs::symlink(pkg.join("b.txt"), root.join("b.txt")).unwrap();

        let report = fx.reconciler().status(
            &root,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Files,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    #[cfg(unix)]
    #[test]
    fn files_rule_some_children_missing_is_partial_with_sample() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt", "b.txt", "c.txt"]);
        let root = fx.target_root();
        std::os::unix::fs::symlink(pkg.join("a.txt"), root.join("a.txt")).unwrap();

        let report = fx.reconciler().status(
            &root,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Files,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Partial);
        let detail = report.detail.unwrap();
        assert!(detail.contains("b.txt") && detail.contains("c.txt"));
    }

    #[test]
    fn files_rule_no_children_found_is_none() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let root = fx.target_root();

        let report = fx.reconciler().status(
            &root,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Files,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::None);
    }

    #[test]
    fn files_rule_copied_children_accepted_as_evidence() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let root = fx.target_root();
        std::fs::write(root.join("a.txt"), b"copied").unwrap();

        let report = fx.reconciler().status(
            &root,
            &pkg,
            TransferMode::Copy,
            DeployRule::Files,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    #[test]
    fn empty_expectation_with_existing_dir_is_linked() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&[]);
        let root = fx.target_root();

        let report = fx.reconciler().status(
            &root,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Files,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    // -----------------------------------------------------------------------
    // copy acceptance
    // -----------------------------------------------------------------------

    #[test]
    fn copy_mode_accepts_existing_file() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("a.txt");
        std::fs::write(&target, b"copy").unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg.join("a.txt"),
            TransferMode::Copy,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    #[test]
    fn copy_mode_does_not_mistake_target_root_for_deployment() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let root = fx.target_root();

        let report = fx.reconciler().status(
            &root,
            &pkg,
            TransferMode::Copy,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        // The bare root is never accepted as evidence of a deployed folder.
        assert_ne!(report.state, LinkState::Linked);
    }

    // -----------------------------------------------------------------------
    // symlink comparison
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    #[test]
    fn matching_symlink_is_linked() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("pack");
        std::os::unix::fs::symlink(&pkg, &target).unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_other_source_is_conflict() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let other = fx.dir.path().join("library/other");
        std::fs::create_dir_all(&other).unwrap();
        let target = fx.target_root().join("pack");
        std::os::unix::fs::symlink(&other, &target).unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Conflict);
        assert!(report.detail.unwrap().contains("links to"));
    }

    #[cfg(unix)]
    #[test]
    fn relative_symlink_resolves_before_comparison() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("pack");
        let rel = pathdiff_rel(&pkg, &fx.target_root());
        std::os::unix::fs::symlink(&rel, &target).unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    /// Minimal relative-path builder for the test above (`../library/pack`
    /// style), enough for sibling directories under one temp root.
    fn pathdiff_rel(dest: &Path, from: &Path) -> PathBuf {
        let mut rel = PathBuf::from("..");
        let parent = from.parent().unwrap();
        rel.push(dest.strip_prefix(parent).unwrap());
        rel
    }

    // -----------------------------------------------------------------------
    // directory fallback and conflict
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    #[test]
    fn directory_with_nested_link_into_source_is_linked() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("pack");
        std::fs::create_dir_all(&target).unwrap();
        std::os::unix::fs::symlink(pkg.join("a.txt"), target.join("a.txt")).unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
        assert_eq!(report.detail.as_deref(), Some("partial folder link"));
    }

    #[test]
    fn registry_source_match_accepts_copied_folder() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("pack");
        std::fs::create_dir_all(&target).unwrap();
        // A copy was recorded at a different target for this exact source.
        fx.registry
            .register_artifact(ArtifactRecord {
                target: fx.target_root().join("elsewhere"),
                source: pkg.clone(),
                package: "pack".to_string(),
                kind: TransferMode::Copy,
            })
            .unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Linked);
    }

    #[test]
    fn unrelated_file_is_conflict() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("pack");
        std::fs::write(&target, b"someone else's file").unwrap();

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::Conflict);
    }

    #[test]
    fn absent_target_is_none() {
        let fx = Fixture::new();
        let pkg = fx.source_dir(&["a.txt"]);
        let target = fx.target_root().join("missing");

        let report = fx.reconciler().status(
            &target,
            &pkg,
            TransferMode::Symlink,
            DeployRule::Folder,
            &RuleDetail::default(),
        );
        assert_eq!(report.state, LinkState::None);
    }
}
