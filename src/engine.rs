//! Engine facade: the contract exposed to the shell layer.
//!
//! Wires the planner, guard, conflict resolver, executor, reconciler,
//! dependency resolver, tag checker, and sweeper around one explicit
//! registry handle. Callers (a GUI shell, the bundled CLI) talk to this
//! facade only.
//!
//! Control flow for a deploy: resolve dependencies → per package: plan →
//! safety vet → apply → upsert config and status cache. Two concurrent
//! deploys over overlapping sources are the caller's responsibility to
//! serialize.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::EngineError;
use crate::executor::{DeploymentExecutor, ItemResult};
use crate::guard::SafetyGuard;
use crate::model::{DeployRule, PackageConfig, TransferMode};
use crate::planner::{self, DeploymentPlan};
use crate::registry::Registry;
use crate::resolver::{DependencyResolver, ResolvedOrder};
use crate::status::{StatusReconciler, StatusReport};
use crate::sweep::{SweepCleaner, SweepReport};
use crate::tags::{ConflictTagChecker, TagConflict};

/// Per-package slice of a [`Engine::deploy`] run.
#[derive(Debug, Clone)]
pub struct PackageApply {
    /// Package path this slice belongs to.
    pub package: String,
    /// Per-item results from the executor.
    pub results: Vec<ItemResult>,
}

/// Everything a full deploy run produced.
#[derive(Debug, Clone, Default)]
pub struct DeployRun {
    /// Per-package apply results, in dependency order.
    pub packages: Vec<PackageApply>,
    /// Warnings from dependency resolution.
    pub warnings: Vec<String>,
}

/// The deployment engine.
pub struct Engine<'a> {
    registry: &'a dyn Registry,
    content_root: PathBuf,
    target_root: PathBuf,
    guard: SafetyGuard,
}

impl std::fmt::Debug for Engine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("content_root", &self.content_root)
            .field("target_root", &self.target_root)
            .finish_non_exhaustive()
    }
}

impl<'a> Engine<'a> {
    /// Engine over `registry`, deploying from `content_root` into
    /// `target_root`.
    #[must_use]
    pub fn new(
        registry: &'a dyn Registry,
        content_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            content_root: content_root.into(),
            target_root: target_root.into(),
            guard: SafetyGuard::new(),
        }
    }

    /// The stored configuration for `path`, or a fresh default — configs
    /// come into existence on first deploy attempt.
    #[must_use]
    pub fn config_for(&self, path: &str) -> PackageConfig {
        self.registry
            .get_config(path)
            .unwrap_or_else(|| PackageConfig::new(path))
    }

    /// Absolute source root for a package.
    #[must_use]
    pub fn source_root_for(&self, config: &PackageConfig) -> PathBuf {
        self.content_root.join(&config.path)
    }

    /// Absolute target root for a package: the explicit override when set,
    /// otherwise rule-derived — a folder deploy occupies
    /// `target_root/<name>`, the flattening rules materialize into the
    /// target root itself.
    #[must_use]
    pub fn target_root_for(&self, config: &PackageConfig) -> PathBuf {
        if let Some(explicit) = &config.target_override {
            return explicit.clone();
        }
        match config.deploy_rule {
            DeployRule::Folder => self.target_root.join(config.name()),
            DeployRule::Files | DeployRule::Tree | DeployRule::Custom => self.target_root.clone(),
        }
    }

    /// Compute and vet the deployment plan for one package.
    ///
    /// # Errors
    ///
    /// Fails with a collision list, a safety violation, or an I/O error —
    /// in every case before any filesystem mutation.
    pub fn plan_package(&self, config: &PackageConfig) -> Result<DeploymentPlan, EngineError> {
        let source_root = self.source_root_for(config);
        if !source_root.exists() {
            return Err(EngineError::Io {
                path: source_root,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "package source does not exist",
                ),
            });
        }
        let pairs = planner::plan(
            &source_root,
            &self.target_root_for(config),
            config.deploy_rule,
            &config.rule_detail,
        )?;
        self.guard.vet_plan(&pairs)?;
        Ok(DeploymentPlan {
            package: config.path.clone(),
            transfer_mode: config.transfer_mode,
            conflict_policy: config.conflict_policy,
            pairs,
        })
    }

    /// Apply a validated plan; per-item results, mixed outcomes possible.
    #[must_use]
    pub fn apply(&self, plan: &DeploymentPlan) -> Vec<ItemResult> {
        self.executor().apply(plan)
    }

    /// Plan, apply, and record one package (no dependency expansion).
    ///
    /// # Errors
    ///
    /// Fails when the plan is rejected; per-item apply failures are
    /// reported in the result set instead.
    pub fn deploy_package(&self, path: &str) -> Result<Vec<ItemResult>, EngineError> {
        let mut config = self.config_for(path);
        let plan = self.plan_package(&config)?;
        info!(package = path, pairs = plan.pairs.len(), "applying deployment plan");
        let results = self.executor().apply(&plan);

        let report = self.status_package(&config);
        config.active = true;
        config.last_known_status = Some(report.state);
        if let Err(e) = self.registry.upsert_config(config) {
            warn!(package = path, error = %e, "deployed but config not persisted");
        }
        Ok(results)
    }

    /// Full deploy flow: expand dependencies, then deploy each package in
    /// resolved order.
    ///
    /// # Errors
    ///
    /// Fails on the first package whose plan is rejected; packages already
    /// applied stay applied (per-file atomicity, no cross-package rollback).
    pub fn deploy(&self, requested: &[String]) -> Result<DeployRun, EngineError> {
        let resolved = self.resolve_dependencies(requested);
        for warning in &resolved.warnings {
            warn!("{warning}");
        }
        let mut run = DeployRun {
            warnings: resolved.warnings,
            ..DeployRun::default()
        };
        for package in &resolved.order {
            let results = self.deploy_package(package)?;
            run.packages.push(PackageApply {
                package: package.clone(),
                results,
            });
        }
        Ok(run)
    }

    /// Undo one package's deployment and update its config.
    ///
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Fails when the package plan cannot be recomputed (unknown source);
    /// individual removal failures are logged and skipped.
    pub fn undeploy_package(&self, path: &str) -> Result<bool, EngineError> {
        let mut config = self.config_for(path);
        let source_root = self.source_root_for(&config);
        let executor = self.executor();

        let mut any_removed = false;
        match self.plan_package(&config) {
            Ok(plan) => {
                for pair in &plan.pairs {
                    match executor.undeploy(
                        &pair.target,
                        config.transfer_mode,
                        Some(&source_root),
                    ) {
                        Ok(removed) => any_removed |= removed,
                        Err(e) => warn!(target = %pair.target.display(), error = %e,
                            "undeploy item failed"),
                    }
                }
            }
            Err(_) => {
                // The plan no longer computes (source moved, collision from
                // a config edit); fall back to sweeping the source root.
                let report = self.sweep(&source_root, &[self.target_root.clone()]);
                any_removed = report.any_removed;
            }
        }

        let report = self.status_package(&config);
        config.active = false;
        config.last_known_status = Some(report.state);
        if let Err(e) = self.registry.upsert_config(config) {
            warn!(package = path, error = %e, "undeployed but config not persisted");
        }
        Ok(any_removed)
    }

    /// Remove a single target, consulting the ledger and restoring backups.
    ///
    /// Returns whether anything was removed.
    #[must_use]
    pub fn undeploy_target(
        &self,
        target: &Path,
        mode: TransferMode,
        source_hint: Option<&Path>,
    ) -> bool {
        match self.executor().undeploy(target, mode, source_hint) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(target = %target.display(), error = %e, "undeploy failed");
                false
            }
        }
    }

    /// Reconcile the current on-disk state of one package.
    #[must_use]
    pub fn status_package(&self, config: &PackageConfig) -> StatusReport {
        let reconciler = StatusReconciler::new(self.registry, vec![self.target_root.clone()]);
        reconciler.status(
            &self.target_root_for(config),
            &self.source_root_for(config),
            config.transfer_mode,
            config.deploy_rule,
            &config.rule_detail,
        )
    }

    /// Expand a deploy request into dependencies-first order.
    #[must_use]
    pub fn resolve_dependencies(&self, requested: &[String]) -> ResolvedOrder {
        let configs = self.registry.all_configs();
        DependencyResolver::new(&configs).resolve(requested)
    }

    /// Would activating `path` collide with an already-active package?
    #[must_use]
    pub fn check_tag_conflict(&self, path: &str) -> Option<TagConflict> {
        let configs = self.registry.all_configs();
        let candidate = self.config_for(path);
        ConflictTagChecker::new(&configs).check(&candidate)
    }

    /// Sweep every artifact tracing back to `source_root` out of
    /// `target_roots`.
    #[must_use]
    pub fn sweep(&self, source_root: &Path, target_roots: &[PathBuf]) -> SweepReport {
        SweepCleaner::new(self.registry).sweep(source_root, target_roots)
    }

    /// Sweep one package's source across this engine's target root.
    #[must_use]
    pub fn sweep_package(&self, path: &str) -> SweepReport {
        let config = self.config_for(path);
        self.sweep(&self.source_root_for(&config), &[self.target_root.clone()])
    }

    fn executor(&self) -> DeploymentExecutor<'a> {
        DeploymentExecutor::new(self.registry, vec![self.target_root.clone()])
    }
}
