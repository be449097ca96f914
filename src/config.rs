//! Package manifest loading.
//!
//! The content root may carry a `packdeck.toml` declaring per-package
//! deployment rules. The manifest is the human-edited side of the system;
//! it is folded into the registry before each command runs, preserving the
//! runtime fields (`active`, `last_known_status`) the engine owns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::debug;

use crate::model::{
    ConflictPolicy, ConflictScope, DeployRule, LibraryDependency, PackageConfig, RuleDetail,
    TransferMode,
};
use crate::registry::Registry;

/// Manifest file name, looked up in the content root.
pub const MANIFEST_FILE: &str = "packdeck.toml";

/// One `[[package]]` table in the manifest.
#[derive(Debug, Deserialize)]
struct ManifestPackage {
    path: String,
    #[serde(default)]
    deploy_rule: DeployRule,
    #[serde(default)]
    transfer_mode: TransferMode,
    #[serde(default)]
    conflict_policy: ConflictPolicy,
    #[serde(default)]
    target_override: Option<PathBuf>,
    #[serde(default)]
    excludes: Vec<String>,
    #[serde(default)]
    overrides: BTreeMap<String, String>,
    #[serde(default)]
    skip_levels: usize,
    #[serde(default)]
    is_library: bool,
    #[serde(default)]
    library_name: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    dependencies: Vec<LibraryDependency>,
    #[serde(default)]
    conflict_tag: String,
    #[serde(default)]
    conflict_scope: ConflictScope,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    package: Vec<ManifestPackage>,
}

impl ManifestPackage {
    fn into_config(self) -> PackageConfig {
        PackageConfig {
            path: self.path,
            deploy_rule: self.deploy_rule,
            transfer_mode: self.transfer_mode,
            conflict_policy: self.conflict_policy,
            target_override: self.target_override,
            rule_detail: RuleDetail {
                excludes: self.excludes,
                overrides: self.overrides,
                skip_levels: self.skip_levels,
            },
            is_library: self.is_library,
            library_name: self.library_name,
            version: self.version,
            priority: self.priority,
            dependencies: self.dependencies,
            conflict_tag: self.conflict_tag,
            conflict_scope: self.conflict_scope,
            active: false,
            last_known_status: None,
        }
    }
}

/// Load the package declarations from `content_root/packdeck.toml`.
///
/// A missing manifest is an empty list, not an error — packages can also
/// come into existence on first deploy.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(content_root: &Path) -> Result<Vec<PackageConfig>> {
    let path = content_root.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let manifest: Manifest =
        toml::from_str(&text).with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest
        .package
        .into_iter()
        .map(ManifestPackage::into_config)
        .collect())
}

/// Fold the manifest into the registry, keeping the engine-owned runtime
/// fields of any existing config.
///
/// Returns how many packages were upserted.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or a config cannot be
/// persisted.
pub fn seed_registry(registry: &dyn Registry, content_root: &Path) -> Result<usize> {
    let declared = load(content_root)?;
    let count = declared.len();
    for mut config in declared {
        if let Some(existing) = registry.get_config(&config.path) {
            config.active = existing.active;
            config.last_known_status = existing.last_known_status;
        }
        debug!(package = %config.path, "manifest config folded into registry");
        registry
            .upsert_config(config)
            .context("persisting manifest config")?;
    }
    Ok(count)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{LinkState, VersionMode};
    use crate::registry::JsonRegistry;

    fn write_manifest(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), content).unwrap();
        let root = dir.path().to_path_buf();
        (dir, root)
    }

    #[test]
    fn load_full_package_declaration() {
        let (_dir, root) = write_manifest(
            r#"
[[package]]
path = "mods/hud"
deploy_rule = "custom"
transfer_mode = "copy"
conflict_policy = "overwrite"
excludes = ["*.bak", "docs"]
skip_levels = 1
conflict_tag = "hud"
conflict_scope = "global"

[package.overrides]
"readme.txt" = "docs/readme.txt"

[[package.dependencies]]
name = "core"
mode = "specific"
version = "2.0"
"#,
        );
        let configs = load(&root).unwrap();
        assert_eq!(configs.len(), 1);
        let c = &configs[0];
        assert_eq!(c.path, "mods/hud");
        assert_eq!(c.deploy_rule, DeployRule::Custom);
        assert_eq!(c.transfer_mode, TransferMode::Copy);
        assert_eq!(c.conflict_policy, ConflictPolicy::Overwrite);
        assert_eq!(c.rule_detail.excludes, vec!["*.bak", "docs"]);
        assert_eq!(c.rule_detail.skip_levels, 1);
        assert_eq!(
            c.rule_detail.overrides.get("readme.txt").map(String::as_str),
            Some("docs/readme.txt")
        );
        assert_eq!(c.dependencies.len(), 1);
        assert_eq!(c.dependencies[0].mode, VersionMode::Specific);
        assert_eq!(c.conflict_scope, ConflictScope::Global);
    }

    #[test]
    fn load_minimal_declaration_uses_defaults() {
        let (_dir, root) = write_manifest("[[package]]\npath = \"mods/simple\"\n");
        let configs = load(&root).unwrap();
        assert_eq!(configs[0].deploy_rule, DeployRule::Folder);
        assert_eq!(configs[0].transfer_mode, TransferMode::Symlink);
        assert!(!configs[0].active);
    }

    #[test]
    fn load_missing_manifest_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn load_invalid_manifest_errors() {
        let (_dir, root) = write_manifest("[[package]]\nderp\n");
        assert!(load(&root).is_err());
    }

    #[test]
    fn load_unknown_mode_string_errors() {
        let (_dir, root) = write_manifest(
            "[[package]]\npath = \"p\"\ndeploy_rule = \"hardlink\"\n",
        );
        assert!(load(&root).is_err());
    }

    #[test]
    fn seed_registry_preserves_runtime_fields() {
        let (_dir, root) = write_manifest("[[package]]\npath = \"mods/hud\"\nversion = \"2.0\"\n");
        let store = tempfile::tempdir().unwrap();
        let registry = JsonRegistry::open(store.path().join("registry.json")).unwrap();

        let mut existing = PackageConfig::new("mods/hud");
        existing.active = true;
        existing.last_known_status = Some(LinkState::Linked);
        registry.upsert_config(existing).unwrap();

        let count = seed_registry(&registry, &root).unwrap();

        assert_eq!(count, 1);
        let merged = registry.get_config("mods/hud").unwrap();
        assert_eq!(merged.version, "2.0");
        assert!(merged.active, "runtime active flag survives re-seeding");
        assert_eq!(merged.last_known_status, Some(LinkState::Linked));
    }
}
