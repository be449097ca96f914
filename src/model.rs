//! Core data model: package configuration and the closed mode enums.
//!
//! Every string-valued mode of the original system (`deploy_rule`,
//! `transfer_mode`, `conflict_policy`, …) is a closed enum here, so an
//! unknown value is a parse error at the boundary instead of a silent
//! fall-through at use sites.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Strategy used to map a package's contents onto a target root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployRule {
    /// Link or copy the whole package folder as a single entry.
    #[default]
    Folder,
    /// Map each immediate file child onto the target root (flattened).
    Files,
    /// Mirror the file tree under the target root, honoring `skip_levels`.
    Tree,
    /// Tree walk with excludes, per-path overrides, and `skip_levels`.
    Custom,
}

impl fmt::Display for DeployRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Folder => write!(f, "folder"),
            Self::Files => write!(f, "files"),
            Self::Tree => write!(f, "tree"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// How an artifact is materialized at the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Create a symbolic link pointing back into the library.
    #[default]
    Symlink,
    /// Physically copy the file or directory.
    Copy,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symlink => write!(f, "symlink"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// What to do when a computed target already exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Leave the existing target untouched and skip the item.
    Skip,
    /// Remove the existing target before applying.
    Overwrite,
    /// Move the existing target to a managed `.bak` name, then apply.
    #[default]
    Backup,
}

/// Scope within which a shared conflict tag blocks co-activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictScope {
    /// Tag checking disabled for this package.
    #[default]
    Disabled,
    /// Conflicts only with packages in the same parent category.
    Category,
    /// Conflicts with any active package sharing a tag.
    Global,
}

impl fmt::Display for ConflictScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Category => write!(f, "category"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Version-selection mode for a library dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionMode {
    /// Highest version string wins.
    #[default]
    Latest,
    /// Highest priority wins, version string breaking ties.
    Priority,
    /// Exact version match; falls back to priority ordering with a warning.
    Specific,
}

/// Reconciled state of a deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Nothing related is present at the target.
    None,
    /// Fully and correctly deployed.
    Linked,
    /// Some but not all expected entries are present.
    Partial,
    /// Something unrelated occupies the target.
    Conflict,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Linked => write!(f, "linked"),
            Self::Partial => write!(f, "partial"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Fine-tuning for the `tree` and `custom` deploy rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDetail {
    /// Glob patterns pruning matching relative paths (or basenames).
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Exact source-relative path → target-relative path redirections.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    /// Number of leading path components dropped from each relative path.
    #[serde(default)]
    pub skip_levels: usize,
}

impl RuleDetail {
    /// Whether this detail changes anything relative to the defaults.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.excludes.is_empty() && self.overrides.is_empty() && self.skip_levels == 0
    }
}

/// A versioned library requirement declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDependency {
    /// Library name the dependency resolves against.
    pub name: String,
    /// How to choose among same-named candidates.
    #[serde(default)]
    pub mode: VersionMode,
    /// Requested version; only meaningful for [`VersionMode::Specific`].
    #[serde(default)]
    pub version: Option<String>,
}

/// Persistent configuration for one content package.
///
/// Identity is `path`: the package's normalized relative path under the
/// content root. Upserted on first configuration write or first deploy
/// attempt; mutated by every deploy/undeploy operation; never implicitly
/// deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Normalized relative path under the content root (identity).
    pub path: String,
    /// Mapping strategy for this package's contents.
    #[serde(default)]
    pub deploy_rule: DeployRule,
    /// Link or copy.
    #[serde(default)]
    pub transfer_mode: TransferMode,
    /// What to do when a target already exists.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Absolute target root bypassing the rule-computed target.
    #[serde(default)]
    pub target_override: Option<PathBuf>,
    /// Excludes, overrides, and skip levels for tree/custom rules.
    #[serde(default)]
    pub rule_detail: RuleDetail,
    /// Whether this package is a shared library other packages depend on.
    #[serde(default)]
    pub is_library: bool,
    /// Library name; packages resolve dependencies against this.
    #[serde(default)]
    pub library_name: Option<String>,
    /// Version string, compared lexicographically during resolution.
    #[serde(default)]
    pub version: String,
    /// Selection weight for [`VersionMode::Priority`] resolution.
    #[serde(default)]
    pub priority: i64,
    /// Libraries that must be deployed before this package.
    #[serde(default)]
    pub dependencies: Vec<LibraryDependency>,
    /// Comma-separated mutual-exclusion labels.
    #[serde(default)]
    pub conflict_tag: String,
    /// Scope within which shared tags block co-activation.
    #[serde(default)]
    pub conflict_scope: ConflictScope,
    /// Whether the package is currently deployed.
    #[serde(default)]
    pub active: bool,
    /// Cached result of the last status reconciliation.
    #[serde(default)]
    pub last_known_status: Option<LinkState>,
}

impl PackageConfig {
    /// Create a config with defaults for everything but the identity path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            deploy_rule: DeployRule::default(),
            transfer_mode: TransferMode::default(),
            conflict_policy: ConflictPolicy::default(),
            target_override: None,
            rule_detail: RuleDetail::default(),
            is_library: false,
            library_name: None,
            version: String::new(),
            priority: 0,
            dependencies: Vec::new(),
            conflict_tag: String::new(),
            conflict_scope: ConflictScope::default(),
            active: false,
            last_known_status: None,
        }
    }

    /// Parent category of the package (the path up to the last separator).
    ///
    /// Top-level packages have the empty category.
    #[must_use]
    pub fn category(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or("", |(category, _)| category)
    }

    /// The package's base name (the last path component).
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit_once('/').map_or(&*self.path, |(_, n)| n)
    }

    /// The conflict tags, split and trimmed.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.conflict_tag
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Enum serde round-trips
    // -----------------------------------------------------------------------

    #[test]
    fn deploy_rule_serde_lowercase() {
        let json = serde_json::to_string(&DeployRule::Custom).unwrap();
        assert_eq!(json, "\"custom\"");
        let back: DeployRule = serde_json::from_str("\"tree\"").unwrap();
        assert_eq!(back, DeployRule::Tree);
    }

    #[test]
    fn unknown_deploy_rule_is_a_parse_error() {
        let result: Result<DeployRule, _> = serde_json::from_str("\"hardlink\"");
        assert!(result.is_err());
    }

    #[test]
    fn transfer_mode_display() {
        assert_eq!(TransferMode::Symlink.to_string(), "symlink");
        assert_eq!(TransferMode::Copy.to_string(), "copy");
    }

    #[test]
    fn link_state_display() {
        assert_eq!(LinkState::None.to_string(), "none");
        assert_eq!(LinkState::Linked.to_string(), "linked");
        assert_eq!(LinkState::Partial.to_string(), "partial");
        assert_eq!(LinkState::Conflict.to_string(), "conflict");
    }

    // -----------------------------------------------------------------------
    // RuleDetail
    // -----------------------------------------------------------------------

    #[test]
    fn rule_detail_default_is_empty() {
        assert!(RuleDetail::default().is_empty());
    }

    #[test]
    fn rule_detail_with_skip_levels_is_not_empty() {
        let detail = RuleDetail {
            skip_levels: 1,
            ..RuleDetail::default()
        };
        assert!(!detail.is_empty());
    }

    // -----------------------------------------------------------------------
    // PackageConfig
    // -----------------------------------------------------------------------

    #[test]
    fn new_config_uses_defaults() {
        let config = PackageConfig::new("weapons/longsword");
        assert_eq!(config.deploy_rule, DeployRule::Folder);
        assert_eq!(config.transfer_mode, TransferMode::Symlink);
        assert_eq!(config.conflict_policy, ConflictPolicy::Backup);
        assert!(!config.active);
    }

    #[test]
    fn category_is_parent_path() {
        assert_eq!(PackageConfig::new("weapons/longsword").category(), "weapons");
        assert_eq!(
            PackageConfig::new("weapons/melee/longsword").category(),
            "weapons/melee"
        );
        assert_eq!(PackageConfig::new("standalone").category(), "");
    }

    #[test]
    fn name_is_last_component() {
        assert_eq!(PackageConfig::new("weapons/longsword").name(), "longsword");
        assert_eq!(PackageConfig::new("standalone").name(), "standalone");
    }

    #[test]
    fn tags_split_and_trim() {
        let mut config = PackageConfig::new("p");
        config.conflict_tag = "weapons, armor ,,shields".to_string();
        assert_eq!(config.tags(), vec!["weapons", "armor", "shields"]);
    }

    #[test]
    fn tags_empty_when_unset() {
        let config = PackageConfig::new("p");
        assert!(config.tags().is_empty());
    }

    #[test]
    fn config_serde_round_trip() {
        let mut config = PackageConfig::new("lib/core");
        config.is_library = true;
        config.library_name = Some("core".to_string());
        config.version = "2.1.0".to_string();
        config.priority = 5;
        config.dependencies.push(LibraryDependency {
            name: "base".to_string(),
            mode: VersionMode::Priority,
            version: None,
        });
        let json = serde_json::to_string(&config).unwrap();
        let back: PackageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let back: PackageConfig = serde_json::from_str(r#"{"path":"a/b"}"#).unwrap();
        assert_eq!(back.path, "a/b");
        assert_eq!(back.deploy_rule, DeployRule::Folder);
        assert!(back.dependencies.is_empty());
    }
}
