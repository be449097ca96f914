//! Top-level subcommand orchestration.

pub mod deploy;
pub mod resolve;
pub mod status;
pub mod sweep;
pub mod undeploy;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::registry::JsonRegistry;

/// Resolve the content library root from CLI arguments or the current
/// directory.
///
/// # Errors
///
/// Returns an error if the chosen root does not exist.
pub fn resolve_root(global: &GlobalOpts) -> Result<PathBuf> {
    let root = match &global.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    anyhow::ensure!(
        root.is_dir(),
        "content root {} does not exist",
        root.display()
    );
    Ok(root)
}

/// Open the registry store: `--store` when given, otherwise the control
/// folder inside the content root.
///
/// # Errors
///
/// Returns an error if an existing store cannot be read or parsed.
pub fn open_registry(global: &GlobalOpts, root: &Path) -> Result<JsonRegistry> {
    let store = global
        .store
        .clone()
        .unwrap_or_else(|| root.join(".packdeck").join("registry.json"));
    JsonRegistry::open(store).context("opening registry store")
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::registry::Registry as _;

    #[test]
    fn resolve_root_prefers_explicit_argument() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalOpts {
            root: Some(dir.path().to_path_buf()),
            store: None,
        };
        assert_eq!(resolve_root(&global).unwrap(), dir.path());
    }

    #[test]
    fn resolve_root_rejects_missing_directory() {
        let global = GlobalOpts {
            root: Some(PathBuf::from("/no/such/root")),
            store: None,
        };
        assert!(resolve_root(&global).is_err());
    }

    #[test]
    fn open_registry_defaults_to_control_folder() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalOpts {
            root: None,
            store: None,
        };
        let registry = open_registry(&global, dir.path()).unwrap();
        // Store file appears under .packdeck/ on first write.
        registry
            .upsert_config(crate::model::PackageConfig::new("p"))
            .unwrap();
        assert!(dir.path().join(".packdeck/registry.json").exists());
    }
}
