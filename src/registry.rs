//! Persistent registry: package configs, the artifact ledger, and backups.
//!
//! The engine never trusts UI state about what it has deployed; the registry
//! is its ledger. [`Registry`] is the narrow contract every component
//! receives as an explicit handle (no module-level singleton), and
//! [`JsonRegistry`] is the file-backed production implementation.
//!
//! All lookup keys are normalized via [`crate::pathnorm::norm_key`]:
//! forward slashes, case-folded on case-insensitive filesystems.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;
use crate::model::{PackageConfig, TransferMode};
use crate::pathnorm;

/// A symlink or copy this engine created and tracks.
///
/// Invariant: a target path maps to exactly one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Absolute target path (normalized on insert).
    pub target: PathBuf,
    /// Absolute source path the artifact materializes.
    pub source: PathBuf,
    /// Relative path of the owning package.
    pub package: String,
    /// Whether the artifact is a symlink or a physical copy.
    pub kind: TransferMode,
}

/// An existing target moved aside before this engine overwrote its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// The original absolute path (identity).
    pub original: PathBuf,
    /// Where the original content now lives.
    pub backup: PathBuf,
    /// Relative path of the package whose deploy displaced the original.
    pub package: String,
}

/// Narrow persistence contract consumed by every engine component.
///
/// Mutations return [`RegistryError`] but callers treat the registry as an
/// optimization: a failed write is logged and the operation continues,
/// because the filesystem — not the ledger — is the source of truth.
/// Concurrent writers are serialized by the implementation.
pub trait Registry: Send + Sync {
    /// Look up the configuration for a package path.
    fn get_config(&self, path: &str) -> Option<PackageConfig>;

    /// Snapshot of every stored package configuration, keyed by path.
    fn all_configs(&self) -> BTreeMap<String, PackageConfig>;

    /// Insert or replace a package configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn upsert_config(&self, config: PackageConfig) -> Result<(), RegistryError>;

    /// Record an artifact this engine created.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn register_artifact(&self, record: ArtifactRecord) -> Result<(), RegistryError>;

    /// Forget the artifact at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn remove_artifact(&self, target: &Path) -> Result<(), RegistryError>;

    /// Whether `target` is one of this engine's artifacts.
    fn is_artifact(&self, target: &Path) -> bool;

    /// The source path recorded for the artifact at `target`, if any.
    fn artifact_source(&self, target: &Path) -> Option<PathBuf>;

    /// Every artifact whose source lies at or under `source_root`.
    fn artifacts_under_source(&self, source_root: &Path) -> Vec<ArtifactRecord>;

    /// Record that `original` was moved aside to `backup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn register_backup(&self, record: BackupRecord) -> Result<(), RegistryError>;

    /// The backup path recorded for `original`, if any.
    fn backup_of(&self, original: &Path) -> Option<PathBuf>;

    /// Forget the backup record for `original`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn remove_backup(&self, original: &Path) -> Result<(), RegistryError>;
}

/// On-disk shape of the registry store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    configs: BTreeMap<String, PackageConfig>,
    #[serde(default)]
    artifacts: BTreeMap<String, ArtifactRecord>,
    #[serde(default)]
    backups: BTreeMap<String, BackupRecord>,
}

/// JSON-file-backed [`Registry`].
///
/// A single mutex serializes writers; every mutation rewrites the store file
/// through a temp-and-rename so a crash never leaves a half-written store.
#[derive(Debug)]
pub struct JsonRegistry {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonRegistry {
    /// Open the store at `path`, creating an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing store file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let data = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|e| RegistryError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            StoreData::default()
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Lock the store, recovering from poison (a panicked writer cannot
    /// corrupt the in-memory map, only leave it mid-transaction-free).
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Persist the current in-memory state. Called with the lock held, so
    /// concurrent mutations cannot interleave file writes.
    fn save(&self, data: &StoreData) -> Result<(), RegistryError> {
        let text = serde_json::to_string_pretty(data).map_err(|e| RegistryError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let io_err = |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        // Stage to a sibling temp file so the rename stays on one filesystem.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Run `mutate` against the locked store and persist the result.
    fn transact(
        &self,
        mutate: impl FnOnce(&mut StoreData),
    ) -> Result<(), RegistryError> {
        let mut data = self.lock();
        mutate(&mut data);
        self.save(&data)
    }
}

impl Registry for JsonRegistry {
    fn get_config(&self, path: &str) -> Option<PackageConfig> {
        self.lock().configs.get(path).cloned()
    }

    fn all_configs(&self) -> BTreeMap<String, PackageConfig> {
        self.lock().configs.clone()
    }

    fn upsert_config(&self, config: PackageConfig) -> Result<(), RegistryError> {
        debug!(package = %config.path, "upserting package config");
        self.transact(|data| {
            data.configs.insert(config.path.clone(), config);
        })
    }

    fn register_artifact(&self, record: ArtifactRecord) -> Result<(), RegistryError> {
        debug!(target = %record.target.display(), "registering artifact");
        self.transact(|data| {
            data.artifacts
                .insert(pathnorm::norm_key(&record.target), record);
        })
    }

    fn remove_artifact(&self, target: &Path) -> Result<(), RegistryError> {
        self.transact(|data| {
            data.artifacts.remove(&pathnorm::norm_key(target));
        })
    }

    fn is_artifact(&self, target: &Path) -> bool {
        self.lock()
            .artifacts
            .contains_key(&pathnorm::norm_key(target))
    }

    fn artifact_source(&self, target: &Path) -> Option<PathBuf> {
        self.lock()
            .artifacts
            .get(&pathnorm::norm_key(target))
            .map(|r| r.source.clone())
    }

    fn artifacts_under_source(&self, source_root: &Path) -> Vec<ArtifactRecord> {
        self.lock()
            .artifacts
            .values()
            .filter(|r| pathnorm::is_within(&r.source, source_root))
            .cloned()
            .collect()
    }

    fn register_backup(&self, record: BackupRecord) -> Result<(), RegistryError> {
        debug!(original = %record.original.display(), "registering backup");
        self.transact(|data| {
            data.backups
                .insert(pathnorm::norm_key(&record.original), record);
        })
    }

    fn backup_of(&self, original: &Path) -> Option<PathBuf> {
        self.lock()
            .backups
            .get(&pathnorm::norm_key(original))
            .map(|r| r.backup.clone())
    }

    fn remove_backup(&self, original: &Path) -> Result<(), RegistryError> {
        self.transact(|data| {
            data.backups.remove(&pathnorm::norm_key(original));
        })
    }
}
