// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed workspace (content library, target
// root, registry store) so each integration test sets up an isolated
// environment without repeating filesystem boilerplate.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use packdeck::registry::JsonRegistry;

/// An isolated engine workspace backed by a [`tempfile::TempDir`].
///
/// Layout:
/// - `library/`  — content root packages deploy from
/// - `deploy/`   — target root packages deploy into
/// - `store/`    — registry store (kept outside both roots so directory
///   snapshots stay clean)
pub struct TestWorkspace {
    dir: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("library")).expect("create library");
        std::fs::create_dir_all(dir.path().join("deploy")).expect("create deploy");
        Self { dir }
    }

    pub fn content_root(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    pub fn target_root(&self) -> PathBuf {
        self.dir.path().join("deploy")
    }

    pub fn registry(&self) -> JsonRegistry {
        JsonRegistry::open(self.dir.path().join("store/registry.json")).expect("open registry")
    }

    /// Create a file (and its parents) under the content root.
    pub fn add_source_file(&self, package_rel: &str, file_rel: &str, content: &[u8]) {
        let path = self.content_root().join(package_rel).join(file_rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create source parents");
        }
        std::fs::write(&path, content).expect("write source file");
    }

    /// Create a file (and its parents) under the target root.
    pub fn add_target_file(&self, rel: &str, content: &[u8]) {
        let path = self.target_root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create target parents");
        }
        std::fs::write(&path, content).expect("write target file");
    }

    /// Relative paths of everything under `root`, sorted, for
    /// before/after snapshots.
    pub fn snapshot(&self, root: &Path) -> Vec<String> {
        let mut entries = Vec::new();
        collect(root, root, &mut entries);
        entries.sort();
        entries
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .expect("entry under root")
            .to_string_lossy()
            .replace('\\', "/");
        out.push(rel);
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        if meta.is_dir() && !meta.is_symlink() {
            collect(root, &path, out);
        }
    }
}
