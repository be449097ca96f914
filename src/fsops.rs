//! Shared filesystem primitives for the executor, resolver, and sweeper.
//!
//! Symlink handling is platform-aware: on Windows, directory symlinks need
//! `symlink_dir` to create and `remove_dir` to remove, and
//! `symlink_metadata().is_dir()` lies for them, so the raw directory
//! attribute is consulted instead.

use std::path::Path;

use anyhow::{Context as _, Result};

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Whether metadata describes a directory-like entry.
///
/// On Windows, `symlink_metadata().is_dir()` returns `false` for directory
/// symlinks, so the raw `FILE_ATTRIBUTE_DIRECTORY` bit is checked instead.
#[must_use]
pub fn is_dir_like(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0 // FILE_ATTRIBUTE_DIRECTORY
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

/// Whether anything (including a broken symlink) exists at `path`.
#[must_use]
pub fn entry_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Remove whatever occupies `path`: file, symlink, or directory tree.
///
/// Symlinks are unlinked, never followed — a directory symlink is removed
/// as a link, not recursed into.
///
/// # Errors
///
/// Returns an error if the entry cannot be removed.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    if meta.is_symlink() {
        remove_symlink_entry(path, &meta)
    } else if meta.is_dir() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("removing directory: {}", path.display()))
    } else {
        std::fs::remove_file(path).with_context(|| format!("removing file: {}", path.display()))
    }
}

/// Unlink the symlink at `path`, using `remove_dir` for directory symlinks
/// on platforms that require it.
///
/// # Errors
///
/// Returns an error if the link cannot be removed.
pub fn remove_symlink_entry(path: &Path, meta: &std::fs::Metadata) -> Result<()> {
    if cfg!(windows) && is_dir_like(meta) {
        std::fs::remove_dir(path)
            .with_context(|| format!("removing directory symlink: {}", path.display()))
    } else {
        std::fs::remove_file(path)
            .with_context(|| format!("removing symlink: {}", path.display()))
    }
}

/// Create a symlink at `link` pointing to `target`, directory-aware on
/// platforms that distinguish link flavors.
///
/// # Errors
///
/// Returns an error if the platform refuses; on Windows the message notes
/// the Developer Mode / privilege requirement.
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })
    }

    #[cfg(windows)]
    {
        let result = if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        result.with_context(|| {
            format!(
                "creating symlink {} -> {} (requires Developer Mode or administrator privileges)",
                link.display(),
                target.display()
            )
        })
    }
}

/// Copy `source` to `target`: a single file copy, or a recursive directory
/// copy. Symlinks inside the source tree are followed, so their content is
/// materialized rather than the link itself.
///
/// # Errors
///
/// Returns an error if any entry cannot be read or written.
pub fn copy_recursive(source: &Path, target: &Path) -> Result<()> {
    if source.is_dir() {
        std::fs::create_dir_all(target)
            .with_context(|| format!("creating directory {}", target.display()))?;
        for entry in std::fs::read_dir(source)
            .with_context(|| format!("reading directory {}", source.display()))?
        {
            let entry =
                entry.with_context(|| format!("reading entry in {}", source.display()))?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(source, target)
            .map(|_| ())
            .with_context(|| format!("copying {} to {}", source.display(), target.display()))
    }
}

/// Whether `dir` exists and contains no entries.
#[must_use]
pub fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}
