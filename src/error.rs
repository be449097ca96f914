//! Domain-specific error types for the deployment engine.
//!
//! Structured error hierarchy using [`thiserror`]. Engine modules return
//! typed errors; command handlers at the CLI boundary convert them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! EngineError
//! ├── Collision(CollisionError)   — two plan pairs share a target; plan-fatal
//! ├── Safety(SafetyViolation)     — target under a protected location; plan-fatal
//! ├── Registry(RegistryError)     — persistence layer failure; best-effort
//! └── Io { path, source }         — filesystem failure outside per-item work
//! ```
//!
//! Per-item failures during apply/undeploy/sweep use [`ItemError`] and are
//! collected into result sets rather than propagated — one file's failure
//! never aborts its siblings.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The computed plan maps two sources onto one target.
    #[error(transparent)]
    Collision(#[from] CollisionError),

    /// A plan target falls under a protected system location.
    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    /// The registry store could not be read or written.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A filesystem operation outside per-item work failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// One target claimed by two different sources within a single plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// The contested target path.
    pub target: PathBuf,
    /// The source that claimed the target first.
    pub existing_source: PathBuf,
    /// The source whose mapping collided with the existing claim.
    pub incoming_source: PathBuf,
}

impl std::fmt::Display for Collision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} claimed by both {} and {}",
            self.target.display(),
            self.existing_source.display(),
            self.incoming_source.display()
        )
    }
}

/// Fatal plan rejection: at least one target is claimed by multiple sources.
///
/// Carries the full collision list for user display. No filesystem mutation
/// has occurred when this is returned.
#[derive(Debug)]
pub struct CollisionError {
    /// Every collision found while enumerating the plan.
    pub collisions: Vec<Collision>,
}

impl std::error::Error for CollisionError {}

impl std::fmt::Display for CollisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} target collision(s) in plan:", self.collisions.len())?;
        for c in &self.collisions {
            write!(f, "\n  {c}")?;
        }
        Ok(())
    }
}

/// A plan target falls at or under a protected system location.
#[derive(Error, Debug)]
#[error("refusing to deploy to {target}: under protected location {protected}")]
pub struct SafetyViolation {
    /// The rejected target path.
    pub target: PathBuf,
    /// The protected location that contains it.
    pub protected: PathBuf,
}

/// Per-item failure during apply, undeploy, or sweep.
///
/// These are collected into the operation's result set; they never abort
/// sibling items.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// An existing target could not be removed or moved aside.
    #[error("could not clear existing target {target}: {reason}")]
    ConflictResolution {
        /// Target that could not be cleared.
        target: PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// The platform refused to create the link or copy.
    #[error("could not create {target}: {reason}")]
    Apply {
        /// Target that could not be created.
        target: PathBuf,
        /// Human-readable reason; for symlinks on Windows this mentions the
        /// privilege requirement.
        reason: String,
    },

    /// The artifact could not be removed during undeploy or sweep.
    #[error("could not remove {target}: {reason}")]
    Remove {
        /// Target that could not be removed.
        target: PathBuf,
        /// Human-readable reason.
        reason: String,
    },
}

/// Persistence-layer failure.
///
/// The registry is a ledger, not the source of truth for what exists on
/// disk, so callers log these and continue on a best-effort basis.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The store file could not be read or written.
    #[error("IO error on registry store {path}: {source}")]
    Io {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The store file contents could not be parsed or serialized.
    #[error("registry store {path} is corrupt: {message}")]
    Corrupt {
        /// Path of the store file.
        path: PathBuf,
        /// Parser or serializer message.
        message: String,
    },
}
