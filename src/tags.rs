//! Tag-based mutual exclusion between active packages.
//!
//! Packages sharing a conflict tag cannot both be active in the same scope:
//! `global` blocks across the whole library, `category` only within the
//! same parent category. A read-mostly pass over the registry snapshot,
//! consumed by callers before and after deploys.

use std::collections::BTreeMap;

use crate::model::{ConflictScope, PackageConfig};

/// A detected mutual-exclusion violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConflict {
    /// Path of the already-active conflicting package.
    pub package: String,
    /// The shared tag.
    pub tag: String,
    /// The scope that triggered the conflict.
    pub scope: ConflictScope,
}

/// Checks whether activating a package would collide with an active one.
#[derive(Debug)]
pub struct ConflictTagChecker<'a> {
    configs: &'a BTreeMap<String, PackageConfig>,
}

impl<'a> ConflictTagChecker<'a> {
    /// Checker over a snapshot of all package configurations.
    #[must_use]
    pub const fn new(configs: &'a BTreeMap<String, PackageConfig>) -> Self {
        Self { configs }
    }

    /// First active package that `candidate` would conflict with, if any.
    ///
    /// Two packages conflict when they share a tag and either side's scope
    /// is global, or both are category-scoped under the same parent
    /// category. Disabled scopes never conflict.
    #[must_use]
    pub fn check(&self, candidate: &PackageConfig) -> Option<TagConflict> {
        if candidate.conflict_scope == ConflictScope::Disabled {
            return None;
        }
        let tags = candidate.tags();
        if tags.is_empty() {
            return None;
        }

        for active in self.configs.values() {
            if !active.active
                || active.conflict_scope == ConflictScope::Disabled
                || active.path == candidate.path
            {
                continue;
            }
            let Some(shared) = tags
                .iter()
                .find(|t| active.tags().contains(*t))
            else {
                continue;
            };
            let global = candidate.conflict_scope == ConflictScope::Global
                || active.conflict_scope == ConflictScope::Global;
            let same_category = candidate.category() == active.category();
            if global || same_category {
                return Some(TagConflict {
                    package: active.path.clone(),
                    tag: (*shared).to_string(),
                    scope: if global {
                        ConflictScope::Global
                    } else {
                        ConflictScope::Category
                    },
                });
            }
        }
        None
    }
}
