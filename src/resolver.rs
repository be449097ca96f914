//! Dependency resolution: expand a deploy request into an ordered list.
//!
//! Packages declare versioned library dependencies that must be deployed
//! first. Resolution walks those declarations depth-first with an explicit
//! seen-map accumulator threaded through the recursion — no ambient state —
//! so a call is referentially transparent and a library name resolves at
//! most once per call.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::model::{LibraryDependency, PackageConfig, VersionMode};

/// Result of a resolution call: the deploy order plus any warnings.
///
/// The order guarantees every dependency appears before any package that
/// depends on it.
#[derive(Debug, Clone, Default)]
pub struct ResolvedOrder {
    /// Package paths in dependencies-first deploy order.
    pub order: Vec<String>,
    /// Human-readable resolution warnings (unknown packages, missing
    /// libraries, version fallbacks).
    pub warnings: Vec<String>,
}

/// Expands deploy requests against the full set of known package configs.
#[derive(Debug)]
pub struct DependencyResolver<'a> {
    configs: &'a BTreeMap<String, PackageConfig>,
}

impl<'a> DependencyResolver<'a> {
    /// Resolver over a snapshot of all package configurations.
    #[must_use]
    pub const fn new(configs: &'a BTreeMap<String, PackageConfig>) -> Self {
        Self { configs }
    }

    /// Resolve `requested` into a dependencies-first deploy order.
    #[must_use]
    pub fn resolve(&self, requested: &[String]) -> ResolvedOrder {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut result = ResolvedOrder::default();
        for path in requested {
            self.visit_package(path, &mut seen, &mut result);
        }
        result
    }

    fn visit_package(
        &self,
        path: &str,
        seen: &mut HashMap<String, String>,
        result: &mut ResolvedOrder,
    ) {
        let Some(config) = self.configs.get(path) else {
            result
                .warnings
                .push(format!("requested package '{path}' has no configuration"));
            return;
        };
        for dep in &config.dependencies {
            self.resolve_library(dep, seen, result);
        }
        push_unique(&mut result.order, path);
    }

    fn resolve_library(
        &self,
        dep: &LibraryDependency,
        seen: &mut HashMap<String, String>,
        result: &mut ResolvedOrder,
    ) {
        if seen.contains_key(&dep.name) {
            return;
        }
        let candidates: Vec<&PackageConfig> = self
            .configs
            .values()
            .filter(|c| c.is_library && c.library_name.as_deref() == Some(&dep.name))
            .collect();
        if candidates.is_empty() {
            result
                .warnings
                .push(format!("no package provides library '{}'", dep.name));
            return;
        }
        let Some(selected) = select_candidate(dep, &candidates, &mut result.warnings) else {
            return;
        };
        debug!(
            library = %dep.name,
            package = %selected.path,
            version = %selected.version,
            "library candidate selected"
        );
        // Mark before recursing so a dependency cycle cannot loop.
        seen.insert(dep.name.clone(), selected.path.clone());
        for sub in &selected.dependencies {
            self.resolve_library(sub, seen, result);
        }
        push_unique(&mut result.order, &selected.path);
    }
}

/// Pick one candidate according to the dependency's version mode.
///
/// Returns `None` only for an empty candidate list, which callers rule out.
fn select_candidate<'c>(
    dep: &LibraryDependency,
    candidates: &[&'c PackageConfig],
    warnings: &mut Vec<String>,
) -> Option<&'c PackageConfig> {
    match dep.mode {
        VersionMode::Specific => {
            if let Some(wanted) = &dep.version {
                if let Some(exact) = candidates.iter().find(|c| &c.version == wanted) {
                    return Some(*exact);
                }
                warnings.push(format!(
                    "library '{}' has no candidate with version '{wanted}', \
                     falling back to priority ordering",
                    dep.name
                ));
            }
            best_by_priority(candidates)
        }
        VersionMode::Latest => best_by_version(candidates),
        VersionMode::Priority => best_by_priority(candidates),
    }
}

/// Highest version string wins (lexicographic descending).
fn best_by_version<'c>(candidates: &[&'c PackageConfig]) -> Option<&'c PackageConfig> {
    candidates
        .iter()
        .copied()
        .reduce(|best, c| if c.version > best.version { c } else { best })
}

/// Highest priority wins, version string breaking ties (both descending).
fn best_by_priority<'c>(candidates: &[&'c PackageConfig]) -> Option<&'c PackageConfig> {
    candidates.iter().copied().reduce(|best, c| {
        if (c.priority, &c.version) > (best.priority, &best.version) {
            c
        } else {
            best
        }
    })
}

fn push_unique(order: &mut Vec<String>, path: &str) {
    if !order.iter().any(|p| p == path) {
        order.push(path.to_string());
    }
}
