#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Dependency resolution and tag-conflict properties through the engine
//! facade.

mod common;

use common::TestWorkspace;
use packdeck::engine::Engine;
use packdeck::model::{ConflictScope, LibraryDependency, PackageConfig, VersionMode};
use packdeck::registry::Registry as _;

fn library(path: &str, name: &str, version: &str, priority: i64) -> PackageConfig {
    let mut config = PackageConfig::new(path);
    config.is_library = true;
    config.library_name = Some(name.to_string());
    config.version = version.to_string();
    config.priority = priority;
    config
}

// ---------------------------------------------------------------------------
// Dependency ordering
// ---------------------------------------------------------------------------

/// A package depending on a priority-mode library with candidates of
/// priority 5 and 9 resolves to the priority-9 candidate, ordered first.
#[test]
fn priority_mode_selects_highest_priority_candidate_first() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let engine = Engine::new(&registry, ws.content_root(), ws.target_root());

    let mut app = PackageConfig::new("apps/a");
    app.dependencies.push(LibraryDependency {
        name: "l".to_string(),
        mode: VersionMode::Priority,
        version: None,
    });
    registry.upsert_config(app).unwrap();
    registry.upsert_config(library("libs/l1", "l", "1.0", 5)).unwrap();
    registry.upsert_config(library("libs/l2", "l", "1.0", 9)).unwrap();

    let resolved = engine.resolve_dependencies(&["apps/a".to_string()]);

    assert_eq!(resolved.order, vec!["libs/l2", "apps/a"]);
}

/// The full deploy flow applies packages in dependency order.
#[cfg(unix)]
#[test]
fn deploy_runs_dependencies_before_dependents() {
    let ws = TestWorkspace::new();
    ws.add_source_file("libs/core", "core.dat", b"c");
    ws.add_source_file("apps/a", "app.cfg", b"a");
    let registry = ws.registry();
    let engine = Engine::new(&registry, ws.content_root(), ws.target_root());

    registry
        .upsert_config(library("libs/core", "core", "1.0", 0))
        .unwrap();
    let mut app = PackageConfig::new("apps/a");
    app.dependencies.push(LibraryDependency {
        name: "core".to_string(),
        mode: VersionMode::Latest,
        version: None,
    });
    registry.upsert_config(app).unwrap();

    let run = engine.deploy(&["apps/a".to_string()]).unwrap();

    let order: Vec<&str> = run.packages.iter().map(|p| p.package.as_str()).collect();
    assert_eq!(order, vec!["libs/core", "apps/a"]);
    assert!(ws.target_root().join("core").symlink_metadata().is_ok());
    assert!(ws.target_root().join("a").symlink_metadata().is_ok());
}

// ---------------------------------------------------------------------------
// Tag conflicts
// ---------------------------------------------------------------------------

/// Two active packages with a shared global tag conflict with each other,
/// whichever direction is checked.
#[test]
fn global_tag_conflict_is_detected_both_ways() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let engine = Engine::new(&registry, ws.content_root(), ws.target_root());

    for path in ["weapons/sword", "weapons/axe"] {
        let mut config = PackageConfig::new(path);
        config.conflict_tag = "weapons".to_string();
        config.conflict_scope = ConflictScope::Global;
        config.active = true;
        registry.upsert_config(config).unwrap();
    }

    let first = engine.check_tag_conflict("weapons/sword").unwrap();
    assert_eq!(first.package, "weapons/axe");
    assert_eq!(first.tag, "weapons");

    let second = engine.check_tag_conflict("weapons/axe").unwrap();
    assert_eq!(second.package, "weapons/sword");
}

/// Category-scoped tags only conflict inside the same parent category.
#[test]
fn category_tag_conflict_respects_category_boundaries() {
    let ws = TestWorkspace::new();
    let registry = ws.registry();
    let engine = Engine::new(&registry, ws.content_root(), ws.target_root());

    let mut active = PackageConfig::new("weapons/sword");
    active.conflict_tag = "melee".to_string();
    active.conflict_scope = ConflictScope::Category;
    active.active = true;
    registry.upsert_config(active).unwrap();

    let mut same_category = PackageConfig::new("weapons/axe");
    same_category.conflict_tag = "melee".to_string();
    same_category.conflict_scope = ConflictScope::Category;
    registry.upsert_config(same_category).unwrap();

    let mut other_category = PackageConfig::new("armor/plate");
    other_category.conflict_tag = "melee".to_string();
    other_category.conflict_scope = ConflictScope::Category;
    registry.upsert_config(other_category).unwrap();

    assert!(engine.check_tag_conflict("weapons/axe").is_some());
    assert!(engine.check_tag_conflict("armor/plate").is_none());
}
