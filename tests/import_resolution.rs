//! Filesystem-backed import resolution: module-root clamping, cycle
//! detection, and cross-schema type references.

use schemac::cancel::CancellationToken;
use schemac::diag::Code;
use schemac::schema::{Loader, LoaderOptions};
use schemac::source::SourceId;
use std::fs;
use tempfile::tempdir;

#[test]
fn imported_type_is_reachable_via_a_qualified_reference() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(
        root.join("geo.sdl"),
        r#"schema "geo" type Place { id String primary }"#,
    )
    .unwrap();
    fs::write(
        root.join("main.sdl"),
        r#"
schema "main"
import "geo" as geo

type Visit {
    id String primary
    --> AT (one) geo.Place
}
"#,
    )
    .unwrap();

    let loader = Loader::filesystem(root, LoaderOptions::default());
    let entry = SourceId::new(root.join("main.sdl").display().to_string());
    let text = fs::read_to_string(root.join("main.sdl")).unwrap();
    let (schema, result) = loader.compile(entry, &text, &CancellationToken::never());
    assert!(result.ok(), "{result}");
    let schema = schema.unwrap();
    let visit = schema.type_by_name("Visit").unwrap();
    let at = visit.associations.get("AT").unwrap();
    assert!(schema.resolve_type(&at.target).is_some());
}

#[test]
fn an_import_cycle_is_rejected() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.sdl"), r#"schema "a" import "b" type A { id String primary }"#).unwrap();
    fs::write(root.join("b.sdl"), r#"schema "b" import "a" type B { id String primary }"#).unwrap();

    let loader = Loader::filesystem(root, LoaderOptions::default());
    let entry = SourceId::new(root.join("a.sdl").display().to_string());
    let text = fs::read_to_string(root.join("a.sdl")).unwrap();
    let (schema, result) = loader.compile(entry, &text, &CancellationToken::never());
    assert!(!result.ok());
    assert!(result.issues.iter().any(|i| i.code == Code::EImportCycle));
    let _ = schema;
}

#[test]
fn an_import_path_escaping_the_module_root_is_rejected() {
    let dir = tempdir().unwrap();
    let root_dir = dir.path().join("root");
    fs::create_dir(&root_dir).unwrap();
    fs::write(dir.path().join("outside.sdl"), r#"schema "outside" type Secret { id String primary }"#).unwrap();
    fs::write(
        root_dir.join("main.sdl"),
        r#"schema "main" import "../outside" type Item { id String primary }"#,
    )
    .unwrap();

    let loader = Loader::filesystem(&root_dir, LoaderOptions::default());
    let entry = SourceId::new(root_dir.join("main.sdl").display().to_string());
    let text = fs::read_to_string(root_dir.join("main.sdl")).unwrap();
    let (schema, result) = loader.compile(entry, &text, &CancellationToken::never());
    assert!(!result.ok());
    assert!(result.issues.iter().any(|i| i.code == Code::EPathEscape));
    let _ = schema;
}

#[test]
fn duplicate_import_aliases_are_rejected() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("geo.sdl"), r#"schema "geo" type Place { id String primary }"#).unwrap();
    fs::write(
        root.join("main.sdl"),
        r#"
schema "main"
import "geo" as g
import "geo" as g

type Item { id String primary }
"#,
    )
    .unwrap();

    let loader = Loader::filesystem(root, LoaderOptions::default());
    let entry = SourceId::new(root.join("main.sdl").display().to_string());
    let text = fs::read_to_string(root.join("main.sdl")).unwrap();
    let (_, result) = loader.compile(entry, &text, &CancellationToken::never());
    assert!(!result.ok());
    assert!(result.issues.iter().any(|i| i.code == Code::EImportDuplicate));
}
