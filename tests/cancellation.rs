//! Cooperative cancellation threaded through the top-level operations.

use std::sync::Arc;
use std::time::Duration;

use schemac::cancel::CancellationToken;
use schemac::graph::{Graph, GraphOptions};
use schemac::schema::{Loader, LoaderOptions};
use schemac::source::SourceId;
use schemac::validator::{RawInstance, Validator, ValidatorOptions};
use schemac::value::Value;

#[test]
fn a_cancelled_token_aborts_compilation_before_work_starts() {
    let token = CancellationToken::new();
    token.cancel();
    let loader = Loader::in_memory(LoaderOptions::default());
    let (schema, result) = loader.compile(SourceId::new("<test>"), r#"schema "S" type Item { id String primary }"#, &token);
    assert!(schema.is_none());
    assert!(!result.ok());
}

#[test]
fn validate_one_reports_a_system_error_once_cancelled() {
    let loader = Loader::in_memory(LoaderOptions::default());
    let (schema, result) = loader.compile(
        SourceId::new("<test>"),
        r#"schema "S" type Item { id String primary }"#,
        &CancellationToken::never(),
    );
    assert!(result.ok());
    let schema = Arc::new(schema.unwrap());
    let validator = Validator::new(schema, ValidatorOptions::default());

    let token = CancellationToken::new();
    token.cancel();
    let mut raw = RawInstance::default();
    raw.properties.insert("id".into(), Value::Str("1".into()));
    let (valid, failure, sys) = validator.validate_one("Item", raw, &token);
    assert!(valid.is_none());
    assert!(failure.is_none());
    assert!(sys.is_some());
}

#[test]
fn graph_add_reports_a_system_error_once_cancelled() {
    let loader = Loader::in_memory(LoaderOptions::default());
    let (schema, _) = loader.compile(
        SourceId::new("<test>"),
        r#"schema "S" type Item { id String primary }"#,
        &CancellationToken::never(),
    );
    let schema = Arc::new(schema.unwrap());
    let validator = Validator::new(schema.clone(), ValidatorOptions::default());
    let graph = Graph::new(schema, GraphOptions::default());

    let mut raw = RawInstance::default();
    raw.properties.insert("id".into(), Value::Str("1".into()));
    let (valid, _, _) = validator.validate_one("Item", raw, &CancellationToken::never());

    let token = CancellationToken::new();
    token.cancel();
    let (_, sys) = graph.add(valid.unwrap(), &token);
    assert!(sys.is_some());
}

#[test]
fn a_deadline_in_the_past_is_already_cancelled() {
    let token = CancellationToken::with_timeout(Duration::from_secs(0));
    std::thread::sleep(Duration::from_millis(5));
    assert!(token.is_cancelled());
}
