//! End-to-end scenarios exercising the full compile -> validate -> graph
//! pipeline against literal schema text and instance data.

use pretty_assertions::assert_eq;

use schemac::cancel::CancellationToken;
use schemac::diag::Code;
use schemac::graph::{Graph, GraphOptions};
use schemac::schema::{Loader, LoaderOptions};
use schemac::source::SourceId;
use schemac::validator::{RawInstance, Validator, ValidatorOptions};
use schemac::value::Value;
use std::sync::Arc;

fn compile(text: &str) -> schemac::Schema {
    let loader = Loader::in_memory(LoaderOptions::default());
    let (schema, result) = loader.compile(SourceId::new("<string>"), text, &CancellationToken::never());
    assert!(result.ok(), "unexpected diagnostics: {result}");
    schema.expect("schema compiled")
}

#[test]
fn syntax_pass_produces_one_type_with_expected_flags() {
    let text = r#"schema "S" type Item { id String primary name String required }"#;
    let schema = compile(text);
    let item = schema.type_by_name("Item").expect("Item type present");
    let id = item.properties.get("id").expect("id property");
    assert!(id.is_primary);
    let name = item.properties.get("name").expect("name property");
    assert!(name.is_required);
}

#[test]
fn invariant_evaluation_accepts_and_rejects() {
    let text = r#"
schema "S"

type Person {
    id String primary
    age Integer required

    ! "must_be_adult" age >= 18
}
"#;
    let schema = Arc::new(compile(text));
    let validator = Validator::new(schema, ValidatorOptions::default());

    let mut adult = RawInstance::default();
    adult.properties.insert("id".into(), Value::Str("1".into()));
    adult.properties.insert("age".into(), Value::Int(25));
    let (valid, failure, _) = validator.validate_one("Person", adult, &CancellationToken::never());
    assert!(failure.is_none());
    assert!(valid.is_some());

    let mut minor = RawInstance::default();
    minor.properties.insert("id".into(), Value::Str("2".into()));
    minor.properties.insert("age".into(), Value::Int(10));
    let (valid, failure, _) = validator.validate_one("Person", minor, &CancellationToken::never());
    assert!(valid.is_none());
    let failure = failure.expect("minor fails must_be_adult");
    assert_eq!(failure.issues.len(), 1);
    assert_eq!(failure.issues[0].code, Code::EInvariantFail);
    assert_eq!(failure.issues[0].message, "must_be_adult");
}

#[test]
fn widening_a_narrowed_bound_is_rejected() {
    let text = r#"
schema "S"

type Base {
    id String primary
    age Integer[0, 150]
}

type Wide extends Base {
    id String primary
    age Integer[-1, 200]
}
"#;
    let loader = Loader::in_memory(LoaderOptions::default());
    let (schema, result) = loader.compile(SourceId::new("<string>"), text, &CancellationToken::never());
    assert!(!result.ok());
    assert!(schema.is_none());
    assert!(result.issues.iter().any(|i| i.code == Code::EPropertyConflict));
}

#[test]
fn forward_reference_resolves_once_the_target_is_added() {
    let text = r#"
schema "S"

type Company {
    id String primary
}

type Person {
    id String primary
    --> WORKS_AT (one) Company
}
"#;
    let schema = Arc::new(compile(text));
    let validator = Validator::new(schema.clone(), ValidatorOptions::default());
    let graph = Graph::new(schema, GraphOptions::default());

    let mut alice = RawInstance::default();
    alice.properties.insert("id".into(), Value::Str("alice".into()));
    alice.properties.insert(
        "works_at".into(),
        Value::Map([("_target_id".to_string(), Value::Str("acme".into()))].into_iter().collect()),
    );
    let (valid, failure, _) = validator.validate_one("Person", alice, &CancellationToken::never());
    assert!(failure.is_none());
    graph.add(valid.unwrap(), &CancellationToken::never());

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.unresolved().len(), 1);
    assert_eq!(snapshot.edges().len(), 0);

    let mut acme = RawInstance::default();
    acme.properties.insert("id".into(), Value::Str("acme".into()));
    let (valid, failure, _) = validator.validate_one("Company", acme, &CancellationToken::never());
    assert!(failure.is_none());
    graph.add(valid.unwrap(), &CancellationToken::never());

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.unresolved().len(), 0);
    let edges = snapshot.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].relation, "WORKS_AT");
    assert_eq!(edges[0].source_key.canonical(), r#"["alice"]"#);
    assert_eq!(edges[0].target_key.canonical(), r#"["acme"]"#);
}

#[test]
fn types_snapshot_is_lexicographic_regardless_of_insertion_order() {
    let text = r#"
schema "S"

type Zebra { id String primary }
type Mango { id String primary }
type Apple { id String primary }
"#;
    let schema = Arc::new(compile(text));
    let validator = Validator::new(schema.clone(), ValidatorOptions::default());
    let graph = Graph::new(schema, GraphOptions::default());

    for (type_name, id) in [("Zebra", "z1"), ("Mango", "m1"), ("Apple", "a1")] {
        let mut raw = RawInstance::default();
        raw.properties.insert("id".into(), Value::Str(id.into()));
        let (valid, failure, _) = validator.validate_one(type_name, raw, &CancellationToken::never());
        assert!(failure.is_none());
        graph.add(valid.unwrap(), &CancellationToken::never());
    }

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.types(), vec!["Apple", "Mango", "Zebra"]);
}

#[test]
fn pipeline_lambda_over_nil_and_non_empty_list() {
    let text = r#"
schema "S"

type Doc {
    id String primary
    tags List<String>

    ! "all_non_empty" tags -> All |$t| { $t -> Len > 0 }
}
"#;
    let schema = Arc::new(compile(text));
    let validator = Validator::new(schema, ValidatorOptions::default());

    let mut nil_tags = RawInstance::default();
    nil_tags.properties.insert("id".into(), Value::Str("1".into()));
    let (valid, failure, _) = validator.validate_one("Doc", nil_tags, &CancellationToken::never());
    assert!(failure.is_none(), "{failure:?}");
    assert!(valid.is_some());

    let mut bad_tags = RawInstance::default();
    bad_tags.properties.insert("id".into(), Value::Str("2".into()));
    bad_tags.properties.insert(
        "tags".into(),
        Value::List(vec![Value::Str(String::new()), Value::Str("ok".into())]),
    );
    let (valid, failure, _) = validator.validate_one("Doc", bad_tags, &CancellationToken::never());
    assert!(valid.is_none());
    let failure = failure.expect("empty tag fails all_non_empty");
    assert!(failure.issues.iter().any(|i| i.code == Code::EInvariantFail && i.message == "all_non_empty"));
}
