//! Parser shape checks: AST structure, recovery, and multiplicity sugar.

use schemac::ast::{Member, Multiplicity, RelationKind, TopLevel, TypeModifier};
use schemac::parser::parse;
use schemac::source::SourceId;

fn parse_ok(text: &str) -> schemac::ast::SchemaFile {
    let (file, result) = parse(SourceId::new("<test>"), text, 0);
    assert!(result.ok(), "{result}");
    file.expect("parsed file")
}

#[test]
fn schema_name_and_single_type_are_captured() {
    let file = parse_ok(r#"schema "S" type Item { id String primary name String required }"#);
    assert_eq!(file.name, "S");
    assert_eq!(file.items.len(), 1);
    let TopLevel::Type(item) = &file.items[0] else { panic!("expected a type decl") };
    assert_eq!(item.name, "Item");
    assert_eq!(item.modifier, TypeModifier::Concrete);
    assert_eq!(item.members.len(), 2);
    let Member::Property(id) = &item.members[0] else { panic!("expected a property") };
    assert!(id.flags.primary);
    let Member::Property(name) = &item.members[1] else { panic!("expected a property") };
    assert!(name.flags.required);
}

#[test]
fn a_reserved_datatype_keyword_cannot_be_used_as_a_type_name() {
    let (_, result) = parse(SourceId::new("<test>"), r#"schema "S" type Integer { id String primary }"#, 0);
    assert!(!result.ok());
}

#[test]
fn multiplicity_sugar_table_matches_the_grammar() {
    let cases = [
        ("", Multiplicity { optional: true, many: false }),
        ("(_)", Multiplicity { optional: true, many: false }),
        ("(_:one)", Multiplicity { optional: true, many: false }),
        ("(_:many)", Multiplicity { optional: true, many: true }),
        ("(one)", Multiplicity { optional: false, many: false }),
        ("(one:one)", Multiplicity { optional: false, many: false }),
        ("(one:many)", Multiplicity { optional: false, many: true }),
        ("(many)", Multiplicity { optional: true, many: true }),
    ];
    for (sugar, expected) in cases {
        let text = format!(r#"schema "S" type Item {{ id String primary --> REL {sugar} Item }}"#);
        let file = parse_ok(&text);
        let TopLevel::Type(item) = &file.items[0] else { panic!() };
        let Member::Relation(rel) = &item.members[1] else { panic!("expected a relation") };
        assert_eq!(rel.multiplicity, expected, "multiplicity sugar `{sugar}`");
        assert_eq!(rel.kind, RelationKind::Association);
    }
}

#[test]
fn composition_arrow_and_reverse_name_are_parsed() {
    let file = parse_ok(
        r#"schema "S" type Person { id String primary --> WORKS_AT (one) Company reverse EMPLOYS }
           type Company { id String primary }"#,
    );
    let TopLevel::Type(person) = &file.items[0] else { panic!() };
    let Member::Relation(rel) = &person.members[1] else { panic!() };
    assert_eq!(rel.kind, RelationKind::Association);
    assert_eq!(rel.target.name, "Company");
    assert_eq!(rel.reverse.as_deref(), Some("EMPLOYS"));
}

#[test]
fn recovers_from_a_malformed_type_and_keeps_parsing_the_rest() {
    let text = r#"
schema "S"

type Broken {
    id ???
}

type Fine {
    id String primary
}
"#;
    let (file, result) = parse(SourceId::new("<test>"), text, 0);
    assert!(!result.ok());
    let file = file.expect("recovers enough to keep a partial AST");
    assert!(file.items.iter().any(|item| matches!(item, TopLevel::Type(t) if t.name == "Fine")));
}

#[test]
fn invariant_body_retains_its_name_and_span() {
    let file = parse_ok(r#"schema "S" type Item { id String primary ! "nonempty" id -> Len > 0 }"#);
    let TopLevel::Type(item) = &file.items[0] else { panic!() };
    let Member::Invariant(inv) = &item.members[1] else { panic!("expected an invariant") };
    assert_eq!(inv.name, "nonempty");
}
