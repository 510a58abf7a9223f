//! # schemac
//!
//! A schema definition language (SDL) toolchain: a schema author writes a
//! human-readable text describing types, their properties, relationships
//! (associations and compositions with multiplicities), inheritance, and
//! executable invariants. This crate compiles that text, validates instance
//! data against it, and assembles validated instances into a graph whose
//! structural integrity — primary-key uniqueness, reference resolution,
//! required-edge satisfaction — it guarantees.
//!
//! ## Pipeline
//!
//! ```text
//! SDL text -> lexer -> parser -> schema compiler -> Schema
//!                                                      |
//!                              raw property maps -> validator -> ValidInstance
//!                                                      |
//!                                             graph builder -> Snapshot
//! ```
//!
//! Every phase threads a bounded [`diag::Collector`] and never panics on
//! malformed input: it either returns a usable artifact alongside a clean
//! [`diag::Result`], or no artifact and a non-OK one.
//!
//! ## Modules
//!
//! - [`source`]: source identity and byte-offset-to-position resolution
//! - [`diag`]: diagnostic codes, severities, and the bounded collector
//! - [`lexer`]: tokenizes SDL text
//! - [`ast`]: the schema-declaration and expression ASTs
//! - [`parser`]: recursive-descent parser producing the AST
//! - [`eval`]: tree-walking invariant-expression evaluator
//! - [`schema`]: name resolution, import graph, inheritance merging,
//!   semantic checks, and the immutable [`schema::Schema`] model
//! - [`value`]: immutable, defensively-copyable value and key wrappers
//! - [`validator`]: raw property maps into typed [`validator::ValidInstance`]s
//! - [`graph`]: concurrent-safe accumulation into a snapshot-able instance graph
//! - [`cancel`]: cooperative cancellation threaded through every phase
//! - [`json`] (requires the `serde` feature): the reference adapter
//!
//! ## Example
//!
//! ```rust
//! use schemac::{Loader, LoaderOptions, SourceId, Validator, ValidatorOptions};
//! use std::sync::Arc;
//!
//! let text = r#"
//! schema "people"
//!
//! type Person {
//!     id String primary
//!     name String required
//!     age Integer[0, _]
//!
//!     ! "has_a_name" name -> Len > 0
//! }
//! "#;
//!
//! let loader = Loader::in_memory(LoaderOptions::default());
//! let (schema, result) = loader.compile(SourceId::new("<string>"), text, &Default::default());
//! assert!(result.ok());
//! let schema = Arc::new(schema.expect("schema compiled"));
//!
//! let validator = Validator::new(schema, ValidatorOptions::default());
//! let mut raw = schemac::validator::RawInstance::default();
//! raw.properties.insert("id".into(), schemac::value::Value::Str("p1".into()));
//! raw.properties.insert("name".into(), schemac::value::Value::Str("Ada".into()));
//! let (valid, failure, _) = validator.validate_one("Person", raw, &Default::default());
//! assert!(failure.is_none());
//! assert!(valid.is_some());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ast;
pub mod cancel;
pub mod diag;
pub mod eval;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod source;
pub mod validator;
pub mod value;

#[cfg(feature = "serde")]
pub mod json;

// Re-exports for convenience, matching each module's primary entry points.
pub use cancel::CancellationToken;
pub use diag::{Code, Collector, Issue, Result as DiagResult, Severity};
pub use graph::{Graph, GraphOptions, Snapshot};
pub use schema::{FsResolver, ImportResolver, Loader, LoaderOptions, NoImportsResolver, Schema};
pub use source::{Position, PositionRegistry, Span, SourceId};
pub use validator::{RawInstance, ValidInstance, Validator, ValidatorOptions};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn compile(text: &str) -> (Option<Schema>, DiagResult) {
        let loader = Loader::in_memory(LoaderOptions::default());
        loader.compile(SourceId::new("<string>"), text, &CancellationToken::never())
    }

    #[test]
    fn end_to_end_compile_validate_graph() {
        let text = r#"
schema "people"

type Company {
    id String primary
    name String required
}

type Person {
    id String primary
    name String required
    age Integer[0, _]

    --> WORKS_AT (one) Company

    ! "has_a_name" name -> Len > 0
}
"#;
        let (schema, result) = compile(text);
        assert!(result.ok(), "{result}");
        let schema = Arc::new(schema.expect("schema compiled"));

        let validator = Validator::new(schema.clone(), ValidatorOptions::default());
        let mut person = RawInstance::default();
        person.properties.insert("id".into(), Value::Str("alice".into()));
        person.properties.insert("name".into(), Value::Str("Alice".into()));
        person.properties.insert("age".into(), Value::Int(30));
        person.properties.insert(
            "works_at".into(),
            Value::Map(
                [("_target_id".to_string(), Value::Str("acme".into()))]
                    .into_iter()
                    .collect(),
            ),
        );
        let (valid_person, failure, _) = validator.validate_one("Person", person, &Default::default());
        assert!(failure.is_none());
        let valid_person = valid_person.unwrap();

        let mut company = RawInstance::default();
        company.properties.insert("id".into(), Value::Str("acme".into()));
        company.properties.insert("name".into(), Value::Str("Acme Corp".into()));
        let (valid_company, failure, _) = validator.validate_one("Company", company, &Default::default());
        assert!(failure.is_none());
        let valid_company = valid_company.unwrap();

        let graph = Graph::new(schema, GraphOptions::default());
        graph.add(valid_person, &Default::default());
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.unresolved().len(), 1);

        graph.add(valid_company, &Default::default());
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.unresolved().len(), 0);
        assert_eq!(snapshot.edges().len(), 1);
        assert_eq!(snapshot.edges()[0].relation, "WORKS_AT");
    }
}
