//! Instance validator (C7): raw property maps into typed, immutable
//! [`ValidInstance`]s, running datatype constraints, required/primary
//! modifiers, and invariants.
//!
//! The validator holds only a read-only [`Schema`] reference after
//! construction, so one [`Validator`] may be shared and called from
//! multiple threads.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::cancel::CancellationToken;
use crate::diag::{Code, Collector, Issue};
use crate::eval;
use crate::schema::{Constraint, Property, Relation, Schema, Type, TypeId, TypeKind};
use crate::source::Span;
use crate::value::{EdgeTarget, Key, KeyComponent, Properties, Provenance, Slice, SortedMap, Value};

/// A raw property map as delivered by an adapter: untyped, unvalidated,
/// and optionally carrying a type hint and provenance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawInstance {
    /// The adapter's best guess at this instance's declared type, if it
    /// tags instances independently of the bucket it was delivered under.
    pub type_hint: Option<String>,
    /// Property name to dynamic value, as delivered by the adapter.
    pub properties: BTreeMap<String, Value>,
    /// Where this instance came from, for diagnostic rendering.
    pub provenance: Option<Provenance>,
}

/// A fully validated, immutable instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidInstance {
    /// The bare name of the validated-against type.
    pub type_name: String,
    /// The full identity of the validated-against type.
    pub type_id: TypeId,
    /// This instance's primary key.
    pub primary_key: Key,
    /// Typed, validated scalar properties (nil for missing optionals).
    pub properties: Properties,
    /// Outgoing association targets, keyed by relation name.
    pub edges: SortedMap<String, Slice<EdgeTarget>>,
    /// Inline composition children, already validated, keyed by relation
    /// name.
    pub composed: SortedMap<String, Slice<ValidInstance>>,
    /// Where this instance came from, for diagnostic rendering.
    pub provenance: Option<Provenance>,
}

/// A raw instance that failed validation: no [`ValidInstance`] exists for
/// it, only the diagnostics explaining why. Exactly one of
/// `(ValidInstance, Failure)` is produced per instance.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The type name validation was attempted against.
    pub type_name: String,
    /// Where the failing instance came from, if known.
    pub provenance: Option<Provenance>,
    /// Every diagnostic collected while attempting to validate it.
    pub issues: Vec<Issue>,
}

/// A catastrophic validator failure distinct from an ordinary [`Failure`]
///.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidatorSystemError {
    /// The calling context was cancelled before or during validation.
    #[error("validation cancelled")]
    Cancelled,
}

/// Validator configuration, all default-safe.
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Require exact-case property/relation names (default: case-insensitive).
    pub strict_property_names: bool,
    /// Ignore properties not declared on the type instead of rejecting them.
    pub allow_unknown_fields: bool,
    /// Bound on diagnostics collected per instance (`0` = unlimited).
    pub max_issues_per_instance: usize,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            strict_property_names: false,
            allow_unknown_fields: false,
            max_issues_per_instance: 0,
        }
    }
}

/// Turns [`RawInstance`]s into [`ValidInstance`]s against a compiled
/// [`Schema`].
pub struct Validator {
    schema: Arc<Schema>,
    options: ValidatorOptions,
}

impl Validator {
    /// Builds a validator bound to `schema`.
    pub fn new(schema: Arc<Schema>, options: ValidatorOptions) -> Self {
        Self { schema, options }
    }

    /// The schema this validator checks against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validates one raw instance against `type_name`.
    pub fn validate_one(
        &self,
        type_name: &str,
        raw: RawInstance,
        cancel: &CancellationToken,
    ) -> (Option<ValidInstance>, Option<Failure>, Option<ValidatorSystemError>) {
        if cancel.is_cancelled() {
            return (None, None, Some(ValidatorSystemError::Cancelled));
        }
        let Some(ty) = self.schema.type_by_name(type_name) else {
            return (
                None,
                Some(Failure {
                    type_name: type_name.to_string(),
                    provenance: raw.provenance,
                    issues: vec![Issue::error(Code::EInstanceTypeNotFound, format!("unknown type `{type_name}`")).build()],
                }),
                None,
            );
        };
        match ty.kind {
            TypeKind::Abstract => {
                return (
                    None,
                    Some(Failure {
                        type_name: type_name.to_string(),
                        provenance: raw.provenance,
                        issues: vec![Issue::error(Code::EAbstractType, format!("`{type_name}` is abstract and cannot be instantiated")).build()],
                    }),
                    None,
                );
            }
            TypeKind::Part => {
                return (
                    None,
                    Some(Failure {
                        type_name: type_name.to_string(),
                        provenance: raw.provenance,
                        issues: vec![Issue::error(
                            Code::EInstanceTypeNotFound,
                            format!("`{type_name}` is a part type; use validate_for_composition instead"),
                        )
                        .with_detail("kind", "part")
                        .build()],
                    }),
                    None,
                );
            }
            TypeKind::Concrete => {}
        }
        let (inst, collector) = self.validate_against_type(ty, &raw);
        let result = collector.finish();
        match inst {
            Some(vi) => (Some(vi), None, None),
            None => (
                None,
                Some(Failure {
                    type_name: type_name.to_string(),
                    provenance: raw.provenance,
                    issues: result.issues,
                }),
                None,
            ),
        }
    }

    /// Validates a batch of raw instances, all declared against `type_name`.
    pub fn validate(
        &self,
        type_name: &str,
        raws: Vec<RawInstance>,
        cancel: &CancellationToken,
    ) -> (Vec<ValidInstance>, Vec<Failure>, Option<ValidatorSystemError>) {
        let mut valid = Vec::new();
        let mut failures = Vec::new();
        for raw in raws {
            if cancel.is_cancelled() {
                return (valid, failures, Some(ValidatorSystemError::Cancelled));
            }
            let (ok, failure, sys) = self.validate_one(type_name, raw, cancel);
            if let Some(sys) = sys {
                return (valid, failures, Some(sys));
            }
            if let Some(ok) = ok {
                valid.push(ok);
            }
            if let Some(failure) = failure {
                failures.push(failure);
            }
        }
        (valid, failures, None)
    }

    /// Validates raw children against the part type named by
    /// `relation_name` on `parent_type`, without requiring a type tag
    ///.
    pub fn validate_for_composition(
        &self,
        parent_type: &str,
        relation_name: &str,
        raws: Vec<RawInstance>,
        cancel: &CancellationToken,
    ) -> (Vec<ValidInstance>, Vec<Failure>, Option<ValidatorSystemError>) {
        let Some(parent) = self.schema.type_by_name(parent_type) else {
            return (
                Vec::new(),
                raws.into_iter()
                    .map(|r| Failure {
                        type_name: parent_type.to_string(),
                        provenance: r.provenance,
                        issues: vec![Issue::error(Code::EInstanceTypeNotFound, format!("unknown type `{parent_type}`")).build()],
                    })
                    .collect(),
                None,
            );
        };
        let Some(rel) = parent.compositions.get(relation_name) else {
            return (
                Vec::new(),
                raws.into_iter()
                    .map(|r| Failure {
                        type_name: parent_type.to_string(),
                        provenance: r.provenance,
                        issues: vec![Issue::error(
                            Code::EInternal,
                            format!("`{relation_name}` is not a composition on `{parent_type}`"),
                        )
                        .build()],
                    })
                    .collect(),
                None,
            );
        };
        let Some(part_ty) = self.schema.resolve_type(&rel.target) else {
            return (
                Vec::new(),
                raws.into_iter()
                    .map(|r| Failure {
                        type_name: parent_type.to_string(),
                        provenance: r.provenance,
                        issues: vec![Issue::error(Code::EInternal, format!("composition target `{}` could not be resolved", rel.target)).build()],
                    })
                    .collect(),
                None,
            );
        };
        let mut valid = Vec::new();
        let mut failures = Vec::new();
        for raw in raws {
            if cancel.is_cancelled() {
                return (valid, failures, Some(ValidatorSystemError::Cancelled));
            }
            let (inst, collector) = self.validate_against_type(part_ty, &raw);
            let result = collector.finish();
            match inst {
                Some(vi) => valid.push(vi),
                None => failures.push(Failure {
                    type_name: part_ty.id.name.clone(),
                    provenance: raw.provenance,
                    issues: result.issues,
                }),
            }
        }
        (valid, failures, None)
    }

    fn validate_against_type(&self, ty: &Type, raw: &RawInstance) -> (Option<ValidInstance>, Collector) {
        let mut collector = Collector::new(self.options.max_issues_per_instance);
        let mut consumed: HashSet<String> = HashSet::new();
        let typed_props = self.validate_properties(&ty.properties, &raw.properties, &mut consumed, &mut collector);

        let mut composed: BTreeMap<String, Vec<ValidInstance>> = BTreeMap::new();
        for (rel_name, rel) in &ty.compositions {
            let Some((raw_key, value)) = find_property(&raw.properties, rel_name, self.options.strict_property_names) else {
                continue;
            };
            consumed.insert(raw_key.to_string());
            let Some(part_ty) = self.schema.resolve_type(&rel.target) else {
                collector.collect(
                    Issue::error(
                        Code::EInternal,
                        format!("composition target `{}` for relation `{rel_name}` could not be resolved", rel.target),
                    )
                    .with_span(rel.span.clone())
                    .build(),
                );
                continue;
            };
            let raw_children = self.extract_composition_maps(rel_name, rel, value, &mut collector);
            let mut children = Vec::new();
            for child_map in raw_children {
                let child_raw = RawInstance {
                    type_hint: None,
                    properties: child_map.clone(),
                    provenance: raw.provenance.clone(),
                };
                let (child_inst, child_collector) = self.validate_against_type(part_ty, &child_raw);
                collector.absorb(child_collector);
                if let Some(ci) = child_inst {
                    children.push(ci);
                }
            }
            composed.insert(rel_name.clone(), children);
        }

        let mut edges: BTreeMap<String, Vec<EdgeTarget>> = BTreeMap::new();
        for (rel_name, rel) in &ty.associations {
            let Some((raw_key, value)) = find_property(&raw.properties, rel_name, self.options.strict_property_names) else {
                continue;
            };
            consumed.insert(raw_key.to_string());
            let targets = self.extract_edges(rel, value, &mut collector);
            edges.insert(rel_name.clone(), targets);
        }

        if !self.options.allow_unknown_fields {
            for key in raw.properties.keys() {
                let seen = if self.options.strict_property_names {
                    consumed.contains(key)
                } else {
                    consumed.iter().any(|c| c.eq_ignore_ascii_case(key))
                };
                if !seen {
                    collector.collect(
                        Issue::error(Code::EUnknownField, format!("unknown field `{key}`"))
                            .with_detail("field", key.clone())
                            .build(),
                    );
                }
            }
        }

        let properties: Properties = SortedMap::new(typed_props.clone());
        for inv in &ty.invariants {
            match eval::evaluate(&inv.body, &properties) {
                Ok(Value::Bool(true)) => {}
                Ok(_) => {
                    collector.collect(Issue::error(Code::EInvariantFail, inv.name.clone()).with_span(inv.span.clone()).build());
                }
                Err(e) => {
                    collector.collect(Issue::error(Code::EInvariantFail, inv.name.clone()).with_span(inv.span.clone()).build());
                    collector.collect(Issue::error(Code::EEvalError, e.to_string()).with_span(inv.span.clone()).build());
                }
            }
        }

        if collector.has_errors() {
            return (None, collector);
        }

        let pk_components: Vec<KeyComponent> = ty
            .primary_key_properties()
            .iter()
            .filter_map(|p| typed_props.get(&p.name).and_then(|v| key_component_from_value(v, &p.constraint)))
            .collect();
        let primary_key = Key::new(pk_components);

        let edges_map: SortedMap<String, Slice<EdgeTarget>> = edges.into_iter().map(|(k, v)| (k, Slice::new(v))).collect();
        let composed_map: SortedMap<String, Slice<ValidInstance>> = composed.into_iter().map(|(k, v)| (k, Slice::new(v))).collect();

        let instance = ValidInstance {
            type_name: ty.id.name.clone(),
            type_id: ty.id.clone(),
            primary_key,
            properties,
            edges: edges_map,
            composed: composed_map,
            provenance: raw.provenance.clone(),
        };
        (Some(instance), collector)
    }

    fn validate_properties(
        &self,
        props: &IndexMap<String, Property>,
        raw: &BTreeMap<String, Value>,
        consumed: &mut HashSet<String>,
        collector: &mut Collector,
    ) -> BTreeMap<String, Value> {
        let mut typed = BTreeMap::new();
        for (name, prop) in props {
            match find_property(raw, name, self.options.strict_property_names) {
                Some((raw_key, value)) => {
                    consumed.insert(raw_key.to_string());
                    let normalized = self.check_constraint(value, &prop.constraint, name, &prop.span, collector);
                    typed.insert(name.clone(), normalized);
                }
                None => {
                    if prop.is_required {
                        collector.collect(
                            Issue::error(Code::EMissingRequired, format!("missing required property `{name}`"))
                                .with_span(prop.span.clone())
                                .with_detail("property", name.clone())
                                .build(),
                        );
                    }
                    typed.insert(name.clone(), Value::Nil);
                }
            }
        }
        typed
    }

    fn extract_composition_maps<'v>(
        &self,
        rel_name: &str,
        rel: &Relation,
        value: &'v Value,
        collector: &mut Collector,
    ) -> Vec<&'v BTreeMap<String, Value>> {
        if rel.many {
            match value {
                Value::List(items) => {
                    let mut out = Vec::new();
                    for item in items {
                        match item {
                            Value::Map(m) => out.push(m),
                            _ => {
                                collector.collect(
                                    Issue::error(Code::ETypeMismatch, format!("composition `{rel_name}` expects a list of objects"))
                                        .with_span(rel.span.clone())
                                        .build(),
                                );
                            }
                        }
                    }
                    out
                }
                _ => {
                    collector.collect(
                        Issue::error(Code::ETypeMismatch, format!("composition `{rel_name}` expects a list"))
                            .with_span(rel.span.clone())
                            .build(),
                    );
                    Vec::new()
                }
            }
        } else {
            match value {
                Value::Map(m) => vec![m],
                _ => {
                    collector.collect(
                        Issue::error(Code::ETypeMismatch, format!("composition `{rel_name}` expects an object"))
                            .with_span(rel.span.clone())
                            .build(),
                    );
                    Vec::new()
                }
            }
        }
    }

    fn extract_edges(&self, rel: &Relation, value: &Value, collector: &mut Collector) -> Vec<EdgeTarget> {
        let Some(target_ty) = self.schema.resolve_type(&rel.target) else {
            collector.collect(
                Issue::error(
                    Code::EInternal,
                    format!("association target `{}` for relation `{}` could not be resolved", rel.target, rel.name),
                )
                .with_span(rel.span.clone())
                .build(),
            );
            return Vec::new();
        };
        let pk_props = target_ty.primary_key_properties();

        let entries: Vec<&BTreeMap<String, Value>> = if rel.many {
            match value {
                Value::List(items) => {
                    let mut out = Vec::new();
                    for item in items {
                        match item {
                            Value::Map(m) => out.push(m),
                            _ => {
                                collector.collect(
                                    Issue::error(Code::ETypeMismatch, format!("association `{}` expects a list of edge objects", rel.name))
                                        .with_span(rel.span.clone())
                                        .build(),
                                );
                            }
                        }
                    }
                    out
                }
                _ => {
                    collector.collect(
                        Issue::error(Code::ETypeMismatch, format!("association `{}` expects a list", rel.name))
                            .with_span(rel.span.clone())
                            .build(),
                    );
                    Vec::new()
                }
            }
        } else {
            match value {
                Value::Map(m) => vec![m],
                _ => {
                    collector.collect(
                        Issue::error(Code::ETypeMismatch, format!("association `{}` expects an edge object", rel.name))
                            .with_span(rel.span.clone())
                            .build(),
                    );
                    Vec::new()
                }
            }
        };

        let mut targets = Vec::new();
        for edge_map in entries {
            let mut components = Vec::new();
            let mut ok = true;
            for pk_prop in &pk_props {
                let sigil = format!("_target_{}", pk_prop.name);
                match find_property(edge_map, &sigil, self.options.strict_property_names) {
                    Some((_, v)) => match key_component_from_value(v, &pk_prop.constraint) {
                        Some(c) => components.push(c),
                        None => {
                            ok = false;
                            collector.collect(
                                Issue::error(Code::EConstraintFail, format!("association `{}` target key `{sigil}` has the wrong type", rel.name))
                                    .with_span(rel.span.clone())
                                    .build(),
                            );
                        }
                    },
                    None => {
                        ok = false;
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("association `{}` is missing target key `{sigil}`", rel.name))
                                .with_span(rel.span.clone())
                                .build(),
                        );
                    }
                }
            }
            if !ok {
                continue;
            }
            let mut edge_consumed: HashSet<String> = pk_props.iter().map(|p| format!("_target_{}", p.name)).collect();
            let edge_props = self.validate_properties(&rel.properties, edge_map, &mut edge_consumed, collector);
            targets.push(EdgeTarget {
                target_key: Key::new(components),
                edge_properties: SortedMap::new(edge_props),
            });
        }
        targets
    }

    #[allow(clippy::only_used_in_recursion)]
    fn check_constraint(&self, value: &Value, constraint: &Constraint, name: &str, span: &Span, collector: &mut Collector) -> Value {
        match constraint {
            Constraint::Integer { min, max } => match value {
                Value::Int(i) => {
                    if min.is_some_and(|m| *i < m) || max.is_some_and(|m| *i > m) {
                        collector.collect(Issue::error(Code::EConstraintFail, format!("`{name}` = {i} is out of bounds")).with_span(span.clone()).build());
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "Integer", value, span));
                    value.clone()
                }
            },
            Constraint::Float { min, max } => match value {
                Value::Int(i) => {
                    let f = *i as f64;
                    check_float_bounds(f, min, max, name, span, collector);
                    Value::Float(f)
                }
                Value::Float(f) => {
                    check_float_bounds(*f, min, max, name, span, collector);
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "Float", value, span));
                    value.clone()
                }
            },
            Constraint::Boolean => match value {
                Value::Bool(_) => value.clone(),
                _ => {
                    collector.collect(type_mismatch(name, "Boolean", value, span));
                    value.clone()
                }
            },
            Constraint::String { min_runes, max_runes } => match value {
                Value::Str(s) => {
                    let len = s.chars().count() as u32;
                    if min_runes.is_some_and(|m| len < m) || max_runes.is_some_and(|m| len > m) {
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("`{name}` has {len} runes, out of bounds"))
                                .with_span(span.clone())
                                .build(),
                        );
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "String", value, span));
                    value.clone()
                }
            },
            Constraint::Enum { options } => match value {
                Value::Str(s) => {
                    if !options.iter().any(|o| o == s) {
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("`{name}` = \"{s}\" is not one of the declared enum options"))
                                .with_span(span.clone())
                                .build(),
                        );
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "Enum", value, span));
                    value.clone()
                }
            },
            Constraint::Pattern { first, second } => match value {
                Value::Str(s) => {
                    for pattern in std::iter::once(first).chain(second.iter()) {
                        match regex::Regex::new(pattern) {
                            Ok(re) => {
                                if !re.is_match(s) {
                                    collector.collect(
                                        Issue::error(Code::EConstraintFail, format!("`{name}` does not match pattern `/{pattern}/`"))
                                            .with_span(span.clone())
                                            .build(),
                                    );
                                }
                            }
                            Err(e) => {
                                collector.collect(
                                    Issue::error(Code::EConstraintFail, format!("invalid pattern `/{pattern}/`: {e}"))
                                        .with_span(span.clone())
                                        .build(),
                                );
                            }
                        }
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "Pattern", value, span));
                    value.clone()
                }
            },
            Constraint::Timestamp => match value {
                Value::Str(s) => {
                    if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("`{name}` is not a valid RFC 3339 timestamp"))
                                .with_span(span.clone())
                                .build(),
                        );
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "Timestamp", value, span));
                    value.clone()
                }
            },
            Constraint::Date => match value {
                Value::Str(s) => {
                    if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() {
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("`{name}` is not a valid date (YYYY-MM-DD)"))
                                .with_span(span.clone())
                                .build(),
                        );
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "Date", value, span));
                    value.clone()
                }
            },
            Constraint::Uuid => match value {
                Value::Str(s) => {
                    if uuid::Uuid::parse_str(s).is_err() {
                        collector.collect(Issue::error(Code::EConstraintFail, format!("`{name}` is not a valid UUID")).with_span(span.clone()).build());
                    }
                    value.clone()
                }
                _ => {
                    collector.collect(type_mismatch(name, "UUID", value, span));
                    value.clone()
                }
            },
            Constraint::Vector { dim } => match value {
                Value::List(items) => {
                    if items.len() as u32 != *dim {
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("`{name}` has {} elements, expected {dim}", items.len()))
                                .with_span(span.clone())
                                .build(),
                        );
                    }
                    let mut out = Vec::with_capacity(items.len());
                    let mut all_numeric = true;
                    for item in items {
                        match item {
                            Value::Int(i) => out.push(Value::Float(*i as f64)),
                            Value::Float(f) => out.push(Value::Float(*f)),
                            other => {
                                all_numeric = false;
                                out.push(other.clone());
                            }
                        }
                    }
                    if !all_numeric {
                        collector.collect(Issue::error(Code::EConstraintFail, format!("`{name}` must contain only numbers")).with_span(span.clone()).build());
                    }
                    Value::List(out)
                }
                _ => {
                    collector.collect(type_mismatch(name, "Vector", value, span));
                    value.clone()
                }
            },
            Constraint::List { element, min_len, max_len } => match value {
                Value::List(items) => {
                    if min_len.is_some_and(|m| (items.len() as u32) < m) || max_len.is_some_and(|m| (items.len() as u32) > m) {
                        collector.collect(
                            Issue::error(Code::EConstraintFail, format!("`{name}` has {} elements, out of bounds", items.len()))
                                .with_span(span.clone())
                                .build(),
                        );
                    }
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.check_constraint(item, element, name, span, collector));
                    }
                    Value::List(out)
                }
                _ => {
                    collector.collect(type_mismatch(name, "List", value, span));
                    value.clone()
                }
            },
        }
    }
}

fn type_mismatch(name: &str, expected: &str, actual: &Value, span: &Span) -> Issue {
    Issue::error(Code::ETypeMismatch, format!("`{name}` expected {expected}, found {}", actual.type_name()))
        .with_span(span.clone())
        .build()
}

fn check_float_bounds(f: f64, min: &Option<f64>, max: &Option<f64>, name: &str, span: &Span, collector: &mut Collector) {
    if min.is_some_and(|m| f < m) || max.is_some_and(|m| f > m) {
        collector.collect(Issue::error(Code::EConstraintFail, format!("`{name}` = {f} is out of bounds")).with_span(span.clone()).build());
    }
}

/// Finds a raw value by name-matching policy: exact case under `strict`,
/// case-insensitive otherwise. Returns the raw key actually matched, for
/// unknown-field accounting.
fn find_property<'v>(raw: &'v BTreeMap<String, Value>, name: &str, strict: bool) -> Option<(&'v str, &'v Value)> {
    if strict {
        raw.get_key_value(name).map(|(k, v)| (k.as_str(), v))
    } else {
        raw.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(k, v)| (k.as_str(), v))
    }
}

/// Builds a primary-key component from a validated scalar value, given the
/// constraint that validated it. Only the primary-key-eligible constraint
/// kinds ever reach this.
fn key_component_from_value(value: &Value, constraint: &Constraint) -> Option<KeyComponent> {
    match (value, constraint) {
        (Value::Str(s), Constraint::String { .. }) => Some(KeyComponent::Str(s.clone())),
        (Value::Str(s), Constraint::Uuid) => Some(KeyComponent::Uuid(s.clone())),
        (Value::Str(s), Constraint::Date) => Some(KeyComponent::Date(s.clone())),
        (Value::Str(s), Constraint::Timestamp) => Some(KeyComponent::Timestamp(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Loader, LoaderOptions};
    use crate::source::SourceId;

    fn compile(text: &str) -> Arc<Schema> {
        let loader = Loader::in_memory(LoaderOptions::default());
        let (schema, result) = loader.compile(SourceId::new("<test>"), text, &CancellationToken::never());
        assert!(result.ok(), "unexpected errors: {result}");
        Arc::new(schema.expect("schema"))
    }

    fn raw(pairs: &[(&str, Value)]) -> RawInstance {
        RawInstance {
            type_hint: None,
            properties: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            provenance: None,
        }
    }

    #[test]
    fn missing_required_property_fails() {
        let schema = compile(r#"schema "S" type Item { id String primary name String required }"#);
        let validator = Validator::new(schema, ValidatorOptions::default());
        let (inst, failure, sys) = validator.validate_one("Item", raw(&[("id", Value::Str("1".into()))]), &CancellationToken::never());
        assert!(sys.is_none());
        assert!(inst.is_none());
        let failure = failure.unwrap();
        assert!(failure.issues.iter().any(|i| i.code == Code::EMissingRequired));
    }

    #[test]
    fn invariant_failure_reports_name() {
        let schema = compile(
            r#"schema "S" type Item {
                id String primary
                age Integer required
                ! "must_be_adult" age >= 18
            }"#,
        );
        let validator = Validator::new(schema, ValidatorOptions::default());
        let (inst, failure, _) = validator.validate_one(
            "Item",
            raw(&[("id", Value::Str("2".into())), ("age", Value::Int(10))]),
            &CancellationToken::never(),
        );
        assert!(inst.is_none());
        let failure = failure.unwrap();
        assert_eq!(failure.issues.len(), 1);
        assert_eq!(failure.issues[0].code, Code::EInvariantFail);
        assert_eq!(failure.issues[0].message, "must_be_adult");
    }

    #[test]
    fn invariant_success_builds_instance() {
        let schema = compile(
            r#"schema "S" type Item {
                id String primary
                age Integer required
                ! "must_be_adult" age >= 18
            }"#,
        );
        let validator = Validator::new(schema, ValidatorOptions::default());
        let (inst, failure, _) = validator.validate_one(
            "Item",
            raw(&[("id", Value::Str("1".into())), ("age", Value::Int(25))]),
            &CancellationToken::never(),
        );
        assert!(failure.is_none());
        assert!(inst.is_some());
    }

    #[test]
    fn unknown_field_rejected_by_default() {
        let schema = compile(r#"schema "S" type Item { id String primary }"#);
        let validator = Validator::new(schema, ValidatorOptions::default());
        let (inst, failure, _) = validator.validate_one(
            "Item",
            raw(&[("id", Value::Str("1".into())), ("surprise", Value::Bool(true))]),
            &CancellationToken::never(),
        );
        assert!(inst.is_none());
        assert!(failure.unwrap().issues.iter().any(|i| i.code == Code::EUnknownField));
    }

    #[test]
    fn unknown_field_allowed_when_configured() {
        let schema = compile(r#"schema "S" type Item { id String primary }"#);
        let options = ValidatorOptions {
            allow_unknown_fields: true,
            ..ValidatorOptions::default()
        };
        let validator = Validator::new(schema, options);
        let (inst, failure, _) = validator.validate_one(
            "Item",
            raw(&[("id", Value::Str("1".into())), ("surprise", Value::Bool(true))]),
            &CancellationToken::never(),
        );
        assert!(failure.is_none());
        assert!(inst.is_some());
    }

    #[test]
    fn unresolved_edge_produces_edge_target() {
        let schema = compile(
            r#"schema "S"
            type Company { id String primary }
            type Person { id String primary name String --> WORKS_AT Company }"#,
        );
        let validator = Validator::new(schema, ValidatorOptions::default());
        let mut target = BTreeMap::new();
        target.insert("_target_id".to_string(), Value::Str("acme".into()));
        let (inst, failure, _) = validator.validate_one(
            "Person",
            raw(&[("id", Value::Str("alice".into())), ("works_at", Value::Map(target))]),
            &CancellationToken::never(),
        );
        assert!(failure.is_none());
        let inst = inst.unwrap();
        let targets = inst.edges.get(&"WORKS_AT".to_string()).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets.as_slice()[0].target_key, Key::new(vec![KeyComponent::Str("acme".into())]));
    }

    #[test]
    fn abstract_type_rejected() {
        let schema = compile(r#"schema "S" abstract type Base { id String primary }"#);
        let validator = Validator::new(schema, ValidatorOptions::default());
        let (inst, failure, _) = validator.validate_one("Base", raw(&[("id", Value::Str("1".into()))]), &CancellationToken::never());
        assert!(inst.is_none());
        assert_eq!(failure.unwrap().issues[0].code, Code::EAbstractType);
    }

    #[test]
    fn case_insensitive_property_matching_by_default() {
        let schema = compile(r#"schema "S" type Item { id String primary Name String required }"#);
        let validator = Validator::new(schema, ValidatorOptions::default());
        let (inst, failure, _) = validator.validate_one(
            "Item",
            raw(&[("id", Value::Str("1".into())), ("name", Value::Str("x".into()))]),
            &CancellationToken::never(),
        );
        assert!(failure.is_none());
        assert!(inst.is_some());
    }

    #[test]
    fn strict_property_names_rejects_case_mismatch() {
        let schema = compile(r#"schema "S" type Item { id String primary Name String required }"#);
        let options = ValidatorOptions {
            strict_property_names: true,
            ..ValidatorOptions::default()
        };
        let validator = Validator::new(schema, options);
        let (inst, failure, _) = validator.validate_one(
            "Item",
            raw(&[("id", Value::Str("1".into())), ("name", Value::Str("x".into()))]),
            &CancellationToken::never(),
        );
        assert!(inst.is_none());
        assert!(failure.unwrap().issues.iter().any(|i| i.code == Code::EMissingRequired));
    }
}
