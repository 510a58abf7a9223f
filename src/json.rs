//! Reference adapter (C10): the JSON read/write contract this crate's core
//! is written against. Requires the `serde` feature, which pulls in
//! `serde_json`.
//!
//! Read side: parses `{type-name: [object, ...]}` (the canonical instance
//! data shape), a bare array of self-tagged objects, a typed array, or a
//! single object into [`RawInstance`]s. This module is an ordinary
//! consumer of the core — it has no special access to core internals and
//! reports its own diagnostics (`E_ADAPTER_PARSE`, `E_MISSING_TYPE_TAG`,
//! `E_INVALID_TYPE_TAG`) into the same bounded [`Collector`] every other
//! phase uses.
//!
//! Write side: serializes a [`Snapshot`] deterministically, iterating in
//! the orders `Snapshot`'s own accessors already guarantee.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::diag::{Code, Collector, Issue, Result as DiagResult};
use crate::graph::Snapshot;
use crate::source::SourceId;
use crate::validator::{RawInstance, ValidInstance};
use crate::value::{Provenance, Value};

/// The conventional type-tag field name used by [`parse_array`].
pub const TYPE_TAG_FIELD: &str = "_type";

/// Converts a `serde_json::Value` into this crate's dynamic [`Value`].
///
/// JSON integers that fit in `i64` become `Value::Int`; every other JSON
/// number (fractional, or out of `i64` range) becomes `Value::Float`, per
/// this adapter's job of unifying number types before the core sees them.
pub fn from_json(value: &Json) -> Value {
    match value {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(from_json).collect()),
        Json::Object(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect()),
    }
}

/// Converts this crate's dynamic [`Value`] back into a `serde_json::Value`,
/// for write-side projections.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s.clone()),
        Value::Regex { pattern, flags } => Json::String(format!("/{pattern}/{flags}")),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()),
    }
}

fn object_to_raw(
    source: &SourceId,
    path: String,
    obj: &serde_json::Map<String, Json>,
    type_hint: Option<String>,
) -> RawInstance {
    let properties: BTreeMap<String, Value> = obj.iter().map(|(k, v)| (k.clone(), from_json(v))).collect();
    RawInstance {
        type_hint,
        properties,
        provenance: Some(Provenance {
            source: source.clone(),
            path,
            span: None,
        }),
    }
}

fn parse_root(source: &SourceId, bytes: &[u8], collector: &mut Collector) -> Option<Json> {
    match serde_json::from_slice(bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            collector.collect(Issue::error(Code::EAdapterParse, format!("invalid JSON in `{source}`: {e}")).build());
            None
        }
    }
}

/// Parses `{type-name: [object, ...]}`, the canonical instance-data shape
/// described by the toolchain's external interfaces.
///
/// A top-level value that isn't an array, or an array element that isn't
/// an object, is reported as `E_ADAPTER_PARSE` and skipped; every other
/// element in the same array is still attempted.
pub fn parse_object(source: SourceId, bytes: &[u8]) -> (BTreeMap<String, Vec<RawInstance>>, DiagResult) {
    let mut collector = Collector::new(0);
    let mut out: BTreeMap<String, Vec<RawInstance>> = BTreeMap::new();
    let Some(root) = parse_root(&source, bytes, &mut collector) else {
        return (out, collector.finish());
    };
    let Json::Object(top) = root else {
        collector.collect(
            Issue::error(Code::EAdapterParse, format!("`{source}` root must be a JSON object of type to instance-array"))
                .build(),
        );
        return (out, collector.finish());
    };
    for (type_name, value) in top {
        let Json::Array(items) = value else {
            collector.collect(Issue::error(Code::EAdapterParse, format!("`{source}`.{type_name} must be a JSON array")).build());
            continue;
        };
        for (i, item) in items.iter().enumerate() {
            let Json::Object(obj) = item else {
                collector.collect(
                    Issue::error(Code::EAdapterParse, format!("`{source}`.{type_name}[{i}] must be a JSON object")).build(),
                );
                continue;
            };
            out.entry(type_name.clone()).or_default().push(object_to_raw(
                &source,
                format!("$.{type_name}[{i}]"),
                obj,
                Some(type_name.clone()),
            ));
        }
    }
    (out, collector.finish())
}

/// Parses a bare JSON array where each element carries its own declared
/// type under [`TYPE_TAG_FIELD`] (`"_type"`).
///
/// An element missing the tag is `E_MISSING_TYPE_TAG`; a non-string tag is
/// `E_INVALID_TYPE_TAG`.
pub fn parse_array(source: SourceId, bytes: &[u8]) -> (BTreeMap<String, Vec<RawInstance>>, DiagResult) {
    let mut collector = Collector::new(0);
    let mut out: BTreeMap<String, Vec<RawInstance>> = BTreeMap::new();
    let Some(root) = parse_root(&source, bytes, &mut collector) else {
        return (out, collector.finish());
    };
    let Json::Array(items) = root else {
        collector.collect(Issue::error(Code::EAdapterParse, format!("`{source}` root must be a JSON array")).build());
        return (out, collector.finish());
    };
    for (i, item) in items.iter().enumerate() {
        let Json::Object(mut obj) = item.clone() else {
            collector.collect(Issue::error(Code::EAdapterParse, format!("`{source}`[{i}] must be a JSON object")).build());
            continue;
        };
        let Some(tag) = obj.remove(TYPE_TAG_FIELD) else {
            collector.collect(
                Issue::error(Code::EMissingTypeTag, format!("`{source}`[{i}] is missing `{TYPE_TAG_FIELD}`")).build(),
            );
            continue;
        };
        let Json::String(type_name) = tag else {
            collector.collect(
                Issue::error(Code::EInvalidTypeTag, format!("`{source}`[{i}].{TYPE_TAG_FIELD}` must be a string")).build(),
            );
            continue;
        };
        out.entry(type_name.clone())
            .or_default()
            .push(object_to_raw(&source, format!("$[{i}]"), &obj, Some(type_name)));
    }
    (out, collector.finish())
}

/// Parses a JSON array of objects, all validated against the explicitly
/// given `type_name` (no per-element type tag required).
pub fn parse_typed_array(source: SourceId, type_name: &str, bytes: &[u8]) -> (Vec<RawInstance>, DiagResult) {
    let mut collector = Collector::new(0);
    let mut out = Vec::new();
    let Some(root) = parse_root(&source, bytes, &mut collector) else {
        return (out, collector.finish());
    };
    let Json::Array(items) = root else {
        collector.collect(Issue::error(Code::EAdapterParse, format!("`{source}` root must be a JSON array")).build());
        return (out, collector.finish());
    };
    for (i, item) in items.iter().enumerate() {
        let Json::Object(obj) = item else {
            collector.collect(Issue::error(Code::EAdapterParse, format!("`{source}`[{i}] must be a JSON object")).build());
            continue;
        };
        out.push(object_to_raw(&source, format!("$[{i}]"), obj, Some(type_name.to_string())));
    }
    (out, collector.finish())
}

/// Parses a single JSON object, validated against `type_name`.
pub fn parse_one(source: SourceId, type_name: &str, bytes: &[u8]) -> (Option<RawInstance>, DiagResult) {
    let mut collector = Collector::new(0);
    let Some(root) = parse_root(&source, bytes, &mut collector) else {
        return (None, collector.finish());
    };
    let Json::Object(obj) = root else {
        collector.collect(Issue::error(Code::EAdapterParse, format!("`{source}` root must be a JSON object")).build());
        return (None, collector.finish());
    };
    let inst = object_to_raw(&source, "$".to_string(), &obj, Some(type_name.to_string()));
    (Some(inst), collector.finish())
}

fn instance_to_json(inst: ValidInstance) -> Json {
    let mut m = serde_json::Map::new();
    m.insert("type".into(), Json::String(inst.type_name));
    m.insert("primary_key".into(), Json::String(inst.primary_key.canonical()));
    let props: serde_json::Map<String, Json> = inst
        .properties
        .sorted_range()
        .map(|(k, v)| (k.clone(), to_json(v)))
        .collect();
    m.insert("properties".into(), Json::Object(props));
    let edges: Vec<Json> = inst
        .edges
        .sorted_range()
        .flat_map(|(rel, targets)| {
            targets.to_vec().into_iter().map(move |t| {
                let mut em = serde_json::Map::new();
                em.insert("relation".into(), Json::String(rel.clone()));
                em.insert("target_key".into(), Json::String(t.target_key.canonical()));
                Json::Object(em)
            })
        })
        .collect();
    m.insert("edges".into(), Json::Array(edges));
    Json::Object(m)
}

/// Serializes a graph snapshot deterministically, iterating in the orders
/// `Snapshot`'s accessors already guarantee, with a trailing `diagnostics`
/// section listing unresolved edges and duplicates.
pub fn serialize_snapshot(snapshot: &Snapshot) -> Json {
    let mut types_obj = serde_json::Map::new();
    for type_name in snapshot.types() {
        let instances: Vec<Json> = snapshot.instances_of(&type_name).into_iter().map(instance_to_json).collect();
        types_obj.insert(type_name, Json::Array(instances));
    }

    let edges: Vec<Json> = snapshot
        .edges()
        .into_iter()
        .map(|e| {
            let mut m = serde_json::Map::new();
            m.insert("source_type".into(), Json::String(e.source_type));
            m.insert("source_key".into(), Json::String(e.source_key.canonical()));
            m.insert("relation".into(), Json::String(e.relation));
            m.insert("target_type".into(), Json::String(e.target_type));
            m.insert("target_key".into(), Json::String(e.target_key.canonical()));
            Json::Object(m)
        })
        .collect();

    let duplicates: Vec<Json> = snapshot
        .duplicates()
        .into_iter()
        .map(|d| {
            let mut m = serde_json::Map::new();
            m.insert("type_name".into(), Json::String(d.type_name));
            m.insert("primary_key".into(), Json::String(d.primary_key.canonical()));
            Json::Object(m)
        })
        .collect();

    let unresolved: Vec<Json> = snapshot
        .unresolved()
        .into_iter()
        .map(|u| {
            let mut m = serde_json::Map::new();
            m.insert("source_type".into(), Json::String(u.source_type));
            m.insert("source_key".into(), Json::String(u.source_key.canonical()));
            m.insert("relation".into(), Json::String(u.relation));
            m.insert("target_type".into(), Json::String(u.target_type));
            m.insert("target_key".into(), Json::String(u.target_key.canonical()));
            Json::Object(m)
        })
        .collect();

    let mut diagnostics = serde_json::Map::new();
    diagnostics.insert("duplicates".into(), Json::Array(duplicates));
    diagnostics.insert("unresolved".into(), Json::Array(unresolved));

    let mut root = serde_json::Map::new();
    root.insert("types".into(), Json::Object(types_obj));
    root.insert("edges".into(), Json::Array(edges));
    root.insert("diagnostics".into(), Json::Object(diagnostics));
    Json::Object(root)
}
