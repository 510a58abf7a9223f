//! Concurrent-safe graph builder (C8): accumulates validated instances into
//! a shared graph, resolving association edges as their targets arrive and
//! reporting duplicates and unresolved required edges.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::cancel::CancellationToken;
use crate::diag::{Code, Collector, Issue, Result as DiagResult};
use crate::schema::Schema;
use crate::validator::ValidInstance;
use crate::value::{Key, Slice, SortedMap};

/// Error conditions that stop a graph operation before it can produce a
/// diagnostic result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphSystemError {
    /// The operation's `CancellationToken` was already cancelled.
    #[error("graph operation cancelled")]
    Cancelled,
}

/// Tunables for a `Graph`.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Maximum diagnostics retained per operation before further ones are
    /// dropped and counted (`0` means unbounded). See `diag::Collector`.
    pub issue_limit: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { issue_limit: 0 }
    }
}

/// One resolved edge: a source instance's relation pointing at a target that
/// exists in the graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeRecord {
    pub source_type: String,
    pub source_key: Key,
    pub relation: String,
    pub target_type: String,
    pub target_key: Key,
}

/// A later `Add` of an already-present `(type, primary_key)` pair. The
/// later instance is dropped; only this record survives (first-wins).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DuplicateRecord {
    pub type_name: String,
    pub primary_key: Key,
}

/// An edge whose target has not yet been added to the graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnresolvedEdgeRecord {
    pub source_type: String,
    pub source_key: Key,
    pub relation: String,
    pub target_type: String,
    pub target_key: Key,
}

/// An edge still waiting for its target, indexed by `(target_type,
/// target_key)` in `Inner::pending`.
#[derive(Debug, Clone)]
struct PendingEdge {
    source_type: String,
    source_key: Key,
    relation: String,
    target_key: Key,
}

#[derive(Debug, Clone)]
struct StoredInstance {
    instance: ValidInstance,
    /// Per-relation count of resolved outgoing edges, used by `Check`.
    resolved_count: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct Inner {
    instances: HashMap<(String, String), StoredInstance>,
    duplicates: Vec<DuplicateRecord>,
    pending: HashMap<(String, String), Vec<PendingEdge>>,
    edges: Vec<EdgeRecord>,
    /// Composed children, keyed by `(parent_type, parent_key, relation)`,
    /// in attach order. The authoritative store for `ValidInstance::composed`
    /// once children can also arrive via a standalone `add_composed` call.
    composed: HashMap<(String, String, String), Vec<ValidInstance>>,
}

/// A point-in-time, defensively-copied view over a `Graph`. Every accessor
/// returns a fresh `Vec`; mutating it never affects the graph or any other
/// snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    types: Slice<String>,
    instances: SortedMap<String, Slice<ValidInstance>>,
    edges: Slice<EdgeRecord>,
    duplicates: Slice<DuplicateRecord>,
    unresolved: Slice<UnresolvedEdgeRecord>,
}

impl Snapshot {
    /// Every type name with at least one instance, lexicographically.
    pub fn types(&self) -> Vec<String> {
        self.types.to_vec()
    }

    /// Instances of `type_name`, ordered by primary-key canonical string.
    pub fn instances_of(&self, type_name: &str) -> Vec<ValidInstance> {
        self.instances
            .get(&type_name.to_string())
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }

    /// Every resolved edge, ordered by `(sourceType, sourceKey, relation,
    /// targetType, targetKey)`.
    pub fn edges(&self) -> Vec<EdgeRecord> {
        self.edges.to_vec()
    }

    /// Every rejected duplicate `Add`, ordered by `(typeName, primaryKey)`.
    pub fn duplicates(&self) -> Vec<DuplicateRecord> {
        self.duplicates.to_vec()
    }

    /// Every edge still waiting for its target, in the same order as
    /// `edges()`.
    pub fn unresolved(&self) -> Vec<UnresolvedEdgeRecord> {
        self.unresolved.to_vec()
    }
}

/// Builds a validated instance graph incrementally and concurrently
///. Every public method may be called from any number
/// of threads at once; `Snapshot` observes a consistent copy regardless of
/// concurrent `add`/`add_composed`/`check` calls.
pub struct Graph {
    schema: Arc<Schema>,
    options: GraphOptions,
    inner: Mutex<Inner>,
}

impl Graph {
    /// Creates an empty graph bound to `schema`.
    pub fn new(schema: Arc<Schema>, options: GraphOptions) -> Self {
        Self {
            schema,
            options,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The schema every instance in this graph was validated against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Installs `inst`:
    /// first `Add` for a `(type, primary_key)` pair wins; a later one is
    /// recorded as a duplicate and dropped. Inline composed children and
    /// outgoing edges are processed as part of the same call, and any
    /// pending edges that were waiting for this instance as a target are
    /// resolved.
    pub fn add(&self, inst: ValidInstance, cancel: &CancellationToken) -> (DiagResult, Option<GraphSystemError>) {
        let mut collector = Collector::new(self.options.issue_limit);
        if cancel.is_cancelled() {
            collector.collect(Issue::error(Code::ECancelled, "graph add cancelled").build());
            return (collector.finish(), Some(GraphSystemError::Cancelled));
        }

        let type_name = inst.type_name.clone();
        let primary_key = inst.primary_key.clone();
        let key_str = primary_key.canonical();
        let bucket = (type_name.clone(), key_str.clone());

        let mut inner = self.inner.lock().expect("graph mutex poisoned");

        if inner.instances.contains_key(&bucket) {
            inner.duplicates.push(DuplicateRecord {
                type_name: type_name.clone(),
                primary_key: primary_key.clone(),
            });
            collector.collect(
                Issue::error(
                    Code::EDuplicatePk,
                    format!("duplicate primary key for `{type_name}`: {primary_key}"),
                )
                .build(),
            );
            return (collector.finish(), None);
        }

        let composed_children: Vec<(String, ValidInstance)> = inst
            .composed
            .sorted_range()
            .flat_map(|(rel, children)| {
                let rel = rel.clone();
                children.to_vec().into_iter().map(move |c| (rel.clone(), c))
            })
            .collect();
        let outgoing: Vec<(String, Key)> = inst
            .edges
            .sorted_range()
            .flat_map(|(rel, targets)| {
                let rel = rel.clone();
                targets.to_vec().into_iter().map(move |t| (rel.clone(), t.target_key))
            })
            .collect();

        inner.instances.insert(
            bucket.clone(),
            StoredInstance {
                instance: inst,
                resolved_count: HashMap::new(),
            },
        );

        for (relation_name, child) in composed_children {
            attach_composed(&mut inner, &self.schema, &type_name, &key_str, &relation_name, child, &mut collector);
        }

        for (relation_name, target_key) in outgoing {
            let Some(target_type_name) = self
                .schema
                .type_by_name(&type_name)
                .and_then(|t| t.associations.get(&relation_name))
                .and_then(|r| self.schema.resolve_type(&r.target))
                .map(|t| t.id.name.clone())
            else {
                continue;
            };
            let target_bucket = (target_type_name.clone(), target_key.canonical());
            if inner.instances.contains_key(&target_bucket) {
                record_resolved_edge(&mut inner, &type_name, &primary_key, &relation_name, &target_type_name, &target_key);
            } else {
                inner.pending.entry(target_bucket).or_default().push(PendingEdge {
                    source_type: type_name.clone(),
                    source_key: primary_key.clone(),
                    relation: relation_name.clone(),
                    target_key,
                });
            }
        }

        if let Some(waiting) = inner.pending.remove(&bucket) {
            for pe in waiting {
                record_resolved_edge(&mut inner, &pe.source_type, &pe.source_key, &pe.relation, &type_name, &pe.target_key);
            }
        }

        (collector.finish(), None)
    }

    /// Attaches `child` as a composed instance under `(parent_type,
    /// parent_key)`'s `relation_name`. Fails
    /// with `E_MISSING_PARENT` if the parent is not yet in the graph, or
    /// `E_INTERNAL` if `relation_name` does not name a composition on the
    /// parent's type.
    pub fn add_composed(
        &self,
        parent_type: &str,
        parent_key: &Key,
        relation_name: &str,
        child: ValidInstance,
        cancel: &CancellationToken,
    ) -> (DiagResult, Option<GraphSystemError>) {
        let mut collector = Collector::new(self.options.issue_limit);
        if cancel.is_cancelled() {
            collector.collect(Issue::error(Code::ECancelled, "graph add_composed cancelled").build());
            return (collector.finish(), Some(GraphSystemError::Cancelled));
        }
        let mut inner = self.inner.lock().expect("graph mutex poisoned");
        attach_composed(
            &mut inner,
            &self.schema,
            parent_type,
            &parent_key.canonical(),
            relation_name,
            child,
            &mut collector,
        );
        (collector.finish(), None)
    }

    /// Audits the current graph for unsatisfied required associations
    ///: every instance whose required association
    /// has zero resolved targets, and every edge still waiting for its
    /// target, required or not.
    pub fn check(&self, cancel: &CancellationToken) -> (DiagResult, Option<GraphSystemError>) {
        let mut collector = Collector::new(self.options.issue_limit);
        if cancel.is_cancelled() {
            collector.collect(Issue::error(Code::ECancelled, "graph check cancelled").build());
            return (collector.finish(), Some(GraphSystemError::Cancelled));
        }
        let inner = self.inner.lock().expect("graph mutex poisoned");

        for stored in inner.instances.values() {
            let Some(ty) = self.schema.type_by_name(&stored.instance.type_name) else {
                continue;
            };
            for (rel_name, rel) in &ty.associations {
                if rel.optional {
                    continue;
                }
                let count = stored.resolved_count.get(rel_name).copied().unwrap_or(0);
                if count == 0 {
                    collector.collect(
                        Issue::error(
                            Code::EUnresolvedRequired,
                            format!(
                                "`{}` `{}` has no resolved target for required association `{rel_name}`",
                                stored.instance.type_name, stored.instance.primary_key
                            ),
                        )
                        .build(),
                    );
                }
            }
        }

        for ((target_type, target_key_str), waiting) in &inner.pending {
            for pe in waiting {
                let required = self
                    .schema
                    .type_by_name(&pe.source_type)
                    .and_then(|t| t.associations.get(&pe.relation))
                    .map(|r| !r.optional)
                    .unwrap_or(false);
                let message = format!(
                    "`{}` `{}` relation `{}` targeting `{}` `{target_key_str}` is unresolved",
                    pe.source_type, pe.source_key, pe.relation, target_type
                );
                if required {
                    collector.collect(Issue::error(Code::EUnresolvedRequired, message).build());
                } else {
                    collector.collect(Issue::info(Code::EUnresolved, message).build());
                }
            }
        }

        (collector.finish(), None)
    }

    /// Takes a consistent, defensively-copied snapshot of the graph. Safe
    /// to call concurrently with `add`/`add_composed`/`check` from any
    /// number of threads.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().expect("graph mutex poisoned");

        let mut composed_by_parent: HashMap<(String, String), BTreeMap<String, Vec<ValidInstance>>> = HashMap::new();
        for ((p_type, p_key, rel), children) in &inner.composed {
            composed_by_parent
                .entry((p_type.clone(), p_key.clone()))
                .or_default()
                .insert(rel.clone(), children.clone());
        }

        let mut by_type: BTreeMap<String, Vec<ValidInstance>> = BTreeMap::new();
        for ((type_name, key_str), stored) in inner.instances.iter() {
            let mut inst = stored.instance.clone();
            let composed = composed_by_parent
                .get(&(type_name.clone(), key_str.clone()))
                .cloned()
                .unwrap_or_default();
            inst.composed = composed.into_iter().map(|(k, v)| (k, Slice::new(v))).collect();
            by_type.entry(type_name.clone()).or_default().push(inst);
        }
        for instances in by_type.values_mut() {
            instances.sort_by(|a, b| a.primary_key.canonical().cmp(&b.primary_key.canonical()));
        }

        let types: Vec<String> = by_type.keys().cloned().collect();

        let mut edges = inner.edges.clone();
        edges.sort_by_key(edge_sort_key);

        let mut duplicates = inner.duplicates.clone();
        duplicates.sort_by(|a, b| {
            (a.type_name.as_str(), a.primary_key.canonical()).cmp(&(b.type_name.as_str(), b.primary_key.canonical()))
        });

        let mut unresolved: Vec<UnresolvedEdgeRecord> = inner
            .pending
            .iter()
            .flat_map(|((target_type, _), waiting)| {
                let target_type = target_type.clone();
                waiting.iter().map(move |pe| UnresolvedEdgeRecord {
                    source_type: pe.source_type.clone(),
                    source_key: pe.source_key.clone(),
                    relation: pe.relation.clone(),
                    target_type: target_type.clone(),
                    target_key: pe.target_key.clone(),
                })
            })
            .collect();
        unresolved.sort_by_key(unresolved_sort_key);

        Snapshot {
            types: Slice::new(types),
            instances: by_type.into_iter().map(|(k, v)| (k, Slice::new(v))).collect(),
            edges: Slice::new(edges),
            duplicates: Slice::new(duplicates),
            unresolved: Slice::new(unresolved),
        }
    }
}

fn edge_sort_key(e: &EdgeRecord) -> (String, String, String, String, String) {
    (
        e.source_type.clone(),
        e.source_key.canonical(),
        e.relation.clone(),
        e.target_type.clone(),
        e.target_key.canonical(),
    )
}

fn unresolved_sort_key(e: &UnresolvedEdgeRecord) -> (String, String, String, String, String) {
    (
        e.source_type.clone(),
        e.source_key.canonical(),
        e.relation.clone(),
        e.target_type.clone(),
        e.target_key.canonical(),
    )
}

fn record_resolved_edge(
    inner: &mut Inner,
    source_type: &str,
    source_key: &Key,
    relation: &str,
    target_type: &str,
    target_key: &Key,
) {
    inner.edges.push(EdgeRecord {
        source_type: source_type.to_string(),
        source_key: source_key.clone(),
        relation: relation.to_string(),
        target_type: target_type.to_string(),
        target_key: target_key.clone(),
    });
    if let Some(src) = inner.instances.get_mut(&(source_type.to_string(), source_key.canonical())) {
        *src.resolved_count.entry(relation.to_string()).or_insert(0) += 1;
    }
}

fn attach_composed(
    inner: &mut Inner,
    schema: &Schema,
    parent_type: &str,
    parent_key_str: &str,
    relation_name: &str,
    child: ValidInstance,
    collector: &mut Collector,
) {
    let Some(parent_ty) = schema.type_by_name(parent_type) else {
        collector.collect(
            Issue::error(Code::EMissingParent, format!("unknown parent type `{parent_type}`")).build(),
        );
        return;
    };
    if !parent_ty.compositions.contains_key(relation_name) {
        collector.collect(
            Issue::error(
                Code::EInternal,
                format!("`{relation_name}` is not a composition on `{parent_type}`"),
            )
            .build(),
        );
        return;
    }
    if !inner
        .instances
        .contains_key(&(parent_type.to_string(), parent_key_str.to_string()))
    {
        collector.collect(
            Issue::error(
                Code::EMissingParent,
                format!("parent `{parent_type}` `{parent_key_str}` not found"),
            )
            .build(),
        );
        return;
    }
    inner
        .composed
        .entry((parent_type.to_string(), parent_key_str.to_string(), relation_name.to_string()))
        .or_default()
        .push(child);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LoaderOptions, Loader};
    use crate::source::SourceId;
    use crate::value::{KeyComponent, Properties};

    fn compile(text: &str) -> Arc<Schema> {
        let loader = Loader::in_memory(LoaderOptions::default());
        let (schema, result) = loader.compile(SourceId::new("test.sdl"), text, &CancellationToken::never());
        assert!(!result.has_errors(), "unexpected errors: {:?}", result.messages());
        Arc::new(schema.expect("schema should compile"))
    }

    fn company(schema: &Arc<Schema>, id: &str) -> ValidInstance {
        let ty = schema.type_by_name("Company").unwrap();
        ValidInstance {
            type_name: "Company".to_string(),
            type_id: ty.id.clone(),
            primary_key: Key::new(vec![KeyComponent::Str(id.to_string())]),
            properties: Properties::new(BTreeMap::from([("id".to_string(), crate::value::Value::Str(id.to_string()))])),
            edges: SortedMap::default(),
            composed: SortedMap::default(),
            provenance: None,
        }
    }

    fn person(schema: &Arc<Schema>, id: &str, works_at: Option<&str>) -> ValidInstance {
        let ty = schema.type_by_name("Person").unwrap();
        let mut edges = BTreeMap::new();
        if let Some(target) = works_at {
            edges.insert(
                "WORKS_AT".to_string(),
                Slice::new(vec![crate::value::EdgeTarget {
                    target_key: Key::new(vec![KeyComponent::Str(target.to_string())]),
                    edge_properties: Properties::default(),
                }]),
            );
        }
        ValidInstance {
            type_name: "Person".to_string(),
            type_id: ty.id.clone(),
            primary_key: Key::new(vec![KeyComponent::Str(id.to_string())]),
            properties: Properties::new(BTreeMap::from([("id".to_string(), crate::value::Value::Str(id.to_string()))])),
            edges: SortedMap::new(edges),
            composed: SortedMap::default(),
            provenance: None,
        }
    }

    const SCHEMA_TEXT: &str = r#"
schema "company"

type Company {
    id String primary
}

type Person {
    id String primary
    --> WORKS_AT (one) Company
}
"#;

    #[test]
    fn add_resolves_edge_to_existing_target() {
        let schema = compile(SCHEMA_TEXT);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        let (r1, _) = graph.add(company(&schema, "acme"), &cancel);
        assert!(!r1.has_errors());
        let (r2, _) = graph.add(person(&schema, "alice", Some("acme")), &cancel);
        assert!(!r2.has_errors());

        let snap = graph.snapshot();
        let edges = snap.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_type, "Person");
        assert_eq!(edges[0].target_type, "Company");
        assert!(snap.unresolved().is_empty());
    }

    #[test]
    fn forward_reference_resolves_once_target_arrives() {
        let schema = compile(SCHEMA_TEXT);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        graph.add(person(&schema, "alice", Some("acme")), &cancel);
        let snap_before = graph.snapshot();
        assert_eq!(snap_before.unresolved().len(), 1);
        assert!(snap_before.edges().is_empty());

        graph.add(company(&schema, "acme"), &cancel);
        let snap_after = graph.snapshot();
        assert!(snap_after.unresolved().is_empty());
        assert_eq!(snap_after.edges().len(), 1);
    }

    #[test]
    fn duplicate_add_is_rejected_first_wins() {
        let schema = compile(SCHEMA_TEXT);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        let (r1, _) = graph.add(company(&schema, "acme"), &cancel);
        assert!(!r1.has_errors());
        let (r2, _) = graph.add(company(&schema, "acme"), &cancel);
        assert!(r2.has_errors());

        let snap = graph.snapshot();
        assert_eq!(snap.instances_of("Company").len(), 1);
        assert_eq!(snap.duplicates().len(), 1);
    }

    #[test]
    fn check_reports_unresolved_required_association() {
        let schema = compile(SCHEMA_TEXT);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        graph.add(person(&schema, "alice", None), &cancel);
        let (result, _) = graph.check(&cancel);
        assert!(result.has_errors());
        assert!(result.messages().iter().any(|m| m.contains("WORKS_AT")));
    }

    #[test]
    fn add_composed_attaches_child_under_parent() {
        let schema_text = r#"
schema "orders"

part type Line {
    sku String primary
}

type Order {
    id String primary
    ==> LINES (many) Line
}
"#;
        let schema = compile(schema_text);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        let order_ty = schema.type_by_name("Order").unwrap();
        let order = ValidInstance {
            type_name: "Order".to_string(),
            type_id: order_ty.id.clone(),
            primary_key: Key::new(vec![KeyComponent::Str("o1".to_string())]),
            properties: Properties::new(BTreeMap::from([("id".to_string(), crate::value::Value::Str("o1".to_string()))])),
            edges: SortedMap::default(),
            composed: SortedMap::default(),
            provenance: None,
        };
        graph.add(order, &cancel);

        let line_ty = schema.type_by_name("Line").unwrap();
        let line = ValidInstance {
            type_name: "Line".to_string(),
            type_id: line_ty.id.clone(),
            primary_key: Key::new(vec![KeyComponent::Str("sku-1".to_string())]),
            properties: Properties::new(BTreeMap::from([("sku".to_string(), crate::value::Value::Str("sku-1".to_string()))])),
            edges: SortedMap::default(),
            composed: SortedMap::default(),
            provenance: None,
        };
        let (result, _) = graph.add_composed(
            "Order",
            &Key::new(vec![KeyComponent::Str("o1".to_string())]),
            "LINES",
            line,
            &cancel,
        );
        assert!(!result.has_errors());

        let snap = graph.snapshot();
        let orders = snap.instances_of("Order");
        assert_eq!(orders.len(), 1);
        let lines = orders[0].composed.get(&"LINES".to_string()).unwrap().to_vec();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].primary_key.canonical(), r#"["sku-1"]"#);
    }

    #[test]
    fn add_composed_rejects_unknown_parent() {
        let schema_text = r#"
schema "orders"

part type Line {
    sku String primary
}

type Order {
    id String primary
    ==> LINES (many) Line
}
"#;
        let schema = compile(schema_text);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        let line_ty = schema.type_by_name("Line").unwrap();
        let line = ValidInstance {
            type_name: "Line".to_string(),
            type_id: line_ty.id.clone(),
            primary_key: Key::new(vec![KeyComponent::Str("sku-1".to_string())]),
            properties: Properties::new(BTreeMap::from([("sku".to_string(), crate::value::Value::Str("sku-1".to_string()))])),
            edges: SortedMap::default(),
            composed: SortedMap::default(),
            provenance: None,
        };
        let (result, _) = graph.add_composed(
            "Order",
            &Key::new(vec![KeyComponent::Str("missing".to_string())]),
            "LINES",
            line,
            &cancel,
        );
        assert!(result.has_errors());
    }

    #[test]
    fn snapshot_is_sorted_and_defensively_copied() {
        let schema = compile(SCHEMA_TEXT);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::never();

        graph.add(company(&schema, "zeta"), &cancel);
        graph.add(company(&schema, "acme"), &cancel);

        let snap = graph.snapshot();
        let mut companies = snap.instances_of("Company");
        let keys: Vec<_> = companies.iter().map(|i| i.primary_key.canonical()).collect();
        assert_eq!(keys, vec![r#"["acme"]"#.to_string(), r#"["zeta"]"#.to_string()]);

        companies.push(person(&schema, "intruder", None));
        assert_eq!(snap.instances_of("Company").len(), 2);
    }

    #[test]
    fn cancelled_token_short_circuits_add() {
        let schema = compile(SCHEMA_TEXT);
        let graph = Graph::new(schema.clone(), GraphOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (result, err) = graph.add(company(&schema, "acme"), &cancel);
        assert!(result.has_errors());
        assert_eq!(err, Some(GraphSystemError::Cancelled));
        assert!(graph.snapshot().types().is_empty());
    }
}
