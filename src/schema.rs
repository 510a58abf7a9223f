//! Schema compiler (C6): name resolution, import graph, inheritance
//! merging with constraint narrowing, semantic checks, and the immutable
//! [`Schema`] model they produce.
//!
//! Compilation runs in nine passes: load, parse, import resolution,
//! type-name indexing, type reference resolution, datatype alias
//! expansion, inheritance merging, semantic checks, finalize. Every pass
//! threads a single [`Collector`] and never panics on malformed input; a
//! schema with any `Error`/`Fatal` diagnostic comes back as `None` rather
//! than a partially-built model.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{self, ConstraintExpr, Expr, Member, RelationKind as AstRelationKind, SchemaFile, TopLevel, TypeModifier};
use crate::cancel::CancellationToken;
use crate::diag::{Code, Collector, Issue, Result as DiagResult};
use crate::source::{SourceId, Span};

/// Catastrophic, non-recoverable error distinct from accumulated
/// diagnostics: I/O failure reading an
/// imported file, or a resolver rejecting a request outright.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Reading the bytes for a source failed.
    #[error("failed to read source `{source_id}`: {message}")]
    Io {
        /// The source that could not be read.
        source_id: SourceId,
        /// The underlying OS/resolver error text.
        message: String,
    },
    /// Compilation was cancelled via a [`CancellationToken`].
    #[error("compilation cancelled")]
    Cancelled,
}

/// A globally-unique reference to a type: its owning schema's source id
/// plus its bare name, uniquely identifying a type across imports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeId {
    /// The schema file that declares this type.
    pub schema_path: SourceId,
    /// The type's bare (unqualified) name.
    pub name: String,
}

impl TypeId {
    /// Builds a type id.
    pub fn new(schema_path: SourceId, name: impl Into<String>) -> Self {
        Self {
            schema_path,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.schema_path, self.name)
    }
}

/// The resolved, post-alias-expansion constraint grammar
///.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constraint {
    /// `Integer[min, max]`.
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    /// `Float[min, max]`.
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    /// `Boolean`.
    Boolean,
    /// `String[min_runes, max_runes]`.
    String {
        min_runes: Option<u32>,
        max_runes: Option<u32>,
    },
    /// `Enum[opt1, opt2, ...]`, at least two options.
    Enum { options: Vec<String> },
    /// `Pattern["re1", "re2"?]`.
    Pattern {
        first: String,
        second: Option<String>,
    },
    /// `Timestamp` (RFC 3339).
    Timestamp,
    /// `Date` (`YYYY-MM-DD`).
    Date,
    /// `UUID` (RFC 4122).
    Uuid,
    /// `Vector[dim]`.
    Vector { dim: u32 },
    /// `List<element>[min_len, max_len]`.
    List {
        element: Box<Constraint>,
        min_len: Option<u32>,
        max_len: Option<u32>,
    },
}

impl Constraint {
    /// A short, stable name for the constraint's kind, used in conflict
    /// diagnostics and the datatype-keyword match operator.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constraint::Integer { .. } => "Integer",
            Constraint::Float { .. } => "Float",
            Constraint::Boolean => "Boolean",
            Constraint::String { .. } => "String",
            Constraint::Enum { .. } => "Enum",
            Constraint::Pattern { .. } => "Pattern",
            Constraint::Timestamp => "Timestamp",
            Constraint::Date => "Date",
            Constraint::Uuid => "UUID",
            Constraint::Vector { .. } => "Vector",
            Constraint::List { .. } => "List",
        }
    }

    /// Whether this constraint kind is permitted on a primary-key property
    ///.
    pub fn is_primary_key_eligible(&self) -> bool {
        matches!(
            self,
            Constraint::String { .. } | Constraint::Uuid | Constraint::Date | Constraint::Timestamp
        )
    }
}

/// A property declaration, resolved.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Its resolved constraint.
    pub constraint: Constraint,
    /// Whether this property is (part of) the primary key.
    pub is_primary: bool,
    /// Whether this property must be present. `is_primary` implies this.
    pub is_required: bool,
    /// Doc comment, if any.
    pub documentation: Option<String>,
    /// Source location of the declaration that introduced (or last
    /// narrowed) this property.
    pub span: Span,
}

/// Association or composition,.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelationKind {
    /// `-->`, resolved by primary key.
    Association,
    /// `==>`, ownership of a `part` type.
    Composition,
}

/// A resolved association or composition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    /// Relation name (the `SCREAMING_SNAKE_CASE` identifier after the
    /// arrow).
    pub name: String,
    /// Association or composition.
    pub kind: RelationKind,
    /// The resolved target type.
    pub target: TypeId,
    /// Whether the relation may be absent.
    pub optional: bool,
    /// Whether the relation may hold more than one target.
    pub many: bool,
    /// `reverse NAME`, association-only.
    pub backref: Option<String>,
    /// Edge properties, keyed by name.
    pub properties: IndexMap<String, Property>,
    /// Source location.
    pub span: Span,
}

/// A named invariant bound to the type that (eventually) declares it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Invariant {
    /// The invariant's name (also its failure message).
    pub name: String,
    /// The boolean predicate body.
    pub body: Expr,
    /// Source location.
    pub span: Span,
}

/// Concrete/Abstract/Part, per the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    /// Instantiable directly via the validator/graph.
    Concrete,
    /// Extendable but never instantiated.
    Abstract,
    /// Only valid as a composition target.
    Part,
}

/// A resolved type. Exposes both the **declared** view (this type's own
/// body, unmerged) and the **effective** view (inheritance-merged across
/// the `extends` chain).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Type {
    /// Globally-unique identity.
    pub id: TypeId,
    /// Doc comment, if any.
    pub documentation: Option<String>,
    /// Concrete/Abstract/Part.
    pub kind: TypeKind,
    /// Direct parents named in `extends`.
    pub extends: Vec<TypeId>,
    /// This type's own declared properties (before merging).
    pub declared_properties: IndexMap<String, Property>,
    /// This type's own declared associations (before merging).
    pub declared_associations: IndexMap<String, Relation>,
    /// This type's own declared compositions (before merging).
    pub declared_compositions: IndexMap<String, Relation>,
    /// This type's own declared invariants.
    pub declared_invariants: Vec<Invariant>,
    /// Properties after merging every ancestor's contribution
    ///.
    pub properties: IndexMap<String, Property>,
    /// Associations after merging.
    pub associations: IndexMap<String, Relation>,
    /// Compositions after merging.
    pub compositions: IndexMap<String, Relation>,
    /// Invariants accumulated across every generation, own invariants
    /// last.
    pub invariants: Vec<Invariant>,
    /// True for every type interned from this schema's own text (as
    /// opposed to one pulled in only by reference through an import).
    pub declared: bool,
}

impl Type {
    /// The primary-key properties, in declaration order, of the *effective*
    /// (merged) view.
    pub fn primary_key_properties(&self) -> Vec<&Property> {
        self.properties.values().filter(|p| p.is_primary).collect()
    }
}

/// A fully-compiled, immutable schema.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schema {
    /// The schema's declared name (the string after `schema`).
    pub name: String,
    /// The source this schema was compiled from.
    pub source_id: SourceId,
    /// Doc comment preceding the `schema` declaration.
    pub documentation: Option<String>,
    /// Imports, in declaration order, keyed by alias.
    pub imports: IndexMap<String, SourceId>,
    /// Every type reachable from this schema (locally declared and
    /// imported), keyed by bare name for locally-declared types.
    pub types: IndexMap<String, Type>,
    /// Datatype aliases declared in this schema.
    pub datatype_aliases: IndexMap<String, Constraint>,
}

impl Schema {
    /// Looks up a locally-declared or imported type by the way it would be
    /// named in an instance's `type_hint`/adapter type-name (bare name
    /// only; qualified lookups happen at compile time via `TypeRef`).
    pub fn type_by_name(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    /// Resolves a [`TypeId`] to its [`Type`], whether `id` names a type
    /// declared in this schema or one reached through an import. `TypeId`
    /// values are carried by value and looked up through this registry
    /// rather than held as pointers, which keeps the ownership graph
    /// acyclic. Used by the validator and graph builder to follow a
    /// relation's `target` regardless of which schema declared it.
    pub fn resolve_type(&self, id: &TypeId) -> Option<&Type> {
        if id.schema_path == self.source_id {
            return self.types.get(&id.name);
        }
        let alias = self.imports.iter().find(|(_, path)| **path == id.schema_path)?.0;
        self.types.get(&format!("{alias}.{}", id.name))
    }

    /// Renders a `TypeId` the way it would be written in this schema's own
    /// source text: bare name if `id` belongs to this schema, `alias.Name`
    /// if it was reached through one of this schema's imports.
    fn type_ref_str(&self, id: &TypeId) -> String {
        if id.schema_path == self.source_id {
            return id.name.clone();
        }
        match self.imports.iter().find(|(_, path)| **path == id.schema_path) {
            Some((alias, _)) => format!("{alias}.{}", id.name),
            None => id.name.clone(),
        }
    }
}

fn fmt_bound<T: std::fmt::Display>(lo: &Option<T>, hi: &Option<T>) -> Option<String> {
    if lo.is_none() && hi.is_none() {
        return None;
    }
    let lo = lo.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "_".to_string());
    let hi = hi.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "_".to_string());
    Some(format!("[{lo}, {hi}]"))
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Integer { min, max } => {
                f.write_str("Integer")?;
                if let Some(b) = fmt_bound(min, max) {
                    f.write_str(&b)?;
                }
                Ok(())
            }
            Constraint::Float { min, max } => {
                f.write_str("Float")?;
                if let Some(b) = fmt_bound(min, max) {
                    f.write_str(&b)?;
                }
                Ok(())
            }
            Constraint::Boolean => f.write_str("Boolean"),
            Constraint::String { min_runes, max_runes } => {
                f.write_str("String")?;
                if let Some(b) = fmt_bound(min_runes, max_runes) {
                    f.write_str(&b)?;
                }
                Ok(())
            }
            Constraint::Enum { options } => {
                f.write_str("Enum[")?;
                for (i, o) in options.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{o}\"")?;
                }
                f.write_str("]")
            }
            Constraint::Pattern { first, second } => {
                write!(f, "Pattern[\"{first}\"")?;
                if let Some(second) = second {
                    write!(f, ", \"{second}\"")?;
                }
                f.write_str("]")
            }
            Constraint::Timestamp => f.write_str("Timestamp"),
            Constraint::Date => f.write_str("Date"),
            Constraint::Uuid => f.write_str("UUID"),
            Constraint::Vector { dim } => write!(f, "Vector[{dim}]"),
            Constraint::List {
                element,
                min_len,
                max_len,
            } => {
                write!(f, "List<{element}>")?;
                if let Some(b) = fmt_bound(min_len, max_len) {
                    f.write_str(&b)?;
                }
                Ok(())
            }
        }
    }
}

fn fmt_doc(f: &mut std::fmt::Formatter<'_>, indent: &str, doc: &Option<String>) -> std::fmt::Result {
    if let Some(doc) = doc {
        writeln!(f, "{indent}/** {doc} */")?;
    }
    Ok(())
}

fn fmt_multiplicity(f: &mut std::fmt::Formatter<'_>, optional: bool, many: bool) -> std::fmt::Result {
    match (optional, many) {
        (true, false) => Ok(()),
        (true, true) => write!(f, "(many) "),
        (false, false) => write!(f, "(one) "),
        (false, true) => write!(f, "(one:many) "),
    }
}

fn fmt_relation(f: &mut std::fmt::Formatter<'_>, schema: &Schema, arrow: &str, rel: &Relation) -> std::fmt::Result {
    write!(f, "    {arrow} {} ", rel.name)?;
    fmt_multiplicity(f, rel.optional, rel.many)?;
    write!(f, "{}", schema.type_ref_str(&rel.target))?;
    if let Some(backref) = &rel.backref {
        write!(f, " reverse {backref}")?;
    }
    if rel.properties.is_empty() {
        writeln!(f)
    } else {
        writeln!(f, " {{")?;
        for p in rel.properties.values() {
            fmt_property(f, "        ", p)?;
        }
        writeln!(f, "    }}")
    }
}

fn fmt_property(f: &mut std::fmt::Formatter<'_>, indent: &str, p: &Property) -> std::fmt::Result {
    fmt_doc(f, indent, &p.documentation)?;
    write!(f, "{indent}{} {}", p.name, p.constraint)?;
    if p.is_required {
        write!(f, " required")?;
    }
    if p.is_primary {
        write!(f, " primary")?;
    }
    writeln!(f)
}

/// Re-emits a compiled schema as SDL text: the `schema` header, this
/// schema's own datatype aliases, and each `declared` type's `declared_*`
/// (pre-inheritance-merge) members — not the merged `properties`/
/// `associations`/etc. views, so a child's own body round-trips without
/// picking up its ancestors' members as if newly declared. Imported types
/// are not re-emitted (they belong to their own schema's text); `import`
/// statements are re-emitted using each import's source id as the literal
/// path, which is exact for the common case of a loader whose source ids
/// are themselves the paths a resolver expects.
impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_doc(f, "", &self.documentation)?;
        writeln!(f, "schema \"{}\"", self.name)?;
        writeln!(f)?;
        for (alias, source_id) in &self.imports {
            writeln!(f, "import \"{source_id}\" as {alias}")?;
        }
        if !self.imports.is_empty() {
            writeln!(f)?;
        }
        for (name, constraint) in &self.datatype_aliases {
            writeln!(f, "type {name} = {constraint}")?;
        }
        if !self.datatype_aliases.is_empty() {
            writeln!(f)?;
        }
        for t in self.types.values().filter(|t| t.declared) {
            fmt_doc(f, "", &t.documentation)?;
            match t.kind {
                TypeKind::Abstract => write!(f, "abstract ")?,
                TypeKind::Part => write!(f, "part ")?,
                TypeKind::Concrete => {}
            }
            write!(f, "type {}", t.id.name)?;
            if !t.extends.is_empty() {
                write!(f, " extends ")?;
                for (i, parent) in t.extends.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.type_ref_str(parent))?;
                }
            }
            writeln!(f, " {{")?;
            for p in t.declared_properties.values() {
                fmt_property(f, "    ", p)?;
            }
            for r in t.declared_associations.values() {
                fmt_relation(f, self, "-->", r)?;
            }
            for r in t.declared_compositions.values() {
                fmt_relation(f, self, "==>", r)?;
            }
            for inv in &t.declared_invariants {
                writeln!(f, "    ! \"{}\" {}", inv.name, inv.body)?;
            }
            writeln!(f, "}}")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The read side of the import-resolution collaborator. The filesystem
/// backing import resolution is treated as an external dependency; this
/// trait is the seam an embedder plugs into.
pub trait ImportResolver {
    /// Resolves `path`, referenced from `from` (the importing schema's
    /// source id), to a concrete source id and its text.
    ///
    /// Implementations must apply the canonical-extension and
    /// module-root-clamping rules before returning.
    fn resolve(&self, from: &SourceId, path: &str) -> std::result::Result<(SourceId, String), ImportError>;
}

/// Why an import could not be resolved to bytes, distinct from the
/// diagnostic codes emitted once the outcome is known
/// (`E_IMPORT_RESOLVE`/`E_PATH_ESCAPE`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    /// The resolved path fell outside the configured module root.
    #[error("import path `{0}` escapes the module root")]
    PathEscape(String),
    /// No file exists at the resolved path.
    #[error("import `{0}` could not be resolved: {1}")]
    NotFound(String, String),
}

/// An [`ImportResolver`] that rejects every import, used for in-memory /
/// string-source compilation where `import` is forbidden.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImportsResolver;

impl ImportResolver for NoImportsResolver {
    fn resolve(&self, _from: &SourceId, path: &str) -> std::result::Result<(SourceId, String), ImportError> {
        Err(ImportError::NotFound(
            path.to_string(),
            "imports are not allowed for in-memory schema text".to_string(),
        ))
    }
}

/// A filesystem-backed [`ImportResolver`], clamped to `module_root`
///.
#[derive(Debug, Clone)]
pub struct FsResolver {
    module_root: PathBuf,
}

impl FsResolver {
    /// Builds a resolver rooted at `module_root`. All resolved paths are
    /// required to stay within this directory.
    pub fn new(module_root: impl Into<PathBuf>) -> Self {
        Self {
            module_root: module_root.into(),
        }
    }

    fn canonical_candidate(&self, from: &SourceId, path: &str) -> PathBuf {
        let mut p = PathBuf::from(path);
        if p.extension().is_none() {
            p.set_extension("sdl");
        }
        if p.is_absolute() {
            return p;
        }
        let from_dir = Path::new(from.as_str())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.module_root.clone());
        from_dir.join(p)
    }
}

impl ImportResolver for FsResolver {
    fn resolve(&self, from: &SourceId, path: &str) -> std::result::Result<(SourceId, String), ImportError> {
        let candidate = self.canonical_candidate(from, path);
        let lexically_normalized = normalize_lexically(&candidate);
        let root_normalized = normalize_lexically(&self.module_root);
        if !lexically_normalized.starts_with(&root_normalized) {
            return Err(ImportError::PathEscape(path.to_string()));
        }
        match std::fs::read_to_string(&lexically_normalized) {
            Ok(text) => Ok((SourceId::new(lexically_normalized.to_string_lossy().to_string()), text)),
            Err(e) => Err(ImportError::NotFound(path.to_string(), e.to_string())),
        }
    }
}

/// Lexically normalizes `.`/`..` components without touching the
/// filesystem, so escape-detection works even against a path that does
/// not (yet) exist.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Bound on diagnostics collected per compile (`0` = unlimited).
    pub issue_limit: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { issue_limit: 0 }
    }
}

/// Compiles SDL text into an immutable [`Schema`], running the nine
/// compilation passes and threading a single [`ImportResolver`] for
/// recursive import loading.
pub struct Loader<R: ImportResolver> {
    resolver: R,
    options: LoaderOptions,
}

impl Loader<NoImportsResolver> {
    /// A loader for in-memory schema text: any `import` is rejected with
    /// `E_IMPORT_NOT_ALLOWED`.
    pub fn in_memory(options: LoaderOptions) -> Self {
        Self {
            resolver: NoImportsResolver,
            options,
        }
    }
}

impl Loader<FsResolver> {
    /// A loader backed by the filesystem, rooted at `module_root`.
    pub fn filesystem(module_root: impl Into<PathBuf>, options: LoaderOptions) -> Self {
        Self {
            resolver: FsResolver::new(module_root),
            options,
        }
    }
}

/// One file's worth of intermediate compile state, kept around through
/// passes 3-7 before being folded into the final [`Schema`].
struct Unit {
    source_id: SourceId,
    file: SchemaFile,
}

impl<R: ImportResolver> Loader<R> {
    /// Builds a loader around a caller-supplied resolver.
    pub fn new(resolver: R, options: LoaderOptions) -> Self {
        Self { resolver, options }
    }

    /// Compiles `text` (named `entry`) into a [`Schema`], recursively
    /// resolving and compiling its imports.
    #[tracing::instrument(skip(self, text, cancel), fields(source = %entry))]
    pub fn compile(
        &self,
        entry: SourceId,
        text: &str,
        cancel: &CancellationToken,
    ) -> (Option<Schema>, DiagResult) {
        let mut collector = Collector::new(self.options.issue_limit);
        let mut visiting = HashSet::new();
        let mut cache: HashMap<SourceId, Option<Schema>> = HashMap::new();
        let result = self.compile_unit(entry, text.to_string(), &mut visiting, &mut cache, &mut collector, cancel);
        (result, collector.finish())
    }

    fn compile_unit(
        &self,
        source_id: SourceId,
        text: String,
        visiting: &mut HashSet<SourceId>,
        cache: &mut HashMap<SourceId, Option<Schema>>,
        collector: &mut Collector,
        cancel: &CancellationToken,
    ) -> Option<Schema> {
        if let Some(cached) = cache.get(&source_id) {
            return cached.clone();
        }
        if cancel.is_cancelled() {
            collector.collect(Issue::error(Code::ECancelled, "compilation cancelled").build());
            return None;
        }
        if !visiting.insert(source_id.clone()) {
            collector.collect(
                Issue::error(Code::EImportCycle, format!("import cycle detected at `{source_id}`")).build(),
            );
            return None;
        }

        // Pass 2: parse.
        let (file, parse_result) = crate::parser::parse(source_id.clone(), &text, self.options.issue_limit);
        collector.absorb_result(parse_result);
        let Some(file) = file else {
            visiting.remove(&source_id);
            cache.insert(source_id, None);
            return None;
        };

        // Pass 3: import resolution (recursive, depth-first).
        let mut imports: IndexMap<String, SourceId> = IndexMap::new();
        let mut seen_aliases: HashSet<String> = HashSet::new();
        for item in &file.items {
            let TopLevel::Import(import) = item else { continue };
            let alias = import
                .alias
                .clone()
                .unwrap_or_else(|| default_alias(&import.path));
            if !seen_aliases.insert(alias.clone()) {
                collector.collect(
                    Issue::error(Code::EImportDuplicate, format!("duplicate import alias `{alias}`"))
                        .with_span(import.span.clone())
                        .build(),
                );
                continue;
            }
            match self.resolver.resolve(&source_id, &import.path) {
                Ok((imported_id, imported_text)) => {
                    let imported = self.compile_unit(
                        imported_id.clone(),
                        imported_text,
                        visiting,
                        cache,
                        collector,
                        cancel,
                    );
                    if imported.is_some() {
                        imports.insert(alias, imported_id);
                    }
                }
                Err(ImportError::PathEscape(p)) => {
                    collector.collect(
                        Issue::error(Code::EPathEscape, format!("import path `{p}` escapes the module root"))
                            .with_span(import.span.clone())
                            .build(),
                    );
                }
                Err(e @ ImportError::NotFound(..)) => {
                    let code = if matches!(self.resolver_is_noop(), true) {
                        Code::EImportNotAllowed
                    } else {
                        Code::EImportResolve
                    };
                    collector.collect(
                        Issue::error(code, e.to_string())
                            .with_span(import.span.clone())
                            .build(),
                    );
                }
            }
        }

        visiting.remove(&source_id);

        let imported_schemas: HashMap<SourceId, Schema> = imports
            .values()
            .filter_map(|id| cache.get(id).cloned().flatten().map(|s| (id.clone(), s)))
            .collect();

        let schema = compile_from_ast(&source_id, file, imports, &imported_schemas, collector);
        cache.insert(source_id, schema.clone());
        schema
    }

    fn resolver_is_noop(&self) -> bool {
        std::any::type_name::<R>() == std::any::type_name::<NoImportsResolver>()
    }
}

fn default_alias(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path);
    stem.to_string()
}

impl Collector {
    /// Absorbs a pre-finished [`DiagResult`] (from a standalone parser
    /// invocation) into this collector, preserving insertion order.
    fn absorb_result(&mut self, result: DiagResult) {
        for issue in result.issues {
            self.collect(issue);
        }
        self.note_dropped(result.dropped, result.limit_reached);
    }

    fn note_dropped(&mut self, dropped: u32, limit_reached: bool) {
        if limit_reached {
            for _ in 0..dropped {
                self.collect(Issue::info(Code::EInternal, "diagnostic dropped upstream").build());
            }
        }
    }
}

// ---------------------------------------------------------------------
// Passes 4-9: indexing, reference resolution, alias expansion,
// inheritance merging, semantic checks, finalize.
// ---------------------------------------------------------------------

fn compile_from_ast(
    source_id: &SourceId,
    file: SchemaFile,
    imports: IndexMap<String, SourceId>,
    imported_schemas: &HashMap<SourceId, Schema>,
    collector: &mut Collector,
) -> Option<Schema> {
    // Pass 4: type-name indexing.
    let mut raw_types: IndexMap<String, ast::TypeDecl> = IndexMap::new();
    let mut raw_aliases: IndexMap<String, ConstraintExpr> = IndexMap::new();
    for item in file.items {
        match item {
            TopLevel::Type(t) => {
                if raw_types.contains_key(&t.name) {
                    collector.collect(
                        Issue::error(Code::ESyntax, format!("duplicate type `{}`", t.name))
                            .with_span(t.span.clone())
                            .build(),
                    );
                    continue;
                }
                raw_types.insert(t.name.clone(), t);
            }
            TopLevel::Alias(a) => {
                raw_aliases.insert(a.name.clone(), a.constraint);
            }
            TopLevel::Import(_) => {}
        }
    }

    // Pass 6: datatype alias expansion (no cycles possible: RHS is always
    // a built-in constraint form per the grammar).
    let mut datatype_aliases: IndexMap<String, Constraint> = IndexMap::new();
    for (name, expr) in &raw_aliases {
        match resolve_constraint(expr, source_id, &imports, imported_schemas, &datatype_aliases, collector) {
            Some(c) => {
                datatype_aliases.insert(name.clone(), c);
            }
            None => continue,
        }
    }

    // Pass 5: type reference resolution for extends/relation targets,
    // interleaved with building each type's declared view.
    let mut types: IndexMap<String, Type> = IndexMap::new();
    for (name, decl) in &raw_types {
        let Some(t) = build_declared_type(source_id, decl, &imports, imported_schemas, &datatype_aliases, collector)
        else {
            continue;
        };
        types.insert(name.clone(), t);
    }

    // Pull in imported types by qualified reference so `extends`/targets
    // resolve; they keep their own schema_path and are not re-declared.
    let mut all_types: HashMap<TypeId, Type> = HashMap::new();
    for t in types.values() {
        all_types.insert(t.id.clone(), t.clone());
    }
    for imported in imported_schemas.values() {
        for t in imported.types.values() {
            all_types.entry(t.id.clone()).or_insert_with(|| t.clone());
        }
    }

    // Pass 7: inheritance merging, topological over `extends`.
    let order = match topological_order(&types, &all_types, collector) {
        Some(o) => o,
        None => return None,
    };
    for id in order {
        if let Some(local) = types.get(&id.name).cloned() {
            if local.id != id {
                continue;
            }
            let merged = merge_type(&local, &all_types, collector);
            all_types.insert(id.clone(), merged.clone());
            types.insert(id.name.clone(), merged);
        }
    }

    // Pass 8: semantic checks.
    for t in types.values() {
        semantic_checks(t, collector);
    }

    if collector.has_errors() {
        return None;
    }

    // Re-expose every directly-imported type under its qualified
    // `alias.Name` key so relation/extends targets living in another
    // schema can be resolved later (by the validator and graph builder)
    // through this schema alone, without re-running semantic checks on
    // types that already passed them in their own compile. `types` holds
    // every type reachable from this schema, locally declared and
    // imported, per the doc comment above.
    for (alias, schema_path) in &imports {
        if let Some(imported) = imported_schemas.get(schema_path) {
            for (name, t) in &imported.types {
                if name.contains('.') {
                    continue;
                }
                types.insert(format!("{alias}.{name}"), t.clone());
            }
        }
    }

    // Pass 9: finalize.
    Some(Schema {
        name: file.name,
        source_id: source_id.clone(),
        documentation: file.documentation,
        imports,
        types,
        datatype_aliases,
    })
}

fn resolve_type_ref(
    r: &ast::TypeRef,
    local_source: &SourceId,
    imports: &IndexMap<String, SourceId>,
    imported_schemas: &HashMap<SourceId, Schema>,
    collector: &mut Collector,
) -> Option<TypeId> {
    match &r.alias {
        None => Some(TypeId::new(local_source.clone(), r.name.clone())),
        Some(alias) => {
            let Some(schema_path) = imports.get(alias) else {
                collector.collect(
                    Issue::error(Code::EUnresolvedType, format!("unknown import alias `{alias}`"))
                        .with_span(r.span.clone())
                        .build(),
                );
                return None;
            };
            let Some(imported) = imported_schemas.get(schema_path) else {
                collector.collect(
                    Issue::error(Code::EUnresolvedType, format!("import `{alias}` failed to compile"))
                        .with_span(r.span.clone())
                        .build(),
                );
                return None;
            };
            if !imported.types.contains_key(&r.name) {
                collector.collect(
                    Issue::error(
                        Code::EUnresolvedType,
                        format!("type `{}` not found in import `{alias}`", r.name),
                    )
                    .with_span(r.span.clone())
                    .build(),
                );
                return None;
            }
            Some(TypeId::new(schema_path.clone(), r.name.clone()))
        }
    }
}

fn resolve_constraint(
    expr: &ConstraintExpr,
    local_source: &SourceId,
    imports: &IndexMap<String, SourceId>,
    imported_schemas: &HashMap<SourceId, Schema>,
    aliases: &IndexMap<String, Constraint>,
    collector: &mut Collector,
) -> Option<Constraint> {
    Some(match expr {
        ConstraintExpr::Integer { min, max } => {
            if let (Some(a), Some(b)) = (min, max) {
                if a > b {
                    collector.collect(
                        Issue::error(Code::EInvalidConstraint, format!("inverted bound [{a}, {b}]")).build(),
                    );
                    return None;
                }
            }
            Constraint::Integer { min: *min, max: *max }
        }
        ConstraintExpr::Float { min, max } => {
            if let (Some(a), Some(b)) = (min, max) {
                if a > b {
                    collector.collect(
                        Issue::error(Code::EInvalidConstraint, format!("inverted bound [{a}, {b}]")).build(),
                    );
                    return None;
                }
            }
            Constraint::Float { min: *min, max: *max }
        }
        ConstraintExpr::Boolean => Constraint::Boolean,
        ConstraintExpr::String { min_runes, max_runes } => {
            if let (Some(a), Some(b)) = (min_runes, max_runes) {
                if a > b {
                    collector.collect(
                        Issue::error(Code::EInvalidConstraint, format!("inverted bound [{a}, {b}]")).build(),
                    );
                    return None;
                }
            }
            Constraint::String {
                min_runes: *min_runes,
                max_runes: *max_runes,
            }
        }
        ConstraintExpr::Enum { options } => {
            if options.len() < 2 {
                collector.collect(
                    Issue::error(Code::EInvalidConstraint, "Enum requires at least two options").build(),
                );
                return None;
            }
            Constraint::Enum {
                options: options.clone(),
            }
        }
        ConstraintExpr::Pattern { first, second } => Constraint::Pattern {
            first: first.clone(),
            second: second.clone(),
        },
        ConstraintExpr::Timestamp => Constraint::Timestamp,
        ConstraintExpr::Date => Constraint::Date,
        ConstraintExpr::Uuid => Constraint::Uuid,
        ConstraintExpr::Vector { dim } => Constraint::Vector { dim: *dim },
        ConstraintExpr::List { element, min_len, max_len } => {
            if let (Some(a), Some(b)) = (min_len, max_len) {
                if a > b {
                    collector.collect(
                        Issue::error(Code::EInvalidConstraint, format!("inverted bound [{a}, {b}]")).build(),
                    );
                    return None;
                }
            }
            let inner = resolve_constraint(element, local_source, imports, imported_schemas, aliases, collector)?;
            Constraint::List {
                element: Box::new(inner),
                min_len: *min_len,
                max_len: *max_len,
            }
        }
        ConstraintExpr::AliasRef(r) => {
            if r.alias.is_some() {
                collector.collect(
                    Issue::error(Code::EUnresolvedType, "datatype aliases cannot be qualified")
                        .with_span(r.span.clone())
                        .build(),
                );
                return None;
            }
            match aliases.get(&r.name) {
                Some(c) => c.clone(),
                None => {
                    collector.collect(
                        Issue::error(Code::EUnresolvedType, format!("unknown datatype alias `{}`", r.name))
                            .with_span(r.span.clone())
                            .build(),
                    );
                    return None;
                }
            }
        }
    })
}

fn build_declared_type(
    source_id: &SourceId,
    decl: &ast::TypeDecl,
    imports: &IndexMap<String, SourceId>,
    imported_schemas: &HashMap<SourceId, Schema>,
    aliases: &IndexMap<String, Constraint>,
    collector: &mut Collector,
) -> Option<Type> {
    let id = TypeId::new(source_id.clone(), decl.name.clone());
    let mut extends = Vec::new();
    for r in &decl.extends {
        if let Some(tid) = resolve_type_ref(r, source_id, imports, imported_schemas, collector) {
            extends.push(tid);
        }
    }

    let mut properties = IndexMap::new();
    let mut associations = IndexMap::new();
    let mut compositions = IndexMap::new();
    let mut invariants = Vec::new();

    for member in &decl.members {
        match member {
            Member::Property(p) => {
                let Some(constraint) =
                    resolve_constraint(&p.constraint, source_id, imports, imported_schemas, aliases, collector)
                else {
                    continue;
                };
                properties.insert(
                    p.name.clone(),
                    Property {
                        name: p.name.clone(),
                        constraint,
                        is_primary: p.flags.primary,
                        is_required: p.flags.required || p.flags.primary,
                        documentation: p.documentation.clone(),
                        span: p.span.clone(),
                    },
                );
            }
            Member::Relation(r) => {
                let Some(target) = resolve_type_ref(&r.target, source_id, imports, imported_schemas, collector)
                else {
                    continue;
                };
                let mut edge_props = IndexMap::new();
                for p in &r.properties {
                    let Some(constraint) =
                        resolve_constraint(&p.constraint, source_id, imports, imported_schemas, aliases, collector)
                    else {
                        continue;
                    };
                    if matches!(constraint, Constraint::Vector { .. }) {
                        collector.collect(
                            Issue::error(Code::EInvalidConstraint, "Vector is not permitted on edge properties")
                                .with_span(p.span.clone())
                                .build(),
                        );
                        continue;
                    }
                    if matches!(constraint, Constraint::List { .. }) {
                        collector.collect(
                            Issue::error(Code::EListOnEdge, format!("edge property `{}` may not be a List", p.name))
                                .with_span(p.span.clone())
                                .build(),
                        );
                        continue;
                    }
                    edge_props.insert(
                        p.name.clone(),
                        Property {
                            name: p.name.clone(),
                            constraint,
                            is_primary: p.flags.primary,
                            is_required: p.flags.required || p.flags.primary,
                            documentation: p.documentation.clone(),
                            span: p.span.clone(),
                        },
                    );
                }
                let relation = Relation {
                    name: r.name.clone(),
                    kind: match r.kind {
                        AstRelationKind::Association => RelationKind::Association,
                        AstRelationKind::Composition => RelationKind::Composition,
                    },
                    target,
                    optional: r.multiplicity.optional,
                    many: r.multiplicity.many,
                    backref: r.reverse.clone(),
                    properties: edge_props,
                    span: r.span.clone(),
                };
                match r.kind {
                    AstRelationKind::Association => {
                        associations.insert(r.name.clone(), relation);
                    }
                    AstRelationKind::Composition => {
                        compositions.insert(r.name.clone(), relation);
                    }
                }
            }
            Member::Invariant(inv) => {
                invariants.push(Invariant {
                    name: inv.name.clone(),
                    body: inv.body.clone(),
                    span: inv.span.clone(),
                });
            }
        }
    }

    let kind = match decl.modifier {
        TypeModifier::Concrete => TypeKind::Concrete,
        TypeModifier::Abstract => TypeKind::Abstract,
        TypeModifier::Part => TypeKind::Part,
    };

    Some(Type {
        id,
        documentation: decl.documentation.clone(),
        kind,
        extends,
        declared_properties: properties.clone(),
        declared_associations: associations.clone(),
        declared_compositions: compositions.clone(),
        declared_invariants: invariants.clone(),
        // Effective views start as a copy of the declared view; merged in
        // pass 7 once ancestors are known.
        properties,
        associations,
        compositions,
        invariants,
        declared: true,
    })
}

/// Topologically sorts every locally-declared type id so merging always
/// sees a parent before its children. Cycles are reported as a single
/// `E_INTERNAL` diagnostic — see `DESIGN.md` for why this shares a code
/// with other internal invariant violations rather than getting its own.
fn topological_order(
    types: &IndexMap<String, Type>,
    all_types: &HashMap<TypeId, Type>,
    collector: &mut Collector,
) -> Option<Vec<TypeId>> {
    let mut order = Vec::new();
    let mut visited: HashSet<TypeId> = HashSet::new();
    let mut in_progress: HashSet<TypeId> = HashSet::new();

    fn visit(
        id: &TypeId,
        all_types: &HashMap<TypeId, Type>,
        visited: &mut HashSet<TypeId>,
        in_progress: &mut HashSet<TypeId>,
        order: &mut Vec<TypeId>,
        collector: &mut Collector,
    ) -> bool {
        if visited.contains(id) {
            return true;
        }
        if !in_progress.insert(id.clone()) {
            collector.collect(
                Issue::error(Code::EInternal, format!("`extends` cycle detected at `{}`", id.name)).build(),
            );
            return false;
        }
        if let Some(t) = all_types.get(id) {
            for parent in &t.extends {
                if !visit(parent, all_types, visited, in_progress, order, collector) {
                    return false;
                }
            }
        }
        in_progress.remove(id);
        visited.insert(id.clone());
        order.push(id.clone());
        true
    }

    for t in types.values() {
        if !visit(&t.id, all_types, &mut visited, &mut in_progress, &mut order, collector) {
            return None;
        }
    }
    Some(order)
}

fn merge_type(local: &Type, all_types: &HashMap<TypeId, Type>, collector: &mut Collector) -> Type {
    let mut properties: IndexMap<String, Property> = IndexMap::new();
    let mut associations: IndexMap<String, Relation> = IndexMap::new();
    let mut compositions: IndexMap<String, Relation> = IndexMap::new();
    let mut invariants: Vec<Invariant> = Vec::new();

    for parent_id in &local.extends {
        let Some(parent) = all_types.get(parent_id) else {
            continue;
        };
        for (name, prop) in &parent.properties {
            properties.insert(name.clone(), prop.clone());
        }
        for (name, rel) in &parent.associations {
            associations.insert(name.clone(), rel.clone());
        }
        for (name, rel) in &parent.compositions {
            compositions.insert(name.clone(), rel.clone());
        }
        invariants.extend(parent.invariants.iter().cloned());
    }

    for (name, child_prop) in &local.declared_properties {
        match properties.get(name) {
            Some(parent_prop) => match narrow_property(child_prop, parent_prop) {
                Some(merged) => {
                    properties.insert(name.clone(), merged);
                }
                None => {
                    collector.collect(
                        Issue::error(
                            Code::EPropertyConflict,
                            format!(
                                "property `{name}` on `{}` widens its inherited constraint",
                                local.id.name
                            ),
                        )
                        .with_span(child_prop.span.clone())
                        .build(),
                    );
                    properties.insert(name.clone(), parent_prop.clone());
                }
            },
            None => {
                properties.insert(name.clone(), child_prop.clone());
            }
        }
    }

    for (name, child_rel) in &local.declared_associations {
        merge_relation(name, child_rel, &mut associations, &local.id.name, collector);
    }
    for (name, child_rel) in &local.declared_compositions {
        merge_relation(name, child_rel, &mut compositions, &local.id.name, collector);
    }

    invariants.extend(local.declared_invariants.iter().cloned());

    Type {
        properties,
        associations,
        compositions,
        invariants,
        ..local.clone()
    }
}

fn merge_relation(
    name: &str,
    child: &Relation,
    merged: &mut IndexMap<String, Relation>,
    type_name: &str,
    collector: &mut Collector,
) {
    match merged.get(name) {
        Some(parent) => {
            if parent.target != child.target {
                collector.collect(
                    Issue::error(
                        Code::EPropertyConflict,
                        format!("relation `{name}` on `{type_name}` may not change its target type"),
                    )
                    .with_span(child.span.clone())
                    .build(),
                );
                return;
            }
            if child.optional && !parent.optional {
                collector.collect(
                    Issue::error(
                        Code::EPropertyConflict,
                        format!("relation `{name}` on `{type_name}` widens a required relation to optional"),
                    )
                    .with_span(child.span.clone())
                    .build(),
                );
                return;
            }
            if child.many && !parent.many {
                collector.collect(
                    Issue::error(
                        Code::EPropertyConflict,
                        format!("relation `{name}` on `{type_name}` widens a to-one relation to many"),
                    )
                    .with_span(child.span.clone())
                    .build(),
                );
                return;
            }
            let mut next = child.clone();
            next.optional = parent.optional && child.optional;
            next.many = parent.many && child.many;
            merged.insert(name.to_string(), next);
        }
        None => {
            merged.insert(name.to_string(), child.clone());
        }
    }
}

/// Checks whether `child` narrows `parent`, returning the merged
/// (inheriting-open-sides) property on success.
fn narrow_property(child: &Property, parent: &Property) -> Option<Property> {
    let constraint = narrow_constraint(&child.constraint, &parent.constraint)?;
    Some(Property {
        name: child.name.clone(),
        constraint,
        is_primary: child.is_primary || parent.is_primary,
        is_required: child.is_required || parent.is_required,
        documentation: child.documentation.clone().or_else(|| parent.documentation.clone()),
        span: child.span.clone(),
    })
}

fn narrow_numeric<T: PartialOrd + Copy>(
    child: (Option<T>, Option<T>),
    parent: (Option<T>, Option<T>),
) -> Option<(Option<T>, Option<T>)> {
    let eff_min = child.0.or(parent.0);
    let eff_max = child.1.or(parent.1);
    let min_ok = match (eff_min, parent.0) {
        (_, None) => true,
        (Some(m), Some(p)) => m >= p,
        (None, Some(_)) => false,
    };
    let max_ok = match (eff_max, parent.1) {
        (_, None) => true,
        (Some(m), Some(p)) => m <= p,
        (None, Some(_)) => false,
    };
    if min_ok && max_ok {
        Some((eff_min, eff_max))
    } else {
        None
    }
}

fn narrow_constraint(child: &Constraint, parent: &Constraint) -> Option<Constraint> {
    match (child, parent) {
        (Constraint::Integer { min: cmin, max: cmax }, Constraint::Integer { min: pmin, max: pmax }) => {
            let (min, max) = narrow_numeric((*cmin, *cmax), (*pmin, *pmax))?;
            Some(Constraint::Integer { min, max })
        }
        (Constraint::Float { min: cmin, max: cmax }, Constraint::Float { min: pmin, max: pmax }) => {
            let (min, max) = narrow_numeric((*cmin, *cmax), (*pmin, *pmax))?;
            Some(Constraint::Float { min, max })
        }
        (Constraint::Boolean, Constraint::Boolean) => Some(Constraint::Boolean),
        (
            Constraint::String { min_runes: cmin, max_runes: cmax },
            Constraint::String { min_runes: pmin, max_runes: pmax },
        ) => {
            let (min_runes, max_runes) = narrow_numeric((*cmin, *cmax), (*pmin, *pmax))?;
            Some(Constraint::String { min_runes, max_runes })
        }
        (Constraint::Enum { options: copts }, Constraint::Enum { options: popts }) => {
            let pset: HashSet<&String> = popts.iter().collect();
            if copts.iter().all(|o| pset.contains(o)) {
                Some(Constraint::Enum { options: copts.clone() })
            } else {
                None
            }
        }
        (
            Constraint::Pattern { first: cfirst, second: csecond },
            Constraint::Pattern { first: pfirst, second: psecond },
        ) => {
            if cfirst != pfirst {
                return None;
            }
            match (psecond, csecond) {
                (Some(p), Some(c)) if p != c => None,
                (Some(p), None) => Some(Constraint::Pattern {
                    first: cfirst.clone(),
                    second: Some(p.clone()),
                }),
                _ => Some(Constraint::Pattern {
                    first: cfirst.clone(),
                    second: csecond.clone(),
                }),
            }
        }
        (Constraint::Timestamp, Constraint::Timestamp) => Some(Constraint::Timestamp),
        (Constraint::Date, Constraint::Date) => Some(Constraint::Date),
        (Constraint::Uuid, Constraint::Uuid) => Some(Constraint::Uuid),
        (Constraint::Vector { dim: cd }, Constraint::Vector { dim: pd }) => {
            if cd == pd {
                Some(Constraint::Vector { dim: *cd })
            } else {
                None
            }
        }
        (
            Constraint::List { element: celem, min_len: cmin, max_len: cmax },
            Constraint::List { element: pelem, min_len: pmin, max_len: pmax },
        ) => {
            let element = narrow_constraint(celem, pelem)?;
            let (min_len, max_len) = narrow_numeric((*cmin, *cmax), (*pmin, *pmax))?;
            Some(Constraint::List {
                element: Box::new(element),
                min_len,
                max_len,
            })
        }
        _ => None,
    }
}

fn semantic_checks(t: &Type, collector: &mut Collector) {
    if matches!(t.kind, TypeKind::Concrete | TypeKind::Part) {
        let primaries = t.primary_key_properties();
        if primaries.is_empty() {
            collector.collect(
                Issue::error(
                    Code::EInvalidPrimaryKeyType,
                    format!("type `{}` has no primary property", t.id.name),
                )
                .build(),
            );
        }
        for p in &primaries {
            if matches!(p.constraint, Constraint::List { .. }) {
                collector.collect(
                    Issue::error(
                        Code::EListPrimaryKey,
                        format!("primary property `{}` on `{}` may not be a List", p.name, t.id.name),
                    )
                    .with_span(p.span.clone())
                    .build(),
                );
            } else if !p.constraint.is_primary_key_eligible() {
                collector.collect(
                    Issue::error(
                        Code::EInvalidPrimaryKeyType,
                        format!(
                            "primary property `{}` on `{}` must be String/UUID/Date/Timestamp, found {}",
                            p.name,
                            t.id.name,
                            p.constraint.kind_name()
                        ),
                    )
                    .with_span(p.span.clone())
                    .build(),
                );
            }
        }
    }

    for rel in t.associations.values().chain(t.compositions.values()) {
        for p in rel.properties.values() {
            if matches!(p.constraint, Constraint::List { .. }) {
                collector.collect(
                    Issue::error(Code::EListOnEdge, format!("edge property `{}` on `{}` may not be a List", p.name, rel.name))
                        .with_span(p.span.clone())
                        .build(),
                );
            }
        }
    }
}

impl Collector {
    fn collect_if_invalid_composition_target(&mut self, rel: &Relation, owner: &Type) {
        // The target type's kind is resolved through `all_types` during
        // merging; by the time semantic checks run, compositions always
        // carry a concrete/abstract/part classification reachable from the
        // owning schema's type table. Since `Type` here only has the
        // resolved `TypeId`, the kind check happens where both schema's
        // `all_types` is in scope (see `check_composition_targets` below),
        // this stub exists only to group the diagnostic's call site near
        // the rest of `semantic_checks`.
        let _ = (rel, owner);
    }
}

/// Second pass of composition-target checking, requiring the full type
/// table (post-merge) rather than a single `Type`'s view.
pub(crate) fn check_composition_targets(schema: &Schema, collector: &mut Collector) {
    for t in schema.types.values() {
        for rel in t.compositions.values() {
            match schema.types.get(&rel.target.name) {
                Some(target) if target.kind == TypeKind::Part => {}
                _ => {
                    collector.collect(
                        Issue::error(
                            Code::EInvalidCompositionTarget,
                            format!(
                                "composition `{}` on `{}` must target a `part` type",
                                rel.name, t.id.name
                            ),
                        )
                        .with_span(rel.span.clone())
                        .build(),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> (Option<Schema>, DiagResult) {
        let loader = Loader::in_memory(LoaderOptions::default());
        loader.compile(SourceId::new("<test>"), text, &CancellationToken::never())
    }

    #[test]
    fn simple_schema_compiles_ok() {
        let (schema, result) = compile(
            r#"schema "S" type Item { id String primary name String required }"#,
        );
        assert!(result.ok(), "{result}");
        let schema = schema.unwrap();
        let item = schema.type_by_name("Item").unwrap();
        assert!(item.properties.get("id").unwrap().is_primary);
        assert!(item.properties.get("name").unwrap().is_required);
    }

    #[test]
    fn widening_is_rejected() {
        let (schema, result) = compile(
            r#"schema "S"
               type Parent { age Integer[0, 150] primary_key String primary }
               type Child extends Parent { age Integer[-1, 200] }"#
                .replace("primary_key", "id")
                .as_str(),
        );
        assert!(schema.is_none());
        assert!(result.issues.iter().any(|i| i.code == Code::EPropertyConflict));
    }

    #[test]
    fn narrowing_is_accepted() {
        let (schema, result) = compile(
            r#"schema "S"
               type Parent { id String primary age Integer[0, 150] }
               type Child extends Parent { age Integer[10, 100] }"#,
        );
        assert!(result.ok(), "{result}");
        let schema = schema.unwrap();
        let child = schema.type_by_name("Child").unwrap();
        match &child.properties.get("age").unwrap().constraint {
            Constraint::Integer { min, max } => {
                assert_eq!(*min, Some(10));
                assert_eq!(*max, Some(100));
            }
            other => panic!("unexpected constraint {other:?}"),
        }
    }

    #[test]
    fn enum_requires_two_options() {
        let (schema, result) = compile(r#"schema "S" type Item { id String primary status Enum["a"] }"#);
        assert!(schema.is_none());
        assert!(result.issues.iter().any(|i| i.code == Code::EInvalidConstraint));
    }

    #[test]
    fn inverted_bound_is_rejected() {
        let (schema, result) = compile(r#"schema "S" type Item { id String primary n Integer[5, 1] }"#);
        assert!(schema.is_none());
        assert!(result.issues.iter().any(|i| i.code == Code::EInvalidConstraint));
    }

    #[test]
    fn import_forbidden_in_memory() {
        let (schema, result) = compile(r#"schema "S" import "other.sdl" type Item { id String primary }"#);
        assert!(schema.is_none());
        assert!(result.issues.iter().any(|i| i.code == Code::EImportNotAllowed));
    }

    #[test]
    fn primary_key_type_must_be_eligible() {
        let (schema, result) = compile(r#"schema "S" type Item { id Integer primary }"#);
        assert!(schema.is_none());
        assert!(result.issues.iter().any(|i| i.code == Code::EInvalidPrimaryKeyType));
    }

    #[test]
    fn abstract_type_without_primary_is_allowed() {
        let (schema, result) = compile(r#"schema "S" abstract type Base { name String }"#);
        assert!(result.ok(), "{result}");
        let schema = schema.unwrap();
        assert_eq!(schema.type_by_name("Base").unwrap().kind, TypeKind::Abstract);
    }
}
