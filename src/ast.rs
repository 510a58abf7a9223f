//! Abstract syntax tree for the schema definition language (SDL).
//!
//! The parser (`crate::parser`) turns a token stream into the tree defined
//! here; the schema compiler (`crate::schema`) consumes it to produce the
//! immutable [`crate::schema::Schema`] model. Every node carries a
//! [`Span`] so diagnostics can point back into the original source
//!.

pub use crate::source::Span;

/// A possibly-qualified type name: `Name` or `alias.Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// The import alias, if the reference is qualified.
    pub alias: Option<String>,
    /// The bare type name.
    pub name: String,
    /// Location of the reference.
    pub span: Span,
}

impl TypeRef {
    /// The reference rendered the way it appeared in source (`alias.Name`
    /// or `Name`).
    pub fn display_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{alias}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// One end of an `[min, max]` numeric bound. `_` parses to `None`.
pub type BoundEnd<T> = Option<T>;

/// A numeric literal appearing in a bound or literal expression: kept as
/// both variants since the grammar distinguishes `Integer` from `Float`
/// bounds syntactically (a `.` makes it a float).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumLit {
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
}

/// The constraint grammar as written in source, before alias expansion and
/// before cross-checking against the rest of the schema
/// (`crate::schema::Constraint` is the resolved, post-compile form).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintExpr {
    /// `Integer[min, max]`
    Integer {
        min: BoundEnd<i64>,
        max: BoundEnd<i64>,
    },
    /// `Float[min, max]`
    Float {
        min: BoundEnd<f64>,
        max: BoundEnd<f64>,
    },
    /// `Boolean`
    Boolean,
    /// `String[min_runes, max_runes]`
    String {
        min_runes: BoundEnd<u32>,
        max_runes: BoundEnd<u32>,
    },
    /// `Enum[opt1, opt2, ...]`
    Enum { options: Vec<String> },
    /// `Pattern[re1, re2?]`
    Pattern {
        first: String,
        second: Option<String>,
    },
    /// `Timestamp`
    Timestamp,
    /// `Date`
    Date,
    /// `UUID`
    Uuid,
    /// `Vector[dim]`
    Vector { dim: u32 },
    /// `List<elem>[min_len, max_len]`
    List {
        element: Box<ConstraintExpr>,
        min_len: BoundEnd<u32>,
        max_len: BoundEnd<u32>,
    },
    /// A bare `UCIdent` that names a datatype alias (`type N = C`), resolved
    /// during compilation.
    AliasRef(TypeRef),
}

/// `required` / `primary` property flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    /// Whether `required` was present.
    pub required: bool,
    /// Whether `primary` was present.
    pub primary: bool,
}

/// A property declaration inside a type body.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    /// Property name.
    pub name: String,
    /// Its datatype constraint, as written.
    pub constraint: ConstraintExpr,
    /// `required`/`primary` flags.
    pub flags: PropertyFlags,
    /// Doc comment immediately preceding the property, if any.
    pub documentation: Option<String>,
    /// Source location of the whole declaration.
    pub span: Span,
}

/// Multiplicity sugar for associations/compositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplicity {
    /// Whether the relation may be absent.
    pub optional: bool,
    /// Whether the relation may hold more than one target.
    pub many: bool,
}

impl Default for Multiplicity {
    /// The default when no `(...)` sugar is written: optional, not many.
    fn default() -> Self {
        Multiplicity {
            optional: true,
            many: false,
        }
    }
}

/// Whether a relation is an association (`-->`) or composition (`==>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `-->`, a reference resolved by primary key.
    Association,
    /// `==>`, ownership of a `part` type.
    Composition,
}

/// An association or composition declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDecl {
    /// The relation's name (conventionally `SCREAMING_SNAKE_CASE`).
    pub name: String,
    /// Association or composition.
    pub kind: RelationKind,
    /// Multiplicity sugar as written (defaults applied by the parser).
    pub multiplicity: Multiplicity,
    /// The target type.
    pub target: TypeRef,
    /// `reverse NAME`, association-only.
    pub reverse: Option<String>,
    /// Edge properties declared in `{ ... }`.
    pub properties: Vec<PropertyDecl>,
    /// Doc comment, if any.
    pub documentation: Option<String>,
    /// Source location.
    pub span: Span,
}

/// A named invariant: `! "name" <expr>`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantDecl {
    /// The invariant's name (also its failure message).
    pub name: String,
    /// The boolean predicate body.
    pub body: Expr,
    /// Source location.
    pub span: Span,
}

/// `abstract` / `part` type modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeModifier {
    /// No modifier: a concrete, instantiable type.
    Concrete,
    /// `abstract`: extendable but not instantiable.
    Abstract,
    /// `part`: only valid as a composition target.
    Part,
}

/// A member of a type body, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// A scalar property.
    Property(PropertyDecl),
    /// An association or composition.
    Relation(RelationDecl),
    /// An invariant.
    Invariant(InvariantDecl),
}

/// A `type` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    /// The type's unqualified name.
    pub name: String,
    /// `abstract`/`part`/concrete.
    pub modifier: TypeModifier,
    /// Parent types named in `extends`.
    pub extends: Vec<TypeRef>,
    /// Body members in source order.
    pub members: Vec<Member>,
    /// Doc comment, if any.
    pub documentation: Option<String>,
    /// Source location of the whole declaration.
    pub span: Span,
}

/// `type N = <builtin constraint>`, a datatype alias declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    /// The alias name.
    pub name: String,
    /// The constraint it expands to.
    pub constraint: ConstraintExpr,
    /// Source location.
    pub span: Span,
}

/// `import "path" [as alias]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    /// The literal path string as written.
    pub path: String,
    /// The alias the import is addressed by (defaults to the basename).
    pub alias: Option<String>,
    /// Source location.
    pub span: Span,
}

/// A top-level declaration in a schema file.
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    /// An `import` statement.
    Import(ImportDecl),
    /// A `type` declaration.
    Type(TypeDecl),
    /// A datatype alias declaration.
    Alias(AliasDecl),
}

/// A fully parsed schema file: the root of the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFile {
    /// The schema's declared name (the `STRING` after `schema`).
    pub name: String,
    /// Doc comment preceding the `schema` keyword.
    pub documentation: Option<String>,
    /// Declarations in source order.
    pub items: Vec<TopLevel>,
    /// Source location of the whole file.
    pub span: Span,
}

// ---------------------------------------------------------------------
// Expression AST (invariant bodies)
// ---------------------------------------------------------------------

/// A literal value in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// A boolean literal.
    Bool(bool),
    /// A string literal.
    Str(String),
    /// A regex literal: `/pattern/flags`.
    Regex { pattern: String, flags: String },
    /// `nil`/`_`.
    Nil,
    /// `[e1, e2, ...]`.
    List(Vec<Expr>),
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Xor,
    In,
    Match,
    NotMatch,
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Logical/nil-aware negation `!`.
    Not,
    /// Arithmetic negation `-`.
    Neg,
}

/// A datatype keyword used as the RHS of `=~`/`!~` (a type-tag test).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeKeyword {
    Integer,
    Float,
    Boolean,
    String,
    Timestamp,
    Date,
    Uuid,
    List,
}

/// The right-hand side of a `=~`/`!~` match expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRhs {
    /// A regex literal operand.
    Regex(Box<Expr>),
    /// A datatype keyword operand (type-tag test).
    Datatype(DatatypeKeyword),
}

/// A lambda parameter list and body: `|$x, ...| { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    /// Parameter names, without the leading `$`.
    pub params: Vec<String>,
    /// The lambda body expression.
    pub body: Box<Expr>,
    /// Source location.
    pub span: Span,
}

/// A built-in function invocation reached via the pipeline operator:
/// `expr -> Name(args) [|params| { body }]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCall {
    /// The implicit first argument (the piped-in value).
    pub receiver: Box<Expr>,
    /// The built-in function name, e.g. `"Filter"`.
    pub function: String,
    /// Explicit arguments after the function name.
    pub args: Vec<Expr>,
    /// A trailing lambda, for lambda-accepting built-ins.
    pub lambda: Option<Lambda>,
    /// Source location.
    pub span: Span,
}

/// An invariant/expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Literal, Span),
    /// `$name` or a bare identifier (implicit `$self.name` lookup).
    Var(String, Span),
    /// `e.field`.
    Member(Box<Expr>, String, Span),
    /// `e[i]`.
    Index(Box<Expr>, Box<Expr>, Span),
    /// `e[i, j]`.
    Slice(Box<Expr>, Box<Expr>, Box<Expr>, Span),
    /// `!e` / `-e`.
    Unary(UnOp, Box<Expr>, Span),
    /// `lhs op rhs`.
    Binary(BinOp, Box<Expr>, Box<Expr>, Span),
    /// `e =~ rhs` / `e !~ rhs`, `negated` distinguishes the two.
    Match {
        subject: Box<Expr>,
        rhs: MatchRhs,
        negated: bool,
        span: Span,
    },
    /// `cond ? { then : else }`.
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>, Span),
    /// `e -> Fn(args) [|lambda| {..}]`.
    Pipeline(PipelineCall),
    /// A bare lambda value (only meaningful as a pipeline's trailing arg;
    /// retained as a node so the parser has somewhere to put one if it is
    /// ever written standalone).
    LambdaLit(Lambda),
}

impl Expr {
    /// The span covering this expression node.
    pub fn span(&self) -> &Span {
        match self {
            Expr::Literal(_, s) => s,
            Expr::Var(_, s) => s,
            Expr::Member(_, _, s) => s,
            Expr::Index(_, _, s) => s,
            Expr::Slice(_, _, _, s) => s,
            Expr::Unary(_, _, s) => s,
            Expr::Binary(_, _, _, s) => s,
            Expr::Match { span, .. } => span,
            Expr::Ternary(_, _, _, s) => s,
            Expr::Pipeline(p) => &p.span,
            Expr::LambdaLit(l) => &l.span,
        }
    }
}

/// Escapes a string the way the lexer's string-literal grammar expects it
/// back: `\\`, `"`, newline, tab, carriage return.
fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Xor => "^",
            BinOp::In => "in",
            BinOp::Match => "=~",
            BinOp::NotMatch => "!~",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnOp::Not => "!",
            UnOp::Neg => "-",
        })
    }
}

impl std::fmt::Display for DatatypeKeyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DatatypeKeyword::Integer => "Integer",
            DatatypeKeyword::Float => "Float",
            DatatypeKeyword::Boolean => "Boolean",
            DatatypeKeyword::String => "String",
            DatatypeKeyword::Timestamp => "Timestamp",
            DatatypeKeyword::Date => "Date",
            DatatypeKeyword::Uuid => "UUID",
            DatatypeKeyword::List => "List",
        })
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Str(s) => write!(f, "\"{}\"", escape_str(s)),
            Literal::Regex { pattern, flags } => write!(f, "/{pattern}/{flags}"),
            Literal::Nil => f.write_str("_"),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl std::fmt::Display for Lambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("|")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "${p}")?;
        }
        write!(f, "| {{ {} }}", self.body)
    }
}

impl std::fmt::Display for PipelineCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}(", self.receiver, self.function)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{a}")?;
        }
        f.write_str(")")?;
        if let Some(lambda) = &self.lambda {
            write!(f, " {lambda}")?;
        }
        Ok(())
    }
}

/// Renders an expression so every nested binary/unary/ternary/match
/// operand is parenthesized, making the printed form's precedence
/// unambiguous regardless of the grammar's own binding rules. Used to
/// re-emit invariant bodies as SDL text for schema round-tripping.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(lit, _) => write!(f, "{lit}"),
            Expr::Var(name, _) => write!(f, "${name}"),
            Expr::Member(e, field, _) => write!(f, "({e}).{field}"),
            Expr::Index(e, i, _) => write!(f, "({e})[{i}]"),
            Expr::Slice(e, i, j, _) => write!(f, "({e})[{i}, {j}]"),
            Expr::Unary(op, e, _) => write!(f, "{op}({e})"),
            Expr::Binary(op, l, r, _) => write!(f, "({l}) {op} ({r})"),
            Expr::Match {
                subject,
                rhs,
                negated,
                ..
            } => {
                let op = if *negated { "!~" } else { "=~" };
                match rhs {
                    MatchRhs::Regex(r) => write!(f, "({subject}) {op} ({r})"),
                    MatchRhs::Datatype(kw) => write!(f, "({subject}) {op} {kw}"),
                }
            }
            Expr::Ternary(cond, then_e, else_e, _) => {
                write!(f, "({cond}) ? {{ {then_e} : {else_e} }}")
            }
            Expr::Pipeline(p) => write!(f, "{p}"),
            Expr::LambdaLit(l) => write!(f, "{l}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Position, SourceId};

    fn span() -> Span {
        Span::point(SourceId::new("t"), Position::default())
    }

    #[test]
    fn type_ref_display_name_qualified() {
        let r = TypeRef {
            alias: Some("geo".to_string()),
            name: "Place".to_string(),
            span: span(),
        };
        assert_eq!(r.display_name(), "geo.Place");
    }

    #[test]
    fn type_ref_display_name_unqualified() {
        let r = TypeRef {
            alias: None,
            name: "Place".to_string(),
            span: span(),
        };
        assert_eq!(r.display_name(), "Place");
    }

    #[test]
    fn default_multiplicity_is_optional_one() {
        let m = Multiplicity::default();
        assert!(m.optional);
        assert!(!m.many);
    }
}
