//! Diagnostic substrate: codes, severities, spans, and a bounded collector.
//!
//! Every phase of the toolchain (lexer, parser, compiler, evaluator,
//! validator, graph builder) threads a [`Collector`] through its work and
//! never throws: it either produces a usable artifact alongside a clean
//! [`Result`], or no artifact and a non-OK `Result`.

use std::fmt;

use crate::source::Span;

/// Closed enumeration of diagnostic codes.
///
/// Invariant: a code is always one of these compile-time constants, never
/// derived from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Code {
    ESyntax,
    EImportCycle,
    EImportResolve,
    EImportNotAllowed,
    EImportDuplicate,
    EPathEscape,
    EUnresolvedType,
    EInvalidConstraint,
    EInvalidPrimaryKeyType,
    EInvalidCompositionTarget,
    EListOnEdge,
    EListPrimaryKey,
    EPropertyConflict,
    EAbstractType,
    EMissingRequired,
    EUnknownField,
    ETypeMismatch,
    EConstraintFail,
    EInvariantFail,
    EEvalError,
    EInstanceTypeNotFound,
    EMissingTypeTag,
    EInvalidTypeTag,
    EAdapterParse,
    EDuplicatePk,
    EUnresolvedRequired,
    EUnresolved,
    EMissingParent,
    ECancelled,
    EInternal,
}

impl Code {
    /// The stable wire/string form of the code, e.g. `"E_SYNTAX"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::ESyntax => "E_SYNTAX",
            Code::EImportCycle => "E_IMPORT_CYCLE",
            Code::EImportResolve => "E_IMPORT_RESOLVE",
            Code::EImportNotAllowed => "E_IMPORT_NOT_ALLOWED",
            Code::EImportDuplicate => "E_IMPORT_DUPLICATE",
            Code::EPathEscape => "E_PATH_ESCAPE",
            Code::EUnresolvedType => "E_UNRESOLVED_TYPE",
            Code::EInvalidConstraint => "E_INVALID_CONSTRAINT",
            Code::EInvalidPrimaryKeyType => "E_INVALID_PRIMARY_KEY_TYPE",
            Code::EInvalidCompositionTarget => "E_INVALID_COMPOSITION_TARGET",
            Code::EListOnEdge => "E_LIST_ON_EDGE",
            Code::EListPrimaryKey => "E_LIST_PRIMARY_KEY",
            Code::EPropertyConflict => "E_PROPERTY_CONFLICT",
            Code::EAbstractType => "E_ABSTRACT_TYPE",
            Code::EMissingRequired => "E_MISSING_REQUIRED",
            Code::EUnknownField => "E_UNKNOWN_FIELD",
            Code::ETypeMismatch => "E_TYPE_MISMATCH",
            Code::EConstraintFail => "E_CONSTRAINT_FAIL",
            Code::EInvariantFail => "E_INVARIANT_FAIL",
            Code::EEvalError => "E_EVAL_ERROR",
            Code::EInstanceTypeNotFound => "E_INSTANCE_TYPE_NOT_FOUND",
            Code::EMissingTypeTag => "E_MISSING_TYPE_TAG",
            Code::EInvalidTypeTag => "E_INVALID_TYPE_TAG",
            Code::EAdapterParse => "E_ADAPTER_PARSE",
            Code::EDuplicatePk => "E_DUPLICATE_PK",
            Code::EUnresolvedRequired => "E_UNRESOLVED_REQUIRED",
            Code::EUnresolved => "E_UNRESOLVED",
            Code::EMissingParent => "E_MISSING_PARENT",
            Code::ECancelled => "E_CANCELLED",
            Code::EInternal => "E_INTERNAL",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a diagnostic. `Fatal`/`Error` make [`Result::ok`] false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Informational hint; never affects `OK()`.
    Hint,
    /// Informational message; never affects `OK()`.
    Info,
    /// Something worth a human's attention but not wrong.
    Warning,
    /// A recoverable error; the phase continues but the artifact is invalid.
    Error,
    /// An unrecoverable error that stopped the phase outright.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Hint => "hint",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// One structured diagnostic message.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Issue {
    /// How serious this diagnostic is.
    pub severity: Severity,
    /// Which stable code it carries.
    pub code: Code,
    /// Human-readable message.
    pub message: String,
    /// Where in the source this diagnostic applies, if anywhere.
    pub span: Option<Span>,
    /// Ordered key/value details shown alongside the message.
    pub details: Vec<(String, String)>,
    /// An optional suggestion for how to fix the issue.
    pub hint: Option<String>,
}

impl Issue {
    /// Starts building a new issue at the given severity and code.
    pub fn new(severity: Severity, code: Code, message: impl Into<String>) -> IssueBuilder {
        IssueBuilder {
            issue: Issue {
                severity,
                code,
                message: message.into(),
                span: None,
                details: Vec::new(),
                hint: None,
            },
        }
    }

    /// Shorthand for `Issue::new(Severity::Error, code, message)`.
    pub fn error(code: Code, message: impl Into<String>) -> IssueBuilder {
        Issue::new(Severity::Error, code, message)
    }

    /// Shorthand for `Issue::new(Severity::Warning, code, message)`.
    pub fn warning(code: Code, message: impl Into<String>) -> IssueBuilder {
        Issue::new(Severity::Warning, code, message)
    }

    /// Shorthand for `Issue::new(Severity::Info, code, message)`.
    pub fn info(code: Code, message: impl Into<String>) -> IssueBuilder {
        Issue::new(Severity::Info, code, message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.code, self.message)?;
        if let Some(span) = &self.span {
            write!(f, "\n  --> {span}")?;
        }
        for (k, v) in &self.details {
            write!(f, "\n  {k}: {v}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

/// Builder for [`Issue`], following the `Token::new(..).with_*().build()`
/// constructor idiom used throughout this crate.
pub struct IssueBuilder {
    issue: Issue,
}

impl IssueBuilder {
    /// Attaches a source span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.issue.span = Some(span);
        self
    }

    /// Attaches a source span if present.
    pub fn with_span_opt(mut self, span: Option<Span>) -> Self {
        self.issue.span = span;
        self
    }

    /// Appends an ordered detail key/value pair.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.issue.details.push((key.into(), value.into()));
        self
    }

    /// Attaches a fix-it hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.issue.hint = Some(hint.into());
        self
    }

    /// Finalizes the issue.
    pub fn build(self) -> Issue {
        self.issue
    }
}

/// The outcome of a diagnostic-producing phase: every issue collected, how
/// many were dropped for exceeding the collector's limit, and whether the
/// limit was reached at all.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Result {
    /// All retained issues, in insertion order.
    pub issues: Vec<Issue>,
    /// How many issues were discarded after the limit was reached.
    pub dropped: u32,
    /// Whether the collector's limit was ever reached.
    pub limit_reached: bool,
}

impl Result {
    /// `OK()` holds iff no `Error`/`Fatal` severity issue was collected.
    pub fn ok(&self) -> bool {
        !self.has_errors()
    }

    /// True if any `Error`/`Fatal` issue was collected.
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity >= Severity::Error)
    }

    /// Only the `Error`/`Fatal` messages, in insertion order.
    pub fn messages(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter(|i| i.severity >= Severity::Error)
            .map(|i| i.message.as_str())
            .collect()
    }

    /// Merges another result's issues into this one, preserving order.
    /// Used to combine diagnostics across independently-collected phases.
    pub fn merge(&mut self, other: Result) {
        self.issues.extend(other.issues);
        self.dropped += other.dropped;
        self.limit_reached = self.limit_reached || other.limit_reached;
    }
}

impl fmt::Display for Result {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{issue}")?;
        }
        if self.limit_reached {
            write!(f, "({} further issue(s) dropped)", self.dropped)?;
        }
        Ok(())
    }
}

/// A bounded, append-only collector of [`Issue`]s.
///
/// `limit == 0` means unlimited. Once the limit is reached, further
/// `collect` calls increment `dropped` and set `limit_reached` without
/// growing `issues`.
#[derive(Debug, Default)]
pub struct Collector {
    issues: Vec<Issue>,
    dropped: u32,
    limit_reached: bool,
    limit: usize,
}

impl Collector {
    /// Creates a new collector bounded by `limit` issues (`0` = unlimited).
    pub fn new(limit: usize) -> Self {
        Self {
            issues: Vec::new(),
            dropped: 0,
            limit_reached: false,
            limit,
        }
    }

    /// Collects one issue, subject to the bound.
    pub fn collect(&mut self, issue: Issue) {
        if self.limit != 0 && self.issues.len() >= self.limit {
            self.dropped += 1;
            self.limit_reached = true;
            return;
        }
        if issue.severity >= Severity::Warning {
            tracing::warn!(code = issue.code.as_str(), message = %issue.message, "diagnostic collected");
        } else {
            tracing::debug!(code = issue.code.as_str(), message = %issue.message, "diagnostic collected");
        }
        self.issues.push(issue);
    }

    /// Number of issues currently retained (monotonically non-decreasing
    /// except that it stops advancing once the limit is reached).
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// True if no issues have been retained.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// True if any `Error`/`Fatal` issue has been collected so far.
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity >= Severity::Error)
    }

    /// Consumes the collector into a final [`Result`].
    pub fn finish(self) -> Result {
        Result {
            issues: self.issues,
            dropped: self.dropped,
            limit_reached: self.limit_reached,
        }
    }

    /// Absorbs all issues from another collector (used when a sub-phase,
    /// e.g. an imported schema's compile, runs with its own collector).
    pub fn absorb(&mut self, other: Collector) {
        for issue in other.issues {
            self.collect(issue);
        }
        self.dropped += other.dropped;
        self.limit_reached = self.limit_reached || other.limit_reached;
    }
}
