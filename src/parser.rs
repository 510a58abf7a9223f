//! Recursive-descent parser: token stream to AST.
//!
//! Recovers from syntax errors by synchronizing to the next top-level
//! declaration so a single malformed `type` does not abort the whole file;
//! every node is given a span covering the tokens it was built from.

use std::collections::HashMap;

use crate::ast::*;
use crate::diag::{Code, Collector, Issue};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::source::{SourceId, Span};

/// Parses an entire schema file from source text.
///
/// Returns the parsed AST (best-effort, possibly with gaps where recovery
/// skipped a malformed declaration) alongside the diagnostics collected.
/// `None` is only returned when the file does not even begin with a usable
/// `schema` declaration.
pub fn parse(source_id: SourceId, text: &str, issue_limit: usize) -> (Option<SchemaFile>, crate::diag::Result) {
    let mut parser = Parser::new(source_id, text, issue_limit);
    let file = parser.parse_file();
    (file, parser.collector.finish())
}

struct Parser {
    source_id: SourceId,
    tokens: Vec<Token>,
    docs: HashMap<usize, String>,
    pos: usize,
    collector: Collector,
}

impl Parser {
    fn new(source_id: SourceId, text: &str, issue_limit: usize) -> Self {
        let mut raw = Vec::new();
        let mut lexer = Lexer::new(source_id.clone(), text);
        loop {
            let tok = lexer.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            raw.push(tok);
            if is_eof {
                break;
            }
        }

        let mut tokens = Vec::with_capacity(raw.len());
        let mut docs = HashMap::new();
        let mut pending: Option<String> = None;
        for tok in raw {
            if tok.kind == TokenKind::DocComment {
                pending = Some(tok.lexeme);
                continue;
            }
            if let Some(doc) = pending.take() {
                docs.insert(tokens.len(), doc);
            }
            tokens.push(tok);
        }

        Self {
            source_id,
            tokens,
            docs,
            pos: 0,
            collector: Collector::new(issue_limit),
        }
    }

    // --- token cursor helpers ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn take_doc(&mut self) -> Option<String> {
        self.docs.remove(&self.pos)
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            let found = self.peek().clone();
            self.collector.collect(
                Issue::error(
                    Code::ESyntax,
                    format!("expected {kind}, found {}", found.kind),
                )
                .with_span(found.span.clone())
                .build(),
            );
            None
        }
    }

    /// Property names are context-sensitive: any lowercase keyword is also a
    /// valid property name in this position.
    fn expect_property_name(&mut self) -> Option<Token> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Identifier || tok.kind.is_keyword() {
            Some(self.bump())
        } else {
            self.collector.collect(
                Issue::error(Code::ESyntax, format!("expected property name, found {}", tok.kind))
                    .with_span(tok.span)
                    .build(),
            );
            None
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.peek().span.clone();
        self.collector
            .collect(Issue::error(Code::ESyntax, message).with_span(span).build());
    }

    /// Synchronizes to the start of the next top-level declaration after a
    /// parse error, so the rest of the file can still be parsed
    ///.
    fn synchronize_top_level(&mut self) {
        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Type) || self.at(TokenKind::Import) || self.at(TokenKind::Abstract) || self.at(TokenKind::Part) {
                return;
            }
            self.bump();
        }
    }

    fn synchronize_member(&mut self) {
        while !self.at(TokenKind::Eof) && !self.at(TokenKind::RightBrace) {
            if self.at(TokenKind::AssocArrow) || self.at(TokenKind::CompArrow) || self.at(TokenKind::Bang) {
                return;
            }
            if self.peek_kind() == TokenKind::Identifier || self.peek_kind().is_keyword() {
                // Could be the start of the next property; only stop here
                // if we're not already mid-consume.
                return;
            }
            self.bump();
        }
    }

    // --- top level ---

    fn parse_file(&mut self) -> Option<SchemaFile> {
        let start_span = self.peek().span.clone();
        let documentation = self.take_doc();
        self.expect(TokenKind::Schema)?;
        let name_tok = self.expect(TokenKind::StringLit)?;
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            match self.parse_top_level() {
                Some(item) => items.push(item),
                None => {
                    self.synchronize_top_level();
                }
            }
        }
        let end_span = self.tokens[self.pos].span.clone();
        Some(SchemaFile {
            name: name_tok.lexeme,
            documentation,
            items,
            span: start_span.merge(&end_span),
        })
    }

    fn parse_top_level(&mut self) -> Option<TopLevel> {
        if self.at(TokenKind::Import) {
            return self.parse_import().map(TopLevel::Import);
        }

        let doc = self.take_doc();
        let start_span = self.peek().span.clone();
        let mut modifier = TypeModifier::Concrete;
        let mut saw_modifier = false;
        loop {
            if self.at(TokenKind::Abstract) {
                self.bump();
                if saw_modifier {
                    self.error_here("a type may carry at most one of `abstract`/`part`");
                }
                modifier = TypeModifier::Abstract;
                saw_modifier = true;
            } else if self.at(TokenKind::Part) {
                self.bump();
                if saw_modifier {
                    self.error_here("a type may carry at most one of `abstract`/`part`");
                }
                modifier = TypeModifier::Part;
                saw_modifier = true;
            } else {
                break;
            }
        }

        self.expect(TokenKind::Type)?;
        let name_tok = self.expect(TokenKind::Identifier)?;
        self.validate_uppercase_name(&name_tok);

        if self.at(TokenKind::Equal) {
            if saw_modifier {
                self.error_here("a datatype alias may not carry `abstract`/`part`");
            }
            self.bump();
            let constraint = self.parse_constraint()?;
            let end_span = self.tokens[self.pos.saturating_sub(1)].span.clone();
            return Some(TopLevel::Alias(AliasDecl {
                name: name_tok.lexeme,
                constraint,
                span: start_span.merge(&end_span),
            }));
        }

        let mut extends = Vec::new();
        if self.at(TokenKind::Extends) {
            self.bump();
            extends.push(self.parse_type_ref()?);
            while self.at(TokenKind::Comma) {
                self.bump();
                extends.push(self.parse_type_ref()?);
            }
        }

        self.expect(TokenKind::LeftBrace)?;
        let mut members = Vec::new();
        while !self.at(TokenKind::RightBrace) && !self.at(TokenKind::Eof) {
            match self.parse_member() {
                Some(member) => members.push(member),
                None => self.synchronize_member(),
            }
        }
        let end_tok = self.expect(TokenKind::RightBrace);
        let end_span = end_tok.map(|t| t.span).unwrap_or_else(|| self.peek().span.clone());

        Some(TopLevel::Type(TypeDecl {
            name: name_tok.lexeme,
            modifier,
            extends,
            members,
            documentation: doc,
            span: start_span.merge(&end_span),
        }))
    }

    fn parse_import(&mut self) -> Option<ImportDecl> {
        let start = self.bump(); // 'import'
        let path_tok = self.expect(TokenKind::StringLit)?;
        let mut alias = None;
        if self.at(TokenKind::As) {
            self.bump();
            let alias_tok = self.expect(TokenKind::Identifier)?;
            alias = Some(alias_tok.lexeme);
        }
        let end_span = self.tokens[self.pos.saturating_sub(1)].span.clone();
        Some(ImportDecl {
            path: path_tok.lexeme,
            alias,
            span: start.span.merge(&end_span),
        })
    }

    fn validate_uppercase_name(&mut self, tok: &Token) {
        let bare = tok.lexeme.rsplit('.').next().unwrap_or(&tok.lexeme);
        if !bare.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            self.collector.collect(
                Issue::error(
                    Code::ESyntax,
                    format!("type name `{}` must start with an uppercase letter", tok.lexeme),
                )
                .with_span(tok.span.clone())
                .build(),
            );
        }
    }

    fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let tok = self.expect(TokenKind::Identifier)?;
        self.validate_uppercase_name(&tok);
        let (alias, name) = match tok.lexeme.rsplit_once('.') {
            Some((alias, name)) => (Some(alias.to_string()), name.to_string()),
            None => (None, tok.lexeme.clone()),
        };
        if let Some(alias) = &alias {
            if !alias.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                self.collector.collect(
                    Issue::error(Code::ESyntax, format!("invalid import alias `{alias}`"))
                        .with_span(tok.span.clone())
                        .build(),
                );
            }
        }
        Some(TypeRef {
            alias,
            name,
            span: tok.span,
        })
    }

    // --- type members ---

    fn parse_member(&mut self) -> Option<Member> {
        if self.at(TokenKind::AssocArrow) || self.at(TokenKind::CompArrow) {
            return self.parse_relation().map(Member::Relation);
        }
        if self.at(TokenKind::Bang) {
            return self.parse_invariant().map(Member::Invariant);
        }
        self.parse_property().map(Member::Property)
    }

    fn parse_property(&mut self) -> Option<PropertyDecl> {
        let doc = self.take_doc();
        let start_span = self.peek().span.clone();
        let name_tok = self.expect_property_name()?;
        let constraint = self.parse_constraint()?;
        let mut flags = PropertyFlags::default();
        loop {
            if self.at(TokenKind::Required) {
                self.bump();
                flags.required = true;
            } else if self.at(TokenKind::Primary) {
                self.bump();
                flags.primary = true;
                flags.required = true; // is_primary => is_required 
            } else {
                break;
            }
        }
        let end_span = self.tokens[self.pos.saturating_sub(1)].span.clone();
        Some(PropertyDecl {
            name: name_tok.lexeme,
            constraint,
            flags,
            documentation: doc,
            span: start_span.merge(&end_span),
        })
    }

    fn parse_relation(&mut self) -> Option<RelationDecl> {
        let doc = self.take_doc();
        let start = self.bump(); // '-->' or '==>'
        let kind = if start.kind == TokenKind::AssocArrow {
            RelationKind::Association
        } else {
            RelationKind::Composition
        };
        let name_tok = self.expect(TokenKind::Identifier)?;
        let multiplicity = self.parse_multiplicity_opt();
        let target = self.parse_type_ref()?;

        let mut reverse = None;
        if kind == RelationKind::Association && self.at(TokenKind::Reverse) {
            self.bump();
            let rev_tok = self.expect(TokenKind::Identifier)?;
            reverse = Some(rev_tok.lexeme);
        }

        let mut properties = Vec::new();
        if self.at(TokenKind::LeftBrace) {
            self.bump();
            while !self.at(TokenKind::RightBrace) && !self.at(TokenKind::Eof) {
                match self.parse_property() {
                    Some(p) => properties.push(p),
                    None => self.synchronize_member(),
                }
            }
            self.expect(TokenKind::RightBrace);
        }

        let end_span = self.tokens[self.pos.saturating_sub(1)].span.clone();
        Some(RelationDecl {
            name: name_tok.lexeme,
            kind,
            multiplicity,
            target,
            reverse,
            properties,
            documentation: doc,
            span: start.span.merge(&end_span),
        })
    }

    /// `Multiplicity := "(" ("_"|"one"|"many") (":" ("one"|"many"))? ")"`.
    /// Absent entirely, the default is optional/not-many.
    fn parse_multiplicity_opt(&mut self) -> Multiplicity {
        if !self.at(TokenKind::LeftParen) {
            return Multiplicity::default();
        }
        self.bump();
        let first = self.bump();
        let first_word = match first.kind {
            TokenKind::Underscore => "_",
            TokenKind::Identifier => first.lexeme.as_str(),
            _ => {
                self.error_here("expected `_`, `one`, or `many` in multiplicity");
                "_"
            }
        };
        let mut second: Option<String> = None;
        if self.at(TokenKind::Colon) {
            self.bump();
            let tok = self.bump();
            second = Some(tok.lexeme);
        }
        self.expect(TokenKind::RightParen);

        // Multiplicity sugar: (_|one:one|one:many|many) -> (optional, many).
        match (first_word, second.as_deref()) {
            ("_", None) | ("_", Some("one")) => Multiplicity { optional: true, many: false },
            ("_", Some("many")) => Multiplicity { optional: true, many: true },
            ("one", None) | ("one", Some("one")) => Multiplicity { optional: false, many: false },
            ("one", Some("many")) => Multiplicity { optional: false, many: true },
            ("many", _) => Multiplicity { optional: true, many: true },
            _ => {
                self.error_here("invalid multiplicity sugar");
                Multiplicity::default()
            }
        }
    }

    fn parse_invariant(&mut self) -> Option<InvariantDecl> {
        let start = self.bump(); // '!'
        let name_tok = self.expect(TokenKind::StringLit)?;
        let body = self.parse_expr()?;
        let end_span = body.span().clone();
        Some(InvariantDecl {
            name: name_tok.lexeme,
            body,
            span: start.span.merge(&end_span),
        })
    }

    // --- constraints ---

    fn parse_constraint(&mut self) -> Option<ConstraintExpr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer => {
                self.bump();
                let (min, max) = self.parse_bounds_i64();
                Some(ConstraintExpr::Integer { min, max })
            }
            TokenKind::Float => {
                self.bump();
                let (min, max) = self.parse_bounds_f64();
                Some(ConstraintExpr::Float { min, max })
            }
            TokenKind::Boolean => {
                self.bump();
                Some(ConstraintExpr::Boolean)
            }
            TokenKind::StringType => {
                self.bump();
                let (min, max) = self.parse_bounds_u32();
                Some(ConstraintExpr::String {
                    min_runes: min,
                    max_runes: max,
                })
            }
            TokenKind::Enum => {
                self.bump();
                self.expect(TokenKind::LeftBracket)?;
                let mut options = Vec::new();
                loop {
                    let s = self.expect(TokenKind::StringLit)?;
                    options.push(s.lexeme);
                    if self.at(TokenKind::Comma) {
                        self.bump();
                        if self.at(TokenKind::RightBracket) {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RightBracket);
                if options.len() < 2 {
                    self.error_here("Enum requires at least 2 options");
                }
                Some(ConstraintExpr::Enum { options })
            }
            TokenKind::Pattern => {
                self.bump();
                self.expect(TokenKind::LeftBracket)?;
                let first = self.expect(TokenKind::StringLit)?.lexeme;
                let mut second = None;
                if self.at(TokenKind::Comma) {
                    self.bump();
                    if !self.at(TokenKind::RightBracket) {
                        second = Some(self.expect(TokenKind::StringLit)?.lexeme);
                    }
                }
                self.expect(TokenKind::RightBracket);
                Some(ConstraintExpr::Pattern { first, second })
            }
            TokenKind::Timestamp => {
                self.bump();
                Some(ConstraintExpr::Timestamp)
            }
            TokenKind::Date => {
                self.bump();
                Some(ConstraintExpr::Date)
            }
            TokenKind::Uuid => {
                self.bump();
                Some(ConstraintExpr::Uuid)
            }
            TokenKind::Vector => {
                self.bump();
                self.expect(TokenKind::LeftBracket)?;
                let dim_tok = self.expect(TokenKind::IntLit)?;
                self.expect(TokenKind::RightBracket);
                let dim = dim_tok.lexeme.parse().unwrap_or(0);
                Some(ConstraintExpr::Vector { dim })
            }
            TokenKind::List => {
                self.bump();
                self.expect(TokenKind::LeftAngle)?;
                let element = self.parse_constraint()?;
                self.expect(TokenKind::RightAngle);
                let (min_len, max_len) = self.parse_bounds_u32();
                Some(ConstraintExpr::List {
                    element: Box::new(element),
                    min_len,
                    max_len,
                })
            }
            TokenKind::Identifier => {
                let type_ref = self.parse_type_ref()?;
                Some(ConstraintExpr::AliasRef(type_ref))
            }
            _ => {
                self.error_here(format!("expected a constraint, found {}", tok.kind));
                None
            }
        }
    }

    fn parse_bound_end_i64(&mut self) -> Option<i64> {
        if self.at(TokenKind::Underscore) {
            self.bump();
            return None;
        }
        let neg = if self.at(TokenKind::Minus) {
            self.bump();
            true
        } else {
            false
        };
        let tok = self.expect(TokenKind::IntLit);
        let v: i64 = tok.map(|t| t.lexeme.parse().unwrap_or(0)).unwrap_or(0);
        Some(if neg { -v } else { v })
    }

    fn parse_bound_end_f64(&mut self) -> Option<f64> {
        if self.at(TokenKind::Underscore) {
            self.bump();
            return None;
        }
        let neg = if self.at(TokenKind::Minus) {
            self.bump();
            true
        } else {
            false
        };
        let v: f64 = match self.peek_kind() {
            TokenKind::FloatLit | TokenKind::IntLit => self.bump().lexeme.parse().unwrap_or(0.0),
            _ => {
                self.error_here("expected a numeric bound");
                0.0
            }
        };
        Some(if neg { -v } else { v })
    }

    fn parse_bound_end_u32(&mut self) -> Option<u32> {
        if self.at(TokenKind::Underscore) {
            self.bump();
            return None;
        }
        let tok = self.expect(TokenKind::IntLit);
        Some(tok.map(|t| t.lexeme.parse().unwrap_or(0)).unwrap_or(0))
    }

    fn parse_bounds_i64(&mut self) -> (Option<i64>, Option<i64>) {
        if !self.at(TokenKind::LeftBracket) {
            return (None, None);
        }
        self.bump();
        let min = self.parse_bound_end_i64();
        self.expect(TokenKind::Comma);
        let max = self.parse_bound_end_i64();
        self.expect(TokenKind::RightBracket);
        if let (Some(a), Some(b)) = (min, max) {
            if a > b {
                self.error_here(format!("invalid bounds [{a}, {b}]: min exceeds max"));
            }
        }
        (min, max)
    }

    fn parse_bounds_f64(&mut self) -> (Option<f64>, Option<f64>) {
        if !self.at(TokenKind::LeftBracket) {
            return (None, None);
        }
        self.bump();
        let min = self.parse_bound_end_f64();
        self.expect(TokenKind::Comma);
        let max = self.parse_bound_end_f64();
        self.expect(TokenKind::RightBracket);
        if let (Some(a), Some(b)) = (min, max) {
            if a > b {
                self.error_here(format!("invalid bounds [{a}, {b}]: min exceeds max"));
            }
        }
        (min, max)
    }

    fn parse_bounds_u32(&mut self) -> (Option<u32>, Option<u32>) {
        if !self.at(TokenKind::LeftBracket) {
            return (None, None);
        }
        self.bump();
        let min = self.parse_bound_end_u32();
        self.expect(TokenKind::Comma);
        let max = self.parse_bound_end_u32();
        self.expect(TokenKind::RightBracket);
        if let (Some(a), Some(b)) = (min, max) {
            if a > b {
                self.error_here(format!("invalid bounds [{a}, {b}]: min exceeds max"));
            }
        }
        (min, max)
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Option<Expr> {
        let cond = self.parse_or()?;
        if self.at(TokenKind::Question) {
            self.bump();
            self.expect(TokenKind::LeftBrace)?;
            let then_e = self.parse_expr()?;
            self.expect(TokenKind::Colon)?;
            let else_e = self.parse_expr()?;
            let end = self.expect(TokenKind::RightBrace);
            let span = cond.span().merge(
                &end.map(|t| t.span).unwrap_or_else(|| else_e.span().clone()),
            );
            return Some(Expr::Ternary(Box::new(cond), Box::new(then_e), Box::new(else_e), span));
        }
        Some(cond)
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_xor()?;
        while self.at(TokenKind::OrOr) {
            self.bump();
            let rhs = self.parse_xor()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_xor(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::Caret) {
            self.bump();
            let rhs = self.parse_and()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(BinOp::Xor, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at(TokenKind::AndAnd) {
            self.bump();
            let rhs = self.parse_equality()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_match()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::LeftAngle => BinOp::Lt,
                TokenKind::RightAngle => BinOp::Gt,
                TokenKind::LtEq => BinOp::Le,
                TokenKind::GtEq => BinOp::Ge,
                TokenKind::In => BinOp::In,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_match()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    /// `e =~ rhs` / `e !~ rhs`, where `rhs` is a regex literal or a datatype
    /// keyword.
    fn parse_match(&mut self) -> Option<Expr> {
        let lhs = self.parse_additive()?;
        let negated = match self.peek_kind() {
            TokenKind::MatchOp => false,
            TokenKind::NotMatchOp => true,
            _ => return Some(lhs),
        };
        self.bump();
        let rhs_tok = self.peek().clone();
        let rhs = if let Some(kw) = datatype_keyword_of(rhs_tok.kind) {
            self.bump();
            MatchRhs::Datatype(kw)
        } else {
            let regex_expr = self.parse_additive()?;
            MatchRhs::Regex(Box::new(regex_expr))
        };
        let rhs_span = match &rhs {
            MatchRhs::Regex(e) => e.span().clone(),
            MatchRhs::Datatype(_) => rhs_tok.span,
        };
        let span = lhs.span().merge(&rhs_span);
        Some(Expr::Match {
            subject: Box::new(lhs),
            rhs,
            negated,
            span,
        })
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.bump();
            let operand = self.parse_unary()?;
            let span = start.span.merge(operand.span());
            return Some(Expr::Unary(op, Box::new(operand), span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.bump();
                    let field_tok = self.expect_property_name()?;
                    let span = expr.span().merge(&field_tok.span);
                    expr = Expr::Member(Box::new(expr), field_tok.lexeme, span);
                }
                TokenKind::LeftBracket => {
                    self.bump();
                    let first = self.parse_expr()?;
                    if self.at(TokenKind::Comma) {
                        self.bump();
                        let second = self.parse_expr()?;
                        let end = self.expect(TokenKind::RightBracket);
                        let span = expr
                            .span()
                            .merge(&end.map(|t| t.span).unwrap_or_else(|| second.span().clone()));
                        expr = Expr::Slice(Box::new(expr), Box::new(first), Box::new(second), span);
                    } else {
                        let end = self.expect(TokenKind::RightBracket);
                        let span = expr
                            .span()
                            .merge(&end.map(|t| t.span).unwrap_or_else(|| first.span().clone()));
                        expr = Expr::Index(Box::new(expr), Box::new(first), span);
                    }
                }
                TokenKind::ThinArrow => {
                    self.bump();
                    let name_tok = self.expect(TokenKind::Identifier)?;
                    let mut args = Vec::new();
                    if self.at(TokenKind::LeftParen) {
                        self.bump();
                        if !self.at(TokenKind::RightParen) {
                            args.push(self.parse_expr()?);
                            while self.at(TokenKind::Comma) {
                                self.bump();
                                args.push(self.parse_expr()?);
                            }
                        }
                        self.expect(TokenKind::RightParen);
                    }
                    let lambda = if self.at(TokenKind::Bar) {
                        Some(self.parse_lambda()?)
                    } else {
                        None
                    };
                    let end_span = lambda
                        .as_ref()
                        .map(|l| l.span.clone())
                        .unwrap_or_else(|| name_tok.span.clone());
                    let span = expr.span().merge(&end_span);
                    expr = Expr::Pipeline(PipelineCall {
                        receiver: Box::new(expr),
                        function: name_tok.lexeme,
                        args,
                        lambda,
                        span,
                    });
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_lambda(&mut self) -> Option<Lambda> {
        let start = self.expect(TokenKind::Bar)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::Bar) {
            self.expect(TokenKind::Dollar)?;
            params.push(self.expect(TokenKind::Identifier)?.lexeme);
            while self.at(TokenKind::Comma) {
                self.bump();
                self.expect(TokenKind::Dollar)?;
                params.push(self.expect(TokenKind::Identifier)?.lexeme);
            }
        }
        self.expect(TokenKind::Bar)?;
        self.expect(TokenKind::LeftBrace)?;
        let body = self.parse_expr()?;
        let end = self.expect(TokenKind::RightBrace);
        let span = start
            .span
            .merge(&end.map(|t| t.span).unwrap_or_else(|| body.span().clone()));
        Some(Lambda {
            params,
            body: Box::new(body),
            span,
        })
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLit => {
                self.bump();
                let v: i64 = tok.lexeme.parse().unwrap_or(0);
                Some(Expr::Literal(Literal::Int(v), tok.span))
            }
            TokenKind::FloatLit => {
                self.bump();
                let v: f64 = tok.lexeme.parse().unwrap_or(0.0);
                Some(Expr::Literal(Literal::Float(v), tok.span))
            }
            TokenKind::True => {
                self.bump();
                Some(Expr::Literal(Literal::Bool(true), tok.span))
            }
            TokenKind::False => {
                self.bump();
                Some(Expr::Literal(Literal::Bool(false), tok.span))
            }
            TokenKind::Nil | TokenKind::Underscore => {
                self.bump();
                Some(Expr::Literal(Literal::Nil, tok.span))
            }
            TokenKind::StringLit => {
                self.bump();
                Some(Expr::Literal(Literal::Str(tok.lexeme), tok.span))
            }
            TokenKind::RegexLit => {
                self.bump();
                let (pattern, flags) = split_regex_lexeme(&tok.lexeme);
                Some(Expr::Literal(Literal::Regex { pattern, flags }, tok.span))
            }
            TokenKind::Dollar => {
                self.bump();
                let name_tok = self.expect(TokenKind::Identifier)?;
                let span = tok.span.merge(&name_tok.span);
                Some(Expr::Var(name_tok.lexeme, span))
            }
            TokenKind::Identifier => {
                self.bump();
                Some(Expr::Var(tok.lexeme, tok.span))
            }
            TokenKind::LeftParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RightParen);
                Some(inner)
            }
            TokenKind::LeftBracket => {
                self.bump();
                let mut elements = Vec::new();
                if !self.at(TokenKind::RightBracket) {
                    elements.push(self.parse_expr()?);
                    while self.at(TokenKind::Comma) {
                        self.bump();
                        if self.at(TokenKind::RightBracket) {
                            break;
                        }
                        elements.push(self.parse_expr()?);
                    }
                }
                let end = self.expect(TokenKind::RightBracket);
                let span = tok.span.merge(&end.map(|t| t.span).unwrap_or(tok.span.clone()));
                Some(Expr::Literal(Literal::List(elements), span))
            }
            TokenKind::Bar => {
                let lambda = self.parse_lambda()?;
                let span = lambda.span.clone();
                Some(Expr::LambdaLit(Lambda { span, ..lambda }))
            }
            _ => {
                self.error_here(format!("unexpected token {} in expression", tok.kind));
                None
            }
        }
    }
}

fn datatype_keyword_of(kind: TokenKind) -> Option<DatatypeKeyword> {
    Some(match kind {
        TokenKind::Integer => DatatypeKeyword::Integer,
        TokenKind::Float => DatatypeKeyword::Float,
        TokenKind::Boolean => DatatypeKeyword::Boolean,
        TokenKind::StringType => DatatypeKeyword::String,
        TokenKind::Timestamp => DatatypeKeyword::Timestamp,
        TokenKind::Date => DatatypeKeyword::Date,
        TokenKind::Uuid => DatatypeKeyword::Uuid,
        TokenKind::List => DatatypeKeyword::List,
        _ => return None,
    })
}

fn split_regex_lexeme(lexeme: &str) -> (String, String) {
    // lexeme is always `/pattern/flags` as produced by the lexer.
    let rest = &lexeme[1..];
    match rest.rfind('/') {
        Some(idx) => (rest[..idx].to_string(), rest[idx + 1..].to_string()),
        None => (rest.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> SchemaFile {
        let (file, result) = parse(SourceId::new("<test>"), src, 0);
        assert!(result.ok(), "expected no errors, got: {result}");
        file.expect("expected a parsed file")
    }

    #[test]
    fn minimal_schema() {
        let file = parse_ok(r#"schema "S" type Item { id String primary name String required }"#);
        assert_eq!(file.name, "S");
        assert_eq!(file.items.len(), 1);
        let TopLevel::Type(t) = &file.items[0] else {
            panic!("expected a type decl");
        };
        assert_eq!(t.name, "Item");
        assert_eq!(t.members.len(), 2);
    }

    #[test]
    fn abstract_and_extends() {
        let file = parse_ok(
            r#"schema "S"
               abstract type Base { id String primary }
               type Child extends Base { name String }"#,
        );
        assert_eq!(file.items.len(), 2);
        let TopLevel::Type(base) = &file.items[0] else { panic!() };
        assert_eq!(base.modifier, TypeModifier::Abstract);
        let TopLevel::Type(child) = &file.items[1] else { panic!() };
        assert_eq!(child.extends.len(), 1);
        assert_eq!(child.extends[0].name, "Base");
    }

    #[test]
    fn datatype_alias_declaration() {
        let file = parse_ok(r#"schema "S" type Age = Integer[0, 150]"#);
        let TopLevel::Alias(a) = &file.items[0] else { panic!() };
        assert_eq!(a.name, "Age");
        assert!(matches!(a.constraint, ConstraintExpr::Integer { .. }));
    }

    #[test]
    fn import_with_alias() {
        let file = parse_ok(r#"schema "S" import "geo/place" as geo"#);
        let TopLevel::Import(i) = &file.items[0] else { panic!() };
        assert_eq!(i.path, "geo/place");
        assert_eq!(i.alias.as_deref(), Some("geo"));
    }

    #[test]
    fn association_with_multiplicity_and_reverse() {
        let file = parse_ok(
            r#"schema "S" type Person { id String primary --> WORKS_AT (one) Company reverse EMPLOYS }"#,
        );
        let TopLevel::Type(t) = &file.items[0] else { panic!() };
        let Member::Relation(r) = &t.members[1] else { panic!() };
        assert_eq!(r.name, "WORKS_AT");
        assert!(!r.multiplicity.optional);
        assert!(!r.multiplicity.many);
        assert_eq!(r.reverse.as_deref(), Some("EMPLOYS"));
    }

    #[test]
    fn composition_and_part_modifier() {
        let file = parse_ok(
            r#"schema "S"
               part type Line { sku String primary }
               type Order { id String primary ==> LINES (many) Line }"#,
        );
        let TopLevel::Type(order) = &file.items[1] else { panic!() };
        let Member::Relation(r) = &order.members[1] else { panic!() };
        assert_eq!(r.kind, RelationKind::Composition);
        assert!(r.multiplicity.many);
    }

    #[test]
    fn invariant_pipeline_and_lambda() {
        let file = parse_ok(
            r#"schema "S" type Item { tags List<String> ! "all_non_empty" tags -> All |$t| { $t -> Len > 0 } }"#,
        );
        let TopLevel::Type(t) = &file.items[0] else { panic!() };
        let Member::Invariant(inv) = &t.members[1] else { panic!() };
        assert_eq!(inv.name, "all_non_empty");
        assert!(matches!(inv.body, Expr::Pipeline(_)));
    }

    #[test]
    fn ternary_expression() {
        let file = parse_ok(
            r#"schema "S" type Item { x Integer ! "n" x > 0 ? { true : false } }"#,
        );
        let TopLevel::Type(t) = &file.items[0] else { panic!() };
        let Member::Invariant(inv) = &t.members[1] else { panic!() };
        assert!(matches!(inv.body, Expr::Ternary(..)));
    }

    #[test]
    fn match_against_regex_and_datatype_keyword() {
        let file = parse_ok(
            r#"schema "S" type Item { code String ! "a" code =~ /^[A-Z]+$/ ! "b" code !~ Integer }"#,
        );
        let TopLevel::Type(t) = &file.items[0] else { panic!() };
        let Member::Invariant(a) = &t.members[1] else { panic!() };
        assert!(matches!(&a.body, Expr::Match { rhs: MatchRhs::Regex(_), negated: false, .. }));
        let Member::Invariant(b) = &t.members[2] else { panic!() };
        assert!(matches!(&b.body, Expr::Match { rhs: MatchRhs::Datatype(DatatypeKeyword::Integer), negated: true, .. }));
    }

    #[test]
    fn syntax_error_recovers_to_next_type() {
        let (file, result) = parse(
            SourceId::new("<test>"),
            r#"schema "S" type Bad { !!! } type Good { id String primary }"#,
            0,
        );
        assert!(!result.ok());
        let file = file.expect("recovery should still yield a file");
        assert_eq!(file.items.len(), 2);
        let TopLevel::Type(good) = &file.items[1] else { panic!() };
        assert_eq!(good.name, "Good");
    }

    #[test]
    fn vector_and_list_constraints() {
        let file = parse_ok(
            r#"schema "S" type V { emb Vector[768] tags List<String>[0, 10] }"#,
        );
        let TopLevel::Type(t) = &file.items[0] else { panic!() };
        let Member::Property(emb) = &t.members[0] else { panic!() };
        assert!(matches!(emb.constraint, ConstraintExpr::Vector { dim: 768 }));
        let Member::Property(tags) = &t.members[1] else { panic!() };
        assert!(matches!(tags.constraint, ConstraintExpr::List { .. }));
    }

    #[test]
    fn inverted_bounds_is_invalid_constraint() {
        let (_, result) = parse(SourceId::new("<test>"), r#"schema "S" type T { x Integer[5, 1] }"#, 0);
        assert!(!result.ok());
    }

    #[test]
    fn keyword_as_property_name() {
        let file = parse_ok(r#"schema "S" type T { as String }"#);
        let TopLevel::Type(t) = &file.items[0] else { panic!() };
        let Member::Property(p) = &t.members[0] else { panic!() };
        assert_eq!(p.name, "as");
    }
}
