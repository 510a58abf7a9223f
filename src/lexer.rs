//! Lexical analysis for the schema definition language.
//!
//! Produces a stream of [`Token`]s from SDL source text: keywords,
//! identifiers (including dotted qualified names), literals, regex
//! literals, doc comments, and punctuation.
//!
//! # Example
//!
//! ```rust
//! use schemac::lexer::{Lexer, TokenKind};
//! use schemac::source::SourceId;
//!
//! let mut lexer = Lexer::new(SourceId::new("<test>"), "type Item { }");
//! assert_eq!(lexer.next_token().kind, TokenKind::Type);
//! assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
//! assert_eq!(lexer.next_token().kind, TokenKind::LeftBrace);
//! assert_eq!(lexer.next_token().kind, TokenKind::RightBrace);
//! ```

use crate::source::{Position, SourceId, Span};

/// A lexical token: its kind, the original source text, and its span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The category of this token.
    pub kind: TokenKind,
    /// The original source text that produced this token.
    pub lexeme: String,
    /// Source location.
    pub span: Span,
}

impl Token {
    /// Builds a new token.
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }
}

/// The category of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // --- keywords ---
    Schema,
    Type,
    Abstract,
    Part,
    Extends,
    Required,
    Primary,
    Import,
    As,
    Reverse,
    Nil,
    True,
    False,
    In,

    // --- built-in datatype keywords ---
    Integer,
    Float,
    Boolean,
    StringType,
    Enum,
    Pattern,
    Timestamp,
    Date,
    Uuid,
    Vector,
    List,

    // --- literals ---
    /// A bare or dotted identifier, e.g. `name` or `geo.Place`.
    Identifier,
    IntLit,
    FloatLit,
    StringLit,
    RegexLit,
    /// A doc-comment block immediately preceding a declaration.
    DocComment,

    // --- punctuation / operators ---
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    LeftAngle,
    RightAngle,
    Comma,
    Colon,
    Dot,
    Equal,
    Bang,
    Question,
    Dollar,
    Underscore,
    Bar,
    Pipe,   // `->` pipeline read as "Arrow" used for both -> and pipeline contexts below
    ThinArrow,  // `->`
    AssocArrow, // `-->`
    CompArrow,  // `==>`
    AndAnd,
    OrOr,
    Caret,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    MatchOp,    // `=~`
    NotMatchOp, // `!~`
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // --- special ---
    Eof,
    Error,
}

impl TokenKind {
    /// True if this kind is a reserved keyword (cannot be used as an
    /// identifier, except property-name position where it is
    /// context-sensitively re-read as an identifier by the parser).
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Schema
                | Type
                | Abstract
                | Part
                | Extends
                | Required
                | Primary
                | Import
                | As
                | Reverse
                | Nil
                | True
                | False
                | In
        )
    }

    /// True if this kind is a reserved built-in datatype keyword. Reserved
    /// datatype keywords may never be used as type names.
    pub fn is_datatype_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Integer | Float | Boolean | StringType | Enum | Pattern | Timestamp | Date | Uuid
                | Vector | List
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use TokenKind::*;
        let s = match self {
            Schema => "schema",
            Type => "type",
            Abstract => "abstract",
            Part => "part",
            Extends => "extends",
            Required => "required",
            Primary => "primary",
            Import => "import",
            As => "as",
            Reverse => "reverse",
            Nil => "nil",
            True => "true",
            False => "false",
            In => "in",
            Integer => "Integer",
            Float => "Float",
            Boolean => "Boolean",
            StringType => "String",
            Enum => "Enum",
            Pattern => "Pattern",
            Timestamp => "Timestamp",
            Date => "Date",
            Uuid => "UUID",
            Vector => "Vector",
            List => "List",
            Identifier => "identifier",
            IntLit => "integer literal",
            FloatLit => "float literal",
            StringLit => "string literal",
            RegexLit => "regex literal",
            DocComment => "doc comment",
            LeftBrace => "{",
            RightBrace => "}",
            LeftBracket => "[",
            RightBracket => "]",
            LeftParen => "(",
            RightParen => ")",
            LeftAngle => "<",
            RightAngle => ">",
            Comma => ",",
            Colon => ":",
            Dot => ".",
            Equal => "=",
            Bang => "!",
            Question => "?",
            Dollar => "$",
            Underscore => "_",
            Bar => "|",
            Pipe => "|",
            ThinArrow => "->",
            AssocArrow => "-->",
            CompArrow => "==>",
            AndAnd => "&&",
            OrOr => "||",
            Caret => "^",
            EqEq => "==",
            NotEq => "!=",
            LtEq => "<=",
            GtEq => ">=",
            MatchOp => "=~",
            NotMatchOp => "!~",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Eof => "end of file",
            Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Tokenizes SDL source text, one token at a time.
pub struct Lexer<'a> {
    source_id: SourceId,
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// The previous significant token kind, used to disambiguate `/` as
    /// division versus the start of a regex literal.
    prev_significant: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for `source`, attributed to `source_id`.
    pub fn new(source_id: SourceId, source: &'a str) -> Self {
        Self {
            source_id,
            source,
            bytes: source.as_bytes(),
            pos: 0,
            prev_significant: None,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn span_from(&self, start: usize) -> Span {
        let start_pos = self.position_at(start);
        let end_pos = self.position_at(self.pos);
        Span::new(self.source_id.clone(), start_pos, end_pos)
    }

    /// Computes a line/column position by scanning from the start of the
    /// source. The lexer only does this at token boundaries, so the total
    /// work remains linear in source length across a full tokenization.
    fn position_at(&self, byte: usize) -> Position {
        let mut line = 1u32;
        let mut col = 1u32;
        for &b in &self.bytes[..byte] {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Position {
            line,
            column: col,
            byte: byte as u32,
        }
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.rest().starts_with(pat)
    }

    /// Skips whitespace and `//` line comments, returning any doc-comment
    /// text encountered (a `/** ... */` or `/// ...` style block that
    /// directly precedes the next token, with no blank line in between).
    fn skip_trivia(&mut self) -> Option<(String, Span)> {
        let mut doc: Option<(String, Span)> = None;
        loop {
            while let Some(b) = self.peek_byte() {
                if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.starts_with("///") {
                let start = self.pos;
                self.pos += 3;
                let text_start = self.pos;
                while let Some(b) = self.peek_byte() {
                    if b == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                let text = self.source[text_start..self.pos].trim().to_string();
                let span = self.span_from(start);
                doc = Some(match doc {
                    Some((mut acc, s)) => {
                        acc.push('\n');
                        acc.push_str(&text);
                        (acc, s.merge(&span))
                    }
                    None => (text, span),
                });
                continue;
            }
            if self.starts_with("//") {
                while let Some(b) = self.peek_byte() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
                continue;
            }
            if self.starts_with("/*") {
                let start = self.pos;
                self.pos += 2;
                let is_doc = self.starts_with("*") && !self.starts_with("*/");
                let text_start = self.pos;
                while self.pos < self.bytes.len() && !self.starts_with("*/") {
                    self.pos += 1;
                }
                let text_end = self.pos;
                if self.starts_with("*/") {
                    self.pos += 2;
                } else {
                    // Unterminated block comment: treat remainder as consumed.
                }
                if is_doc {
                    let text = self.source[text_start..text_end].trim().to_string();
                    let span = self.span_from(start);
                    doc = Some((text, span));
                }
                continue;
            }
            break;
        }
        doc
    }

    /// Produces the next token, skipping trivia first. Doc comments are
    /// returned as `DocComment` tokens so the parser can attach them to the
    /// following declaration; all other trivia is invisible.
    pub fn next_token(&mut self) -> Token {
        if let Some((text, span)) = self.skip_trivia() {
            self.prev_significant = Some(TokenKind::DocComment);
            return Token::new(TokenKind::DocComment, text, span);
        }

        let start = self.pos;
        if self.pos >= self.bytes.len() {
            let tok = Token::new(TokenKind::Eof, "", self.span_from(start));
            return tok;
        }

        let tok = self
            .try_string()
            .or_else(|| self.try_regex())
            .or_else(|| self.try_number())
            .or_else(|| self.try_identifier())
            .or_else(|| self.try_operator())
            .unwrap_or_else(|| self.error_token(start));

        self.prev_significant = Some(tok.kind);
        tok
    }

    fn error_token(&mut self, start: usize) -> Token {
        let ch = self.rest().chars().next().unwrap_or('\u{0}');
        self.pos += ch.len_utf8();
        Token::new(TokenKind::Error, ch.to_string(), self.span_from(start))
    }

    fn try_string(&mut self) -> Option<Token> {
        if self.peek_byte() != Some(b'"') {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        let mut content = String::new();
        loop {
            match self.peek_byte() {
                None | Some(b'\n') => {
                    // Unterminated string: stop at EOF/newline, emit what we have.
                    break;
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek_byte() {
                        Some(b'n') => {
                            content.push('\n');
                            self.pos += 1;
                        }
                        Some(b't') => {
                            content.push('\t');
                            self.pos += 1;
                        }
                        Some(b'r') => {
                            content.push('\r');
                            self.pos += 1;
                        }
                        Some(b'"') => {
                            content.push('"');
                            self.pos += 1;
                        }
                        Some(b'\\') => {
                            content.push('\\');
                            self.pos += 1;
                        }
                        Some(_) => {
                            let ch = self.rest().chars().next().unwrap();
                            content.push(ch);
                            self.pos += ch.len_utf8();
                        }
                        None => break,
                    }
                }
                Some(_) => {
                    let ch = self.rest().chars().next().unwrap();
                    content.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Some(Token::new(TokenKind::StringLit, content, self.span_from(start)))
    }

    /// A `/` begins a regex literal only when the previous significant
    /// token could not have ended an expression (matching the common
    /// "regex vs. division" disambiguation used by slash-heavy grammars).
    fn regex_allowed_here(&self) -> bool {
        use TokenKind::*;
        !matches!(
            self.prev_significant,
            Some(Identifier)
                | Some(IntLit)
                | Some(FloatLit)
                | Some(StringLit)
                | Some(RegexLit)
                | Some(RightParen)
                | Some(RightBracket)
                | Some(RightBrace)
                | Some(True)
                | Some(False)
                | Some(Nil)
        )
    }

    fn try_regex(&mut self) -> Option<Token> {
        if self.peek_byte() != Some(b'/') || !self.regex_allowed_here() {
            return None;
        }
        if self.starts_with("//") || self.starts_with("/*") {
            return None;
        }
        let start = self.pos;
        self.pos += 1;
        let mut pattern = String::new();
        loop {
            match self.peek_byte() {
                None | Some(b'\n') => {
                    // Not actually a regex literal (unterminated); backtrack.
                    self.pos = start;
                    return None;
                }
                Some(b'/') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    pattern.push('\\');
                    self.pos += 1;
                    if let Some(b) = self.peek_byte() {
                        pattern.push(b as char);
                        self.pos += 1;
                    }
                }
                Some(_) => {
                    let ch = self.rest().chars().next().unwrap();
                    pattern.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        let mut flags = String::new();
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphabetic() {
                flags.push(b as char);
                self.pos += 1;
            } else {
                break;
            }
        }
        let lexeme = format!("/{pattern}/{flags}");
        Some(Token::new(TokenKind::RegexLit, lexeme, self.span_from(start)))
    }

    fn try_number(&mut self) -> Option<Token> {
        let b = self.peek_byte()?;
        if !b.is_ascii_digit() {
            return None;
        }
        let start = self.pos;
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek_byte() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            if self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let lexeme = self.source[start..self.pos].to_string();
        let kind = if is_float {
            TokenKind::FloatLit
        } else {
            TokenKind::IntLit
        };
        Some(Token::new(kind, lexeme, self.span_from(start)))
    }

    fn try_identifier(&mut self) -> Option<Token> {
        let b = self.peek_byte()?;
        if !(b.is_ascii_alphabetic() || b == b'_') {
            return None;
        }
        let start = self.pos;
        // Lone underscore not followed by an identifier char is `_`.
        if b == b'_' {
            let next_is_ident = self
                .peek_at(1)
                .is_some_and(|n| n.is_ascii_alphanumeric() || n == b'_');
            if !next_is_ident {
                self.pos += 1;
                return Some(Token::new(
                    TokenKind::Underscore,
                    "_",
                    self.span_from(start),
                ));
            }
        }
        let mut end = self.pos;
        while let Some(b) = self.bytes.get(end) {
            if b.is_ascii_alphanumeric() || *b == b'_' {
                end += 1;
            } else if *b == b'.' {
                // Only consume the dot if it continues a qualified name
                // (i.e. is followed by another identifier character).
                if self
                    .bytes
                    .get(end + 1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || *n == b'_')
                {
                    end += 1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        self.pos = end;
        let lexeme = self.source[start..end].to_string();
        let kind = self.keyword_kind(&lexeme).unwrap_or(TokenKind::Identifier);
        Some(Token::new(kind, lexeme, self.span_from(start)))
    }

    fn keyword_kind(&self, lexeme: &str) -> Option<TokenKind> {
        use TokenKind::*;
        Some(match lexeme {
            "schema" => Schema,
            "type" => Type,
            "abstract" => Abstract,
            "part" => Part,
            "extends" => Extends,
            "required" => Required,
            "primary" => Primary,
            "import" => Import,
            "as" => As,
            "reverse" => Reverse,
            "nil" => Nil,
            "true" => True,
            "false" => False,
            "in" => In,
            "Integer" => Integer,
            "Float" => Float,
            "Boolean" => Boolean,
            "String" => StringType,
            "Enum" => Enum,
            "Pattern" => Pattern,
            "Timestamp" => Timestamp,
            "Date" => Date,
            "UUID" => Uuid,
            "Vector" => Vector,
            "List" => List,
            _ => return None,
        })
    }

    fn try_operator(&mut self) -> Option<Token> {
        use TokenKind::*;
        let start = self.pos;
        let (kind, len): (TokenKind, usize) = if self.starts_with("-->") {
            (AssocArrow, 3)
        } else if self.starts_with("==>") {
            (CompArrow, 3)
        } else if self.starts_with("->") {
            (ThinArrow, 2)
        } else if self.starts_with("&&") {
            (AndAnd, 2)
        } else if self.starts_with("||") {
            (OrOr, 2)
        } else if self.starts_with("==") {
            (EqEq, 2)
        } else if self.starts_with("!=") {
            (NotEq, 2)
        } else if self.starts_with("<=") {
            (LtEq, 2)
        } else if self.starts_with(">=") {
            (GtEq, 2)
        } else if self.starts_with("=~") {
            (MatchOp, 2)
        } else if self.starts_with("!~") {
            (NotMatchOp, 2)
        } else {
            match self.peek_byte() {
                Some(b'{') => (LeftBrace, 1),
                Some(b'}') => (RightBrace, 1),
                Some(b'[') => (LeftBracket, 1),
                Some(b']') => (RightBracket, 1),
                Some(b'(') => (LeftParen, 1),
                Some(b')') => (RightParen, 1),
                Some(b'<') => (LeftAngle, 1),
                Some(b'>') => (RightAngle, 1),
                Some(b',') => (Comma, 1),
                Some(b':') => (Colon, 1),
                Some(b'.') => (Dot, 1),
                Some(b'=') => (Equal, 1),
                Some(b'!') => (Bang, 1),
                Some(b'?') => (Question, 1),
                Some(b'$') => (Dollar, 1),
                Some(b'|') => (Bar, 1),
                Some(b'^') => (Caret, 1),
                Some(b'+') => (Plus, 1),
                Some(b'-') => (Minus, 1),
                Some(b'*') => (Star, 1),
                Some(b'/') => (Slash, 1),
                Some(b'%') => (Percent, 1),
                _ => return None,
            }
        };
        self.pos += len;
        let lexeme = self.source[start..self.pos].to_string();
        Some(Token::new(kind, lexeme, self.span_from(start)))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let tok = self.next_token();
        if tok.kind == TokenKind::Eof {
            None
        } else {
            Some(tok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(SourceId::new("<test>"), src);
        let mut kinds = Vec::new();
        loop {
            let tok = lexer.next_token();
            if tok.kind == TokenKind::Eof {
                break;
            }
            kinds.push(tok.kind);
        }
        kinds
    }

    #[test]
    fn keywords_and_identifier() {
        let kinds = lex_all("type Item extends Base { }");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Type,
                TokenKind::Identifier,
                TokenKind::Extends,
                TokenKind::Identifier,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
            ]
        );
    }

    #[test]
    fn qualified_identifier_is_one_token() {
        let mut lexer = Lexer::new(SourceId::new("<test>"), "geo.Place");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.lexeme, "geo.Place");
    }

    #[test]
    fn integer_and_float_literals() {
        let mut lexer = Lexer::new(SourceId::new("<test>"), "42 3.14 -1");
        assert_eq!(lexer.next_token().kind, TokenKind::IntLit);
        assert_eq!(lexer.next_token().kind, TokenKind::FloatLit);
        assert_eq!(lexer.next_token().kind, TokenKind::Minus);
        assert_eq!(lexer.next_token().kind, TokenKind::IntLit);
    }

    #[test]
    fn string_literal_with_escapes() {
        let mut lexer = Lexer::new(SourceId::new("<test>"), r#""a\nb\"c""#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::StringLit);
        assert_eq!(tok.lexeme, "a\nb\"c");
    }

    #[test]
    fn line_comment_consumes_to_eol() {
        let kinds = lex_all("type // comment with // inside\nFoo");
        assert_eq!(kinds, vec![TokenKind::Type, TokenKind::Identifier]);
    }

    #[test]
    fn doc_comment_emitted_as_token() {
        let mut lexer = Lexer::new(SourceId::new("<test>"), "/// does a thing\ntype Foo {}");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::DocComment);
        assert_eq!(tok.lexeme, "does a thing");
    }

    #[test]
    fn block_comment_preserves_line_count() {
        let mut lexer = Lexer::new(SourceId::new("<test>"), "/* line1\nline2 */type");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Type);
        assert_eq!(tok.span.start.line, 2);
    }

    #[test]
    fn division_after_identifier_is_slash() {
        let kinds = lex_all("a / b");
        assert_eq!(
            kinds,
            vec![TokenKind::Identifier, TokenKind::Slash, TokenKind::Identifier]
        );
    }

    #[test]
    fn regex_literal_after_operator() {
        let mut lexer = Lexer::new(SourceId::new("<test>"), "e =~ /^a+$/i");
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        assert_eq!(lexer.next_token().kind, TokenKind::MatchOp);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::RegexLit);
        assert_eq!(tok.lexeme, "/^a+$/i");
    }

    #[test]
    fn association_and_composition_arrows() {
        let kinds = lex_all("--> ==>");
        assert_eq!(kinds, vec![TokenKind::AssocArrow, TokenKind::CompArrow]);
    }

    #[test]
    fn relational_and_logical_operators() {
        let kinds = lex_all("== != <= >= && || =~ !~");
        assert_eq!(
            kinds,
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::MatchOp,
                TokenKind::NotMatchOp,
            ]
        );
    }

    #[test]
    fn underscore_wildcard_vs_identifier() {
        let kinds = lex_all("_ _foo");
        assert_eq!(kinds, vec![TokenKind::Underscore, TokenKind::Identifier]);
    }
}
