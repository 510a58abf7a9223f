//! Source identity and byte-offset to line/column resolution.
//!
//! Every diagnostic, token, and AST node carries a [`Span`] rather than a
//! raw byte range so it can be rendered with a human-readable location.
//! Resolving byte offsets to `(line, column)` pairs is centralized in
//! [`PositionRegistry`] so every phase agrees on the same line-start table
//! for a given source.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A stable name for an input: a file URI, a synthetic name like
/// `"<string>"`, or anything else the embedder chooses. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceId(Arc<str>);

impl SourceId {
    /// Creates a new source id from any string-like value.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        SourceId::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        SourceId::new(value)
    }
}

/// A 1-based line/column, 0-based byte position within a registered source.
///
/// `line == 0` is the sentinel "zero position" returned when an offset or
/// source could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// 1-based line number, or 0 if unresolved.
    pub line: u32,
    /// 1-based column number, or 0 if unresolved.
    pub column: u32,
    /// 0-based byte offset within the source.
    pub byte: u32,
}

impl Position {
    /// Returns true if this is the unresolved "zero position".
    pub fn is_zero(&self) -> bool {
        self.line == 0
    }
}

/// A half-open `[start, end)` range within a single named source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// The source this span belongs to.
    pub source: SourceId,
    /// Inclusive start position.
    pub start: Position,
    /// Exclusive end position.
    pub end: Position,
}

impl Span {
    /// Builds a span from a source id and two resolved positions.
    pub fn new(source: SourceId, start: Position, end: Position) -> Self {
        Self { source, start, end }
    }

    /// A span covering a single zero-width point, used for synthetic nodes.
    pub fn point(source: SourceId, pos: Position) -> Self {
        Self {
            source,
            start: pos,
            end: pos,
        }
    }

    /// Merges two spans into one covering both, assuming the same source.
    pub fn merge(&self, other: &Span) -> Span {
        let start = if self.start.byte <= other.start.byte {
            self.start
        } else {
            other.start
        };
        let end = if self.end.byte >= other.end.byte {
            self.end
        } else {
            other.end
        };
        Span {
            source: self.source.clone(),
            start,
            end,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.is_zero() {
            write!(f, "{}", self.source)
        } else {
            write!(
                f,
                "{}:{}:{}",
                self.source, self.start.line, self.start.column
            )
        }
    }
}

/// Precomputed line-start table for a single registered source.
struct SourceEntry {
    /// Byte offset of the first character of each line; `line_starts[0] == 0`.
    line_starts: Vec<u32>,
    len: u32,
}

impl SourceEntry {
    fn build(bytes: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in bytes.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            line_starts,
            len: bytes.len() as u32,
        }
    }

    /// Binary search over `line_starts` for the line containing `offset`.
    fn position_at(&self, offset: u32) -> Position {
        if offset as usize > self.len as usize {
            return Position::default();
        }
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[line_idx];
        Position {
            line: (line_idx + 1) as u32,
            column: offset - line_start + 1,
            byte: offset,
        }
    }
}

/// Maps `(SourceId, byte_offset) -> Position` for every registered source.
///
/// Read-mostly: callers are expected to `register` all sources up front and
/// only then query positions concurrently.
#[derive(Default)]
pub struct PositionRegistry {
    sources: HashMap<SourceId, SourceEntry>,
}

impl PositionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers source bytes under `id`, precomputing its line-start table.
    pub fn register(&mut self, id: SourceId, bytes: &str) {
        self.sources.insert(id, SourceEntry::build(bytes));
    }

    /// Returns true if `id` has been registered.
    pub fn contains(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    /// Resolves `offset` within `id` to a line/column position.
    ///
    /// Returns the zero position if `id` is unregistered or `offset` is out
    /// of range.
    pub fn position_at(&self, id: &SourceId, offset: u32) -> Position {
        match self.sources.get(id) {
            Some(entry) => entry.position_at(offset),
            None => Position::default(),
        }
    }

    /// Builds a [`Span`] from two byte offsets within `id`.
    pub fn span(&self, id: &SourceId, start: u32, end: u32) -> Span {
        Span {
            source: id.clone(),
            start: self.position_at(id, start),
            end: self.position_at(id, end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_at_start_of_each_line() {
        let mut reg = PositionRegistry::new();
        let id = SourceId::new("test.sdl");
        reg.register(id.clone(), "abc\ndef\nghi");
        assert_eq!(reg.position_at(&id, 0), Position { line: 1, column: 1, byte: 0 });
        assert_eq!(reg.position_at(&id, 4), Position { line: 2, column: 1, byte: 4 });
        assert_eq!(reg.position_at(&id, 8), Position { line: 3, column: 1, byte: 8 });
    }

    #[test]
    fn position_mid_line() {
        let mut reg = PositionRegistry::new();
        let id = SourceId::new("test.sdl");
        reg.register(id.clone(), "abc\ndefgh");
        assert_eq!(reg.position_at(&id, 6), Position { line: 2, column: 3, byte: 6 });
    }

    #[test]
    fn unregistered_source_is_zero() {
        let reg = PositionRegistry::new();
        let id = SourceId::new("missing.sdl");
        let pos = reg.position_at(&id, 0);
        assert!(pos.is_zero());
    }

    #[test]
    fn out_of_range_offset_is_zero() {
        let mut reg = PositionRegistry::new();
        let id = SourceId::new("short.sdl");
        reg.register(id.clone(), "abc");
        assert!(reg.position_at(&id, 999).is_zero());
    }

    #[test]
    fn span_merge_takes_outer_bounds() {
        let mut reg = PositionRegistry::new();
        let id = SourceId::new("t.sdl");
        reg.register(id.clone(), "0123456789");
        let a = reg.span(&id, 2, 4);
        let b = reg.span(&id, 6, 8);
        let m = a.merge(&b);
        assert_eq!(m.start.byte, 2);
        assert_eq!(m.end.byte, 8);
    }
}
