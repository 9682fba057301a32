//! Source positions and spans.
//!
//! A [`SourcePos`] is an immutable (line, column, offset) triple. Total
//! ordering is by absolute offset; line and column exist for human-facing
//! diagnostics. Positions are re-anchored (restart at 1:1, offset 0) when
//! macro-expanded or included text is re-parsed in a sub-document.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An immutable position in a source text: 1-based line and column plus the
/// 0-based absolute byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl SourcePos {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// The first position of a source text.
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Position just past `ch`. Offsets advance by the character's UTF-8
    /// width; a newline starts the next line.
    pub fn advance_char(self, ch: char) -> Self {
        if ch == '\n' {
            Self {
                line: self.line + 1,
                column: 1,
                offset: self.offset + ch.len_utf8(),
            }
        } else {
            Self {
                line: self.line,
                column: self.column + 1,
                offset: self.offset + ch.len_utf8(),
            }
        }
    }

    /// Advances over an arbitrary text chunk, tracking line breaks.
    pub fn advance_str(self, text: &str) -> Self {
        let mut pos = self;
        for ch in text.chars() {
            pos = pos.advance_char(ch);
        }
        pos
    }
}

impl PartialOrd for SourcePos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourcePos {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset.cmp(&other.offset)
    }
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl Default for SourcePos {
    fn default() -> Self {
        Self::start()
    }
}

/// A contiguous region of source text. `start <= end` holds for every span
/// in a finished tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: SourcePos,
    pub end: SourcePos,
}

impl Span {
    pub fn new(start: SourcePos, end: SourcePos) -> Self {
        Self { start, end }
    }

    /// A zero-width span at a single position.
    pub fn at(pos: SourcePos) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(&self, other: Span) -> Span {
        Span {
            start: if self.start <= other.start {
                self.start
            } else {
                other.start
            },
            end: if self.end >= other.end {
                self.end
            } else {
                other.end
            },
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_by_offset() {
        let a = SourcePos::new(2, 1, 10);
        let b = SourcePos::new(1, 40, 39);
        assert!(a < b);
        assert_eq!(a.max(b).offset, 39);
    }

    #[test]
    fn advance_str_tracks_lines_and_columns() {
        let pos = SourcePos::start().advance_str("ab\ncd");
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 3);
        assert_eq!(pos.offset, 5);
    }

    #[test]
    fn span_merge_covers_both() {
        let a = Span::new(SourcePos::new(1, 3, 2), SourcePos::new(1, 5, 4));
        let b = Span::new(SourcePos::new(1, 1, 0), SourcePos::new(1, 4, 3));
        let m = a.merge(b);
        assert_eq!(m.start.offset, 0);
        assert_eq!(m.end.offset, 4);
    }
}
