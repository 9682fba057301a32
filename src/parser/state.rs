//! Parser state: the explicit frame stack and the unparsed-text buffer.
//!
//! The parser is an explicit stack machine rather than recursive descent
//! because a parse must be able to suspend at document boundaries (file
//! inclusion, macro re-parses): the active lexer is swapped while the
//! ancestor chain of open containers stays intact. Each [`Frame`] owns the
//! container node it is building; closing a frame finalizes the node's span
//! and appends it to the frame below.

use crate::lexer::pos::{SourcePos, Span};
use crate::lexer::token::EmphDelim;
use crate::markup::{Markup, Text};

/// One open container on the parse stack.
#[derive(Debug)]
pub struct Frame {
    /// The container being built; children are appended to its content.
    pub node: Markup,
    /// Recorded delimiter of a synthetic emphasis command frame.
    pub emph_delim: Option<EmphDelim>,
    /// Bullet column of a markdown list item frame.
    pub list_indent: Option<usize>,
}

impl Frame {
    pub fn new(node: Markup) -> Self {
        Self {
            node,
            emph_delim: None,
            list_indent: None,
        }
    }

    pub fn emph(node: Markup, delim: EmphDelim) -> Self {
        Self {
            node,
            emph_delim: Some(delim),
            list_indent: None,
        }
    }

    pub fn list_item(node: Markup, indent: usize) -> Self {
        Self {
            node,
            emph_delim: None,
            list_indent: Some(indent),
        }
    }

    /// Closes the frame at `end`, returning the finished node.
    pub fn close(mut self, end: SourcePos) -> Markup {
        set_end(&mut self.node, end);
        self.node
    }

    pub fn is_document(&self) -> bool {
        matches!(self.node, Markup::Document(_))
    }

    pub fn is_markdown_item(&self) -> bool {
        matches!(&self.node, Markup::Command(cmd) if cmd.markdown_item)
    }

    pub fn is_markdown_list(&self) -> bool {
        matches!(&self.node, Markup::Environment(env) if env.markdown_indent.is_some())
    }
}

fn set_end(node: &mut Markup, end: SourcePos) {
    match node {
        Markup::Document(doc) => doc.span.end = end,
        Markup::Section(sec) => sec.span.end = end,
        Markup::Environment(env) => env.span.end = end,
        Markup::Command(cmd) => cmd.span.end = end,
        Markup::CommandArg(arg) | Markup::EnvArg(arg) => arg.span.end = end,
        // Leaves are created with their final span.
        _ => {}
    }
}

/// Accumulates raw characters until a structural token forces a flush into
/// a `Text` leaf. Keeping text out of the token stream is what lets the
/// lexer report "no match" as a plain fallback.
#[derive(Debug, Default)]
pub struct UnparsedText {
    content: String,
    span: Option<Span>,
}

impl UnparsedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one raw character consumed at `start` (cursor now at `end`).
    pub fn push_char(&mut self, ch: char, start: SourcePos, end: SourcePos) {
        match &mut self.span {
            None => self.span = Some(Span::new(start, end)),
            Some(span) => span.end = end,
        }
        self.content.push(ch);
    }

    /// Appends an already-recognized literal chunk (protected characters,
    /// non-structural braces).
    pub fn push_str(&mut self, text: &str, span: Span) {
        match &mut self.span {
            None => self.span = Some(span),
            Some(existing) => existing.end = span.end,
        }
        self.content.push_str(text);
    }

    /// Flushes the buffer into `target`'s content as a `Text` leaf, if any
    /// characters accumulated. Whitespace leaves are appended separately so
    /// text and whitespace never merge.
    pub fn flush_into(&mut self, target: &mut Markup) {
        if self.content.is_empty() {
            self.span = None;
            return;
        }
        let span = self.span.take().unwrap_or_default();
        target.append(Markup::Text(Text {
            text: std::mem::take(&mut self.content),
            span,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::Document;

    #[test]
    fn buffer_tracks_span_of_first_and_last_char() {
        let mut buffer = UnparsedText::new();
        let a = SourcePos::start();
        let b = a.advance_char('x');
        let c = b.advance_char('y');
        buffer.push_char('x', a, b);
        buffer.push_char('y', b, c);
        let mut doc = Markup::Document(Document::new_root("<test>"));
        buffer.flush_into(&mut doc);
        let children = doc.children().unwrap();
        assert_eq!(children.len(), 1);
        let Markup::Text(text) = &children[0] else {
            panic!("expected text leaf");
        };
        assert_eq!(text.text, "xy");
        assert_eq!(text.span.start.offset, 0);
        assert_eq!(text.span.end.offset, 2);
    }

    #[test]
    fn empty_flush_appends_nothing() {
        let mut buffer = UnparsedText::new();
        let mut doc = Markup::Document(Document::new_root("<test>"));
        buffer.flush_into(&mut doc);
        assert!(doc.children().unwrap().is_empty());
    }
}
