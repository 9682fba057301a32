//! The vellum lexer.
//!
//! Tokenization is recognizer-driven: [`Lexer::next_token`] tries an ordered
//! list of [`recognizers::Recognizer`]s at the current position and the
//! first match wins. When nothing matches, the lexer reports `None` and the
//! caller is expected to consume one raw character itself. That is how
//! untyped text accumulates in the structural parser without a dedicated
//! "text" token.
//!
//! The grammar needs only single-token lookahead: [`Lexer::putback`] rewinds
//! the cursor to the token's start and the next call re-recognizes it.
//! Verbatim spans (`{{{ ... }}}` bodies, emphasis closers, newline runs)
//! bypass tokenization entirely through the raw character interface
//! (`peek_char` / `next_char` / `peek_chars` / `next_chars`).

pub mod pos;
pub mod recognizers;
pub mod token;

use std::rc::Rc;

use crate::diagnostics::{to_error_source, SourceArc};
use crate::VellumError;

pub use pos::{SourcePos, Span};
pub use recognizers::{standard_recognizers, Recognizer};
pub use token::{EmphDelim, ListStyle, Token, TokenKind};

/// Raw character cursor over a source text with position tracking.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    source: String,
    pos: SourcePos,
}

impl Tokenizer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pos: SourcePos::start(),
        }
    }

    pub fn pos(&self) -> SourcePos {
        self.pos
    }

    /// The remaining unconsumed input.
    pub fn rest(&self) -> &str {
        &self.source[self.pos.offset..]
    }

    pub fn at_eof(&self) -> bool {
        self.pos.offset >= self.source.len()
    }

    /// True at the very start of the input or just after a newline; the
    /// line-anchored recognizers (markdown sections, list bullets) gate on
    /// this.
    pub fn at_line_start(&self) -> bool {
        self.pos.column == 1
    }

    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// The next `n` characters without advancing, or `None` if fewer remain.
    pub fn peek_chars(&self, n: usize) -> Option<&str> {
        let rest = self.rest();
        let mut indices = rest.char_indices();
        for _ in 0..n {
            indices.next()?;
        }
        let end = indices.next().map(|(i, _)| i).unwrap_or(rest.len());
        Some(&rest[..end])
    }

    pub fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos = self.pos.advance_char(ch);
        Some(ch)
    }

    /// Consumes and returns the next `n` characters, or `None` (without
    /// advancing) if fewer remain.
    pub fn next_chars(&mut self, n: usize) -> Option<String> {
        let chunk = self.peek_chars(n)?.to_string();
        self.pos = self.pos.advance_str(&chunk);
        Some(chunk)
    }

    /// Moves the cursor to a position previously produced by this source.
    pub fn seek(&mut self, pos: SourcePos) {
        debug_assert!(pos.offset <= self.source.len());
        self.pos = pos;
    }
}

/// Recognizer-driven tokenizer with one-token putback.
pub struct Lexer {
    source: SourceArc,
    cursor: Tokenizer,
    recognizers: Rc<[Box<dyn Recognizer>]>,
}

impl Lexer {
    /// Builds a lexer over `text`, labeled `name` in diagnostics.
    pub fn new(
        name: impl AsRef<str>,
        text: impl Into<String>,
        recognizers: Rc<[Box<dyn Recognizer>]>,
    ) -> Self {
        let text = text.into();
        Self {
            source: to_error_source(name, &text),
            cursor: Tokenizer::new(text),
            recognizers,
        }
    }

    /// The shared named source for error contexts.
    pub fn src(&self) -> &SourceArc {
        &self.source
    }

    pub fn pos(&self) -> SourcePos {
        self.cursor.pos()
    }

    /// Recognizes the next token, or `None` when no recognizer matches at
    /// the current position (the caller then consumes one raw character).
    pub fn next_token(&mut self) -> Result<Option<Token>, VellumError> {
        for recognizer in self.recognizers.iter() {
            if let Some(token) = recognizer.recognize(&self.cursor, &self.source)? {
                self.cursor.seek(token.span.end);
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// Rewinds to the start of `token`; the next [`Lexer::next_token`] call
    /// recognizes it again. Only one token of lookahead is ever needed.
    pub fn putback(&mut self, token: &Token) {
        self.cursor.seek(token.span.start);
    }

    // Raw character access for verbatim spans.

    pub fn at_eof(&self) -> bool {
        self.cursor.at_eof()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.cursor.peek_char()
    }

    pub fn peek_chars(&self, n: usize) -> Option<&str> {
        self.cursor.peek_chars(n)
    }

    pub fn next_char(&mut self) -> Option<char> {
        self.cursor.next_char()
    }

    pub fn next_chars(&mut self, n: usize) -> Option<String> {
        self.cursor.next_chars(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(text: &str) -> Lexer {
        Lexer::new("<test>", text, standard_recognizers())
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        let mut lex = lexer(text);
        let mut out = Vec::new();
        loop {
            match lex.next_token().unwrap() {
                Some(token) => {
                    let done = token.kind == TokenKind::EndOfInput;
                    out.push(token.kind);
                    if done {
                        return out;
                    }
                }
                None => {
                    lex.next_char();
                }
            }
        }
    }

    #[test]
    fn command_header_with_options() {
        let mut lex = lexer(r"\emph[color=red]{x}");
        let token = lex.next_token().unwrap().unwrap();
        assert_eq!(
            token.kind,
            TokenKind::CmdHeader {
                name: "emph".to_string(),
                options: Some("color=red".to_string()),
            }
        );
        assert_eq!(token.span.start.offset, 0);
        assert_eq!(token.span.end.offset, 16);
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::OpenBrace
        );
    }

    #[test]
    fn section_form_wins_over_generic_command() {
        let mut lex = lexer(r"\section{Intro}");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::Section {
                title: "Intro".to_string(),
                depth: 1,
            }
        );
    }

    #[test]
    fn definition_form_wins_over_generic_command() {
        let mut lex = lexer(r"\defCommand{\hello}[1]");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::DefCommand {
                name: "hello".to_string(),
                arity: 1,
            }
        );
        let mut lex = lexer(r"\defEnv{frame}");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::DefEnvironment {
                name: "frame".to_string(),
                arity: 0,
            }
        );
    }

    #[test]
    fn preformatted_header_wins_over_plain_header() {
        let mut lex = lexer(r"\code[lang=rust]{{{let x = 1;}}}");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::CmdPreHeader {
                name: "code".to_string(),
                options: Some("lang=rust".to_string()),
            }
        );
    }

    #[test]
    fn protected_braces_are_not_structural() {
        assert_eq!(
            kinds(r"\{\}"),
            vec![
                TokenKind::Protected('{'),
                TokenKind::Protected('}'),
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn md_section_depth_is_marker_count() {
        let mut lex = lexer("== Title ==\n");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::Section {
                title: "Title".to_string(),
                depth: 2,
            }
        );
    }

    #[test]
    fn md_section_marker_mismatch_is_an_error() {
        let mut lex = lexer("== Title =\n");
        let err = lex.next_token().unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::Parse);
    }

    #[test]
    fn md_section_only_matches_at_line_start() {
        // Mid-line '=' runs are plain text: the recognizer reports nothing
        // and the parser falls back to raw characters.
        let mut lex = lexer("a == b ==");
        assert!(lex.next_token().unwrap().is_none());
    }

    #[test]
    fn list_marker_styles_and_indent() {
        let mut lex = lexer("   - item\n");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::ListMarker {
                indent: 3,
                style: ListStyle::Itemize,
            }
        );
        let mut lex = lexer("  1. item\n");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::ListMarker {
                indent: 2,
                style: ListStyle::Enumerate,
            }
        );
    }

    #[test]
    fn inline_preformatted_span() {
        let mut lex = lexer("`let x`");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::InlinePre {
                text: "let x".to_string(),
            }
        );
    }

    #[test]
    fn emphasis_opener_requires_following_nonspace() {
        let mut lex = lexer("_word_");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::Emph {
                delim: EmphDelim::Underscore,
            }
        );
        // `_ word` is not an opener; the lexer yields nothing and the parser
        // treats the underscore as raw text.
        let mut lex = lexer("_ word");
        assert!(lex.next_token().unwrap().is_none());
    }

    #[test]
    fn strong_delimiter_is_matched_before_single() {
        let mut lex = lexer("__word__");
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::Emph {
                delim: EmphDelim::DoubleUnderscore,
            }
        );
    }

    #[test]
    fn putback_rewinds_one_token() {
        let mut lex = lexer(r"\begin{doc} x");
        let header = lex.next_token().unwrap().unwrap();
        lex.putback(&header);
        let again = lex.next_token().unwrap().unwrap();
        assert_eq!(header, again);
    }

    #[test]
    fn unmatched_input_falls_back_to_raw_chars() {
        let mut lex = lexer("ab");
        assert!(lex.next_token().unwrap().is_none());
        assert_eq!(lex.next_char(), Some('a'));
        assert_eq!(lex.next_char(), Some('b'));
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::EndOfInput
        );
    }

    #[test]
    fn comment_runs_to_end_of_line() {
        let mut lex = lexer("% note\nrest");
        assert_eq!(lex.next_token().unwrap().unwrap().kind, TokenKind::LineComment);
        assert_eq!(
            lex.next_token().unwrap().unwrap().kind,
            TokenKind::Newline('\n')
        );
    }

    #[test]
    fn spaces_and_newlines_are_distinct_tokens() {
        assert_eq!(
            kinds("  \n"),
            vec![
                TokenKind::Spaces("  ".to_string()),
                TokenKind::Newline('\n'),
                TokenKind::EndOfInput,
            ]
        );
    }
}
