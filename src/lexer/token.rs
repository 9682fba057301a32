//! Lexer tokens.
//!
//! Each token carries a closed [`TokenKind`] with the recognizer's parsed
//! payload (names, option strings, indents, depths) instead of raw regex
//! match groups, so the parser can match exhaustively.

use serde::{Deserialize, Serialize};

use crate::lexer::pos::Span;

/// Bullet family of a markdown list marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListStyle {
    /// `-`, `+` or `*` bullets.
    Itemize,
    /// `<digit>.` bullets.
    Enumerate,
}

impl ListStyle {
    /// The environment name this list family maps to.
    pub fn env_name(&self) -> &'static str {
        match self {
            ListStyle::Itemize => "itemize",
            ListStyle::Enumerate => "enumerate",
        }
    }
}

/// Inline emphasis delimiter kinds. Doubled delimiters mark strong emphasis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmphDelim {
    Underscore,
    Star,
    DoubleUnderscore,
    DoubleStar,
}

impl EmphDelim {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmphDelim::Underscore => "_",
            EmphDelim::Star => "*",
            EmphDelim::DoubleUnderscore => "__",
            EmphDelim::DoubleStar => "**",
        }
    }

    /// Strong delimiters open a `strong` command, single ones `emph`.
    pub fn is_strong(&self) -> bool {
        matches!(self, EmphDelim::DoubleUnderscore | EmphDelim::DoubleStar)
    }

    pub fn command_name(&self) -> &'static str {
        if self.is_strong() { "strong" } else { "emph" }
    }
}

/// The closed set of token kinds produced by the recognizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Distinguished end-of-stream token.
    EndOfInput,
    /// `% ...` to end of line; discarded by the parser.
    LineComment,
    /// Escaped literal brace: `\{` or `\}` (payload is the bare brace).
    Protected(char),
    /// `\begin{name}[options]`
    EnvHeader {
        name: String,
        options: Option<String>,
    },
    /// `\end{name}`
    EnvFooter { name: String },
    /// `\defCommand{\name}[arity]` / `\defCmd{\name}[arity]`; the template
    /// body that follows is read verbatim by the parser.
    DefCommand { name: String, arity: usize },
    /// `\defEnvironment{name}[arity]` / `\defEnv{name}[arity]`; two verbatim
    /// bodies (header, footer) follow.
    DefEnvironment { name: String, arity: usize },
    /// `\include{path}`
    Include { path: String },
    /// A sectioning header of either style, with its resolved depth
    /// (`\part` = −1 … `\paragraph` = 4; markdown `=`-count).
    Section { title: String, depth: i32 },
    /// A markdown list bullet at the given indentation column.
    ListMarker { indent: usize, style: ListStyle },
    /// `\name[options]{{{`; verbatim body follows until `}}}`.
    CmdPreHeader {
        name: String,
        options: Option<String>,
    },
    /// `\name[options]`
    CmdHeader {
        name: String,
        options: Option<String>,
    },
    /// Structural `{` (argument opener when a command/environment awaits one,
    /// literal text otherwise).
    OpenBrace,
    /// Structural `}`.
    CloseBrace,
    /// `` `text` `` inline preformatted span.
    InlinePre { text: String },
    /// Emphasis opener/closer delimiter.
    Emph { delim: EmphDelim },
    /// A single newline character (the parser gobbles any run that follows).
    Newline(char),
    /// A run of non-newline whitespace.
    Spaces(String),
}

impl TokenKind {
    /// Short name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::EndOfInput => "end of input",
            TokenKind::LineComment => "line comment",
            TokenKind::Protected(_) => "protected character",
            TokenKind::EnvHeader { .. } => "environment header",
            TokenKind::EnvFooter { .. } => "environment footer",
            TokenKind::DefCommand { .. } => "command definition",
            TokenKind::DefEnvironment { .. } => "environment definition",
            TokenKind::Include { .. } => "include",
            TokenKind::Section { .. } => "section header",
            TokenKind::ListMarker { .. } => "list marker",
            TokenKind::CmdPreHeader { .. } => "preformatted command header",
            TokenKind::CmdHeader { .. } => "command header",
            TokenKind::OpenBrace => "open brace",
            TokenKind::CloseBrace => "close brace",
            TokenKind::InlinePre { .. } => "inline preformatted",
            TokenKind::Emph { .. } => "emphasis delimiter",
            TokenKind::Newline(_) => "newline",
            TokenKind::Spaces(_) => "spaces",
        }
    }
}

/// A recognized token with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
