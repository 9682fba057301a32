//! Token recognizers.
//!
//! The lexer holds an ordered list of [`Recognizer`]s and the first match at
//! the current position wins, which makes the *ordering* of this list part
//! of the grammar: the literal-brace escapes must be tried before the
//! generic command header, and the section / list / macro-definition /
//! include forms must also precede it, or those specialized spellings would
//! parse as plain commands. [`standard_recognizers`] encodes the canonical
//! order.
//!
//! Patterns are anchored at the cursor (`^` against the remaining slice).
//! Line-anchored grammar (markdown sections and list bullets) additionally
//! gates on the cursor sitting at a line start, which is what a multi-line
//! `^` would check. The emphasis recognizer is code rather than regex: an
//! opener requires a following non-space character, and the `regex` crate
//! has no lookahead.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::diagnostics::SourceArc;
use crate::err_ctx;
use crate::lexer::pos::Span;
use crate::lexer::token::{EmphDelim, ListStyle, Token, TokenKind};
use crate::lexer::Tokenizer;
use crate::VellumError;

/// A token recognizer tried by the lexer at the current cursor position.
///
/// Recognizers never advance the cursor; they report the token (with its
/// span) and the lexer moves past it. A recognizer may fail with a
/// diagnostic when it positively identifies a malformed construct (e.g. a
/// markdown section with a mismatched closing marker).
pub trait Recognizer {
    fn recognize(&self, cursor: &Tokenizer, src: &SourceArc)
        -> Result<Option<Token>, VellumError>;
}

const IDENT: &str = "[A-Za-z_][A-Za-z_0-9]*";

static RE_PROTECTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\([{}])").unwrap());
static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%[^\n]*").unwrap());
static RE_ENV_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\begin\{([^}]+)\}(?:\[([^\]]+)\])?").unwrap());
static RE_ENV_FOOTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\end\{([^}]+)\}").unwrap());
static RE_DEF_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\\def(?:Command|Cmd)\{{\\({IDENT})\}}(?:\[([0-9]+)\])?"
    ))
    .unwrap()
});
static RE_DEF_ENVIRONMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\\def(?:Environment|Env)\{{({IDENT})\}}(?:\[([0-9]+)\])?"
    ))
    .unwrap()
});
static RE_INCLUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\include\{([^}]+)\}").unwrap());
static RE_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\\(part|chapter|section|subsection|subsubsection|paragraph)\{([^}]+)\}")
        .unwrap()
});
static RE_MDLIST_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[ \t]*\n)+([ \t]+)(?:([-+*])|[0-9]\.?)[ \t]").unwrap());
static RE_MDLIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([ \t]+)(?:([-+*])|[0-9]\.?)[ \t]").unwrap());
static RE_CMD_PRE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\\({IDENT})(?:\[([^\]]+)\])?\{{\{{\{{")).unwrap()
});
static RE_CMD_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^\\({IDENT})(?:\[([^\]]+)\])?")).unwrap());
static RE_INLINE_PRE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^`([^`\n]*)`").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\S\r\n]+").unwrap());

/// Matches the distinguished end-of-input token.
struct EndOfInput;

impl Recognizer for EndOfInput {
    fn recognize(
        &self,
        cursor: &Tokenizer,
        _src: &SourceArc,
    ) -> Result<Option<Token>, VellumError> {
        if cursor.at_eof() {
            Ok(Some(Token::new(
                TokenKind::EndOfInput,
                Span::at(cursor.pos()),
            )))
        } else {
            Ok(None)
        }
    }
}

/// A regex-driven recognizer with a payload builder.
struct RegexRule {
    line_start_only: bool,
    pattern: &'static Lazy<Regex>,
    build: fn(&Captures) -> TokenKind,
}

impl RegexRule {
    fn new(pattern: &'static Lazy<Regex>, build: fn(&Captures) -> TokenKind) -> Self {
        Self {
            line_start_only: false,
            pattern,
            build,
        }
    }

    fn at_line_start(pattern: &'static Lazy<Regex>, build: fn(&Captures) -> TokenKind) -> Self {
        Self {
            line_start_only: true,
            pattern,
            build,
        }
    }
}

impl Recognizer for RegexRule {
    fn recognize(
        &self,
        cursor: &Tokenizer,
        _src: &SourceArc,
    ) -> Result<Option<Token>, VellumError> {
        if self.line_start_only && !cursor.at_line_start() {
            return Ok(None);
        }
        let Some(caps) = self.pattern.captures(cursor.rest()) else {
            return Ok(None);
        };
        let matched = caps.get(0).expect("regex group 0").as_str();
        let start = cursor.pos();
        let span = Span::new(start, start.advance_str(matched));
        Ok(Some(Token::new((self.build)(&caps), span)))
    }
}

fn opt_group(caps: &Captures, idx: usize) -> Option<String> {
    caps.get(idx).map(|g| g.as_str().to_string())
}

fn group(caps: &Captures, idx: usize) -> String {
    caps.get(idx).map(|g| g.as_str().to_string()).unwrap_or_default()
}

fn arity_group(caps: &Captures, idx: usize) -> usize {
    // The regex only admits digit runs; absence means arity 0.
    caps.get(idx)
        .and_then(|g| g.as_str().parse().ok())
        .unwrap_or(0)
}

/// Fixed depth of a LaTeX sectioning command name.
pub fn depth_of_section(name: &str) -> Option<i32> {
    match name {
        "part" => Some(-1),
        "chapter" => Some(0),
        "section" => Some(1),
        "subsection" => Some(2),
        "subsubsection" => Some(3),
        "paragraph" => Some(4),
        _ => None,
    }
}

/// Canonical sectioning name for a depth, inverse of [`depth_of_section`].
pub fn section_of_depth(depth: i32) -> Option<&'static str> {
    match depth {
        -1 => Some("part"),
        0 => Some("chapter"),
        1 => Some("section"),
        2 => Some("subsection"),
        3 => Some("subsubsection"),
        4 => Some("paragraph"),
        _ => None,
    }
}

/// Markdown `= Title =` section headers.
///
/// Scoped to the current line by construction; the closing marker run must
/// be empty or repeat the opening one exactly, and nothing but whitespace
/// may follow it. A `=` run with no title is not a header at all and falls
/// through to plain text.
struct MdSection;

impl Recognizer for MdSection {
    fn recognize(&self, cursor: &Tokenizer, src: &SourceArc)
        -> Result<Option<Token>, VellumError> {
        if !cursor.at_line_start() {
            return Ok(None);
        }
        let rest = cursor.rest();
        let line = rest.split('\n').next().unwrap_or("");
        let markers: String = line.chars().take_while(|&c| c == '=').collect();
        if markers.is_empty() {
            return Ok(None);
        }
        let after = &line[markers.len()..];
        // The marker run must be followed by horizontal whitespace.
        if !after.starts_with(' ') && !after.starts_with('\t') {
            return Ok(None);
        }
        let body = after.trim();
        if body.is_empty() {
            return Ok(None);
        }
        let start = cursor.pos();
        let span = Span::new(start, start.advance_str(line));
        let closing_len = body.chars().rev().take_while(|&c| c == '=').count();
        let closing = &body[body.len() - closing_len..];
        if !closing.is_empty() && closing != markers {
            return Err(err_ctx!(
                Parse,
                format!("Wrong section marker: should be \"\" or \"{}\"", markers),
                src,
                span
            ));
        }
        let title = body[..body.len() - closing_len].trim_end();
        if title.is_empty() || title.contains('=') {
            return Err(err_ctx!(
                Parse,
                format!("Malformed section title '{}'", body),
                src,
                span
            ));
        }
        Ok(Some(Token::new(
            TokenKind::Section {
                title: title.to_string(),
                depth: markers.chars().count() as i32,
            },
            span,
        )))
    }
}

/// Emphasis delimiters: `__`/`**` (strong) and `_`/`*` (emph). An opener
/// must be followed by a non-space character that does not repeat the
/// delimiter; whether the token opens or closes is the parser's call.
struct Emphasis;

impl Recognizer for Emphasis {
    fn recognize(
        &self,
        cursor: &Tokenizer,
        _src: &SourceArc,
    ) -> Result<Option<Token>, VellumError> {
        let rest = cursor.rest();
        let delim = if rest.starts_with("__") {
            EmphDelim::DoubleUnderscore
        } else if rest.starts_with("**") {
            EmphDelim::DoubleStar
        } else if rest.starts_with('_') {
            EmphDelim::Underscore
        } else if rest.starts_with('*') {
            EmphDelim::Star
        } else {
            return Ok(None);
        };
        let marker = delim.as_str();
        let follow = rest[marker.len()..].chars().next();
        match follow {
            Some(ch) if !ch.is_whitespace() && ch != marker.chars().next().unwrap_or(' ') => {
                let start = cursor.pos();
                let span = Span::new(start, start.advance_str(marker));
                Ok(Some(Token::new(TokenKind::Emph { delim }, span)))
            }
            _ => Ok(None),
        }
    }
}

/// A single newline character; the parser gobbles the rest of the run.
struct Newline;

impl Recognizer for Newline {
    fn recognize(
        &self,
        cursor: &Tokenizer,
        _src: &SourceArc,
    ) -> Result<Option<Token>, VellumError> {
        match cursor.peek_char() {
            Some(ch @ ('\n' | '\r')) => {
                let start = cursor.pos();
                Ok(Some(Token::new(
                    TokenKind::Newline(ch),
                    Span::new(start, start.advance_char(ch)),
                )))
            }
            _ => Ok(None),
        }
    }
}

fn build_protected(caps: &Captures) -> TokenKind {
    TokenKind::Protected(group(caps, 1).chars().next().unwrap_or('{'))
}

fn build_line_comment(_caps: &Captures) -> TokenKind {
    TokenKind::LineComment
}

fn build_env_header(caps: &Captures) -> TokenKind {
    TokenKind::EnvHeader {
        name: group(caps, 1),
        options: opt_group(caps, 2),
    }
}

fn build_env_footer(caps: &Captures) -> TokenKind {
    TokenKind::EnvFooter {
        name: group(caps, 1),
    }
}

fn build_def_command(caps: &Captures) -> TokenKind {
    TokenKind::DefCommand {
        name: group(caps, 1),
        arity: arity_group(caps, 2),
    }
}

fn build_def_environment(caps: &Captures) -> TokenKind {
    TokenKind::DefEnvironment {
        name: group(caps, 1),
        arity: arity_group(caps, 2),
    }
}

fn build_include(caps: &Captures) -> TokenKind {
    TokenKind::Include {
        path: group(caps, 1),
    }
}

fn build_section(caps: &Captures) -> TokenKind {
    let name = group(caps, 1);
    TokenKind::Section {
        title: group(caps, 2),
        depth: depth_of_section(&name).expect("section regex admits only known names"),
    }
}

fn build_list_marker(caps: &Captures) -> TokenKind {
    // Group 2 captures the itemize bullets; a digit marker leaves it empty.
    let style = if caps.get(2).is_some() {
        ListStyle::Itemize
    } else {
        ListStyle::Enumerate
    };
    TokenKind::ListMarker {
        indent: group(caps, 1).chars().count(),
        style,
    }
}

fn build_cmd_pre_header(caps: &Captures) -> TokenKind {
    TokenKind::CmdPreHeader {
        name: group(caps, 1),
        options: opt_group(caps, 2),
    }
}

fn build_cmd_header(caps: &Captures) -> TokenKind {
    TokenKind::CmdHeader {
        name: group(caps, 1),
        options: opt_group(caps, 2),
    }
}

fn build_open_brace(_caps: &Captures) -> TokenKind {
    TokenKind::OpenBrace
}

fn build_close_brace(_caps: &Captures) -> TokenKind {
    TokenKind::CloseBrace
}

fn build_inline_pre(caps: &Captures) -> TokenKind {
    TokenKind::InlinePre {
        text: group(caps, 1),
    }
}

fn build_spaces(caps: &Captures) -> TokenKind {
    TokenKind::Spaces(group(caps, 0))
}

static RE_OPEN_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{").unwrap());
static RE_CLOSE_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\}").unwrap());

/// The canonical recognizer set in grammar order.
pub fn standard_recognizers() -> Rc<[Box<dyn Recognizer>]> {
    let recognizers: Vec<Box<dyn Recognizer>> = vec![
        Box::new(RegexRule::new(&RE_PROTECTED, build_protected)),
        Box::new(EndOfInput),
        Box::new(RegexRule::new(&RE_LINE_COMMENT, build_line_comment)),
        Box::new(RegexRule::new(&RE_ENV_HEADER, build_env_header)),
        Box::new(RegexRule::new(&RE_ENV_FOOTER, build_env_footer)),
        Box::new(RegexRule::new(&RE_DEF_COMMAND, build_def_command)),
        Box::new(RegexRule::new(&RE_DEF_ENVIRONMENT, build_def_environment)),
        Box::new(RegexRule::new(&RE_INCLUDE, build_include)),
        Box::new(RegexRule::new(&RE_SECTION, build_section)),
        Box::new(MdSection),
        Box::new(RegexRule::at_line_start(&RE_MDLIST_OPEN, build_list_marker)),
        Box::new(RegexRule::at_line_start(&RE_MDLIST_ITEM, build_list_marker)),
        Box::new(RegexRule::new(&RE_CMD_PRE_HEADER, build_cmd_pre_header)),
        Box::new(RegexRule::new(&RE_CMD_HEADER, build_cmd_header)),
        Box::new(RegexRule::new(&RE_OPEN_BRACE, build_open_brace)),
        Box::new(RegexRule::new(&RE_CLOSE_BRACE, build_close_brace)),
        Box::new(RegexRule::new(&RE_INLINE_PRE, build_inline_pre)),
        Box::new(Emphasis),
        Box::new(Newline),
        Box::new(RegexRule::new(&RE_SPACES, build_spaces)),
    ];
    recognizers.into()
}
