//! The structural parser.
//!
//! A stack machine that consumes lexer tokens and builds the markup tree,
//! interleaving five grammars: commands, environments, two sectioning
//! styles, indentation-keyed markdown lists and inline emphasis. State is
//! an explicit frame stack plus an unparsed-text buffer that accumulates
//! raw characters until a structural token forces a flush.
//!
//! The stack is explicit (not the call stack) because parsing must suspend
//! at document boundaries: `\include{...}` and macro re-parses switch the
//! active lexer while the chain of open containers stays intact. Included
//! files push a lexer and a `Sub` document frame; when the sub-lexer
//! reaches its end of input, the parser pops back to the including lexer
//! and keeps going.
//!
//! Failure semantics are fail-fast: a structural mismatch (unmatched
//! footer, unfinished command or environment, section interleaving
//! violation, unterminated verbatim span) aborts the whole parse with a
//! diagnostic carrying the offending span. No recovery is attempted.

pub mod state;

use std::rc::Rc;

use crate::diagnostics::{ErrorContext, RelatedLabel, SourceArc};
use crate::err_ctx;
use crate::lexer::pos::{SourcePos, Span};
use crate::lexer::recognizers::section_of_depth;
use crate::lexer::{standard_recognizers, EmphDelim, Lexer, ListStyle, Recognizer, TokenKind};
use crate::macros::{MacroCommandDef, MacroEnvDef, MacroNamespaceRef};
use crate::markup::{
    parse_options, Arg, Command, Document, DocumentKind, Environment, Markup, Preformatted, Run,
    Section,
};
use crate::template::{Template, TemplateSigils};
use crate::VellumError;

use state::{Frame, UnparsedText};

/// File-reading capability for `\include`. Injected so embedders (and
/// tests) can virtualize the filesystem.
pub trait IncludeLoader {
    fn load(&self, path: &str) -> std::io::Result<String>;
}

/// Default loader: plain filesystem reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsIncludeLoader;

impl IncludeLoader for FsIncludeLoader {
    fn load(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// The markup parser. Holds the recognizer set (shared by every lexer the
/// parse spawns) and the include loader; each `parse_*` call runs an
/// independent stack machine, so re-entrant parses (macro expansion) share
/// nothing but the macro namespace they are given.
pub struct Parser {
    recognizers: Rc<[Box<dyn Recognizer>]>,
    include_loader: Box<dyn IncludeLoader>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            recognizers: standard_recognizers(),
            include_loader: Box::new(FsIncludeLoader),
        }
    }

    pub fn with_include_loader(loader: Box<dyn IncludeLoader>) -> Self {
        Self {
            recognizers: standard_recognizers(),
            include_loader: loader,
        }
    }

    /// Parses a complete document from a string.
    pub fn parse_str(&self, text: &str, name: &str) -> Result<Document, VellumError> {
        let lexer = Lexer::new(name, text, Rc::clone(&self.recognizers));
        self.run(lexer, Document::new_root(name))
    }

    /// Reads and parses a file through the include loader.
    pub fn parse_file(&self, path: &str) -> Result<Document, VellumError> {
        let text = self.include_loader.load(path).map_err(|io| VellumError::Include {
            message: format!("Cannot read '{}': {}", path, io),
            ctx: ErrorContext::none(),
            source: Some(Box::new(io)),
        })?;
        self.parse_str(&text, path)
    }

    /// Parses generated text inside a transient document that shares
    /// `namespace` with the enclosing parse. Used by the macro engine.
    pub fn parse_nested(
        &self,
        text: &str,
        name: &str,
        kind: DocumentKind,
        namespace: MacroNamespaceRef,
    ) -> Result<Document, VellumError> {
        let lexer = Lexer::new(name, text, Rc::clone(&self.recognizers));
        self.run(lexer, Document::new_nested(kind, name, namespace))
    }

    fn run(&self, lexer: Lexer, mut root: Document) -> Result<Document, VellumError> {
        root.src = SourceArc::clone(lexer.src());
        root.span = Span::at(lexer.pos());
        let run = ParseRun {
            parser: self,
            lexers: vec![lexer],
            stack: vec![Frame::new(Markup::Document(root))],
            buffer: UnparsedText::new(),
        };
        run.run()
    }
}

struct ParseRun<'p> {
    parser: &'p Parser,
    /// Active lexer last; includes push, end-of-input pops.
    lexers: Vec<Lexer>,
    /// Open containers, root document frame at the bottom.
    stack: Vec<Frame>,
    buffer: UnparsedText,
}

impl<'p> ParseRun<'p> {
    fn run(mut self) -> Result<Document, VellumError> {
        loop {
            match self.lexer_mut().next_token()? {
                None => self.raw_char()?,
                Some(token) => {
                    let span = token.span;
                    match token.kind {
                        TokenKind::EndOfInput => {
                            if let Some(doc) = self.end_of_input(span)? {
                                return Ok(doc);
                            }
                        }
                        TokenKind::LineComment => {}
                        TokenKind::Protected(ch) => {
                            self.buffer.push_str(ch.encode_utf8(&mut [0; 4]), span);
                        }
                        TokenKind::EnvHeader { name, options } => {
                            self.env_header(span, name, options)?
                        }
                        TokenKind::EnvFooter { name } => self.env_footer(span, name)?,
                        TokenKind::DefCommand { name, arity } => {
                            self.def_command(span, name, arity)?
                        }
                        TokenKind::DefEnvironment { name, arity } => {
                            self.def_environment(span, name, arity)?
                        }
                        TokenKind::Include { path } => self.include(span, path)?,
                        TokenKind::Section { title, depth } => self.section(span, title, depth)?,
                        TokenKind::ListMarker { indent, style } => {
                            self.list_marker(span, indent, style)?
                        }
                        TokenKind::CmdPreHeader { name, options } => {
                            self.cmd_pre_header(span, name, options)?
                        }
                        TokenKind::CmdHeader { name, options } => {
                            self.cmd_header(span, name, options)?
                        }
                        TokenKind::OpenBrace => self.buffer.push_str("{", span),
                        TokenKind::CloseBrace => self.close_brace(span)?,
                        TokenKind::InlinePre { text } => self.inline_pre(span, text),
                        TokenKind::Emph { delim } => self.emph(span, delim),
                        TokenKind::Newline(ch) => self.newline(span, ch),
                        TokenKind::Spaces(text) => self.spaces(span, text),
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Stack and lexer plumbing
    // ------------------------------------------------------------------

    fn lexer_mut(&mut self) -> &mut Lexer {
        self.lexers.last_mut().expect("at least one lexer")
    }

    fn src(&self) -> &SourceArc {
        self.lexers.last().expect("at least one lexer").src()
    }

    fn pos(&self) -> SourcePos {
        self.lexers.last().expect("at least one lexer").pos()
    }

    fn peek_char(&self) -> Option<char> {
        self.lexers.last().expect("at least one lexer").peek_char()
    }

    fn current(&mut self) -> &mut Frame {
        self.stack.last_mut().expect("non-empty parse stack")
    }

    fn flush(&mut self) {
        let frame = self.stack.last_mut().expect("non-empty parse stack");
        self.buffer.flush_into(&mut frame.node);
    }

    fn append(&mut self, node: Markup) {
        self.current().node.append(node);
    }

    /// Closes the top frame at `end` and appends it to the frame below.
    fn pop_append(&mut self, end: SourcePos) {
        let frame = self.stack.pop().expect("non-empty parse stack");
        let node = frame.close(end);
        self.stack
            .last_mut()
            .expect("document frame below every closable frame")
            .node
            .append(node);
    }

    fn err(&self, message: impl Into<String>, span: Span) -> VellumError {
        let message = message.into();
        err_ctx!(Parse, message, self.src(), span)
    }

    /// The macro namespace of the innermost enclosing document (all
    /// documents of one parse share the root's table).
    fn namespace(&self) -> MacroNamespaceRef {
        for frame in self.stack.iter().rev() {
            if let Markup::Document(doc) = &frame.node {
                return Rc::clone(&doc.namespace);
            }
        }
        unreachable!("root frame is a document")
    }

    /// Consumes a `{` token if it is next; otherwise puts the token back.
    fn lookahead_open_brace(&mut self) -> Result<Option<Span>, VellumError> {
        match self.lexer_mut().next_token()? {
            Some(token) if token.kind == TokenKind::OpenBrace => Ok(Some(token.span)),
            Some(token) => {
                self.lexer_mut().putback(&token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Raw character fallback (text accumulation, emphasis closing)
    // ------------------------------------------------------------------

    fn raw_char(&mut self) -> Result<(), VellumError> {
        // Emphasis closes opportunistically: no dedicated closing token,
        // just the recorded delimiter showing up where no recognizer
        // matched.
        if let Some(delim) = self.stack.last().and_then(|frame| frame.emph_delim) {
            let marker = delim.as_str();
            let at_marker = self
                .lexers
                .last()
                .expect("at least one lexer")
                .peek_chars(marker.chars().count())
                .map(|chunk| chunk == marker)
                .unwrap_or(false);
            if at_marker {
                self.flush();
                self.lexer_mut().next_chars(marker.chars().count());
                let end = self.pos();
                self.pop_append(end);
                return Ok(());
            }
        }
        let start = self.pos();
        match self.lexer_mut().next_char() {
            Some(ch) => {
                let end = self.pos();
                self.buffer.push_char(ch, start, end);
                Ok(())
            }
            // Unreachable in practice: the end-of-input recognizer matches
            // first. Kept as a hard failure instead of a silent spin.
            None => Err(err_ctx!(
                Lex,
                "No recognizer matched and input is exhausted",
                self.src(),
                Span::at(start)
            )),
        }
    }

    // ------------------------------------------------------------------
    // Token transitions
    // ------------------------------------------------------------------

    /// Returns the finished root document once the outermost lexer ends;
    /// nested documents pop back to their including lexer instead.
    fn end_of_input(&mut self, span: Span) -> Result<Option<Document>, VellumError> {
        self.flush();
        self.close_to_document(span)?;
        if self.lexers.len() > 1 {
            self.lexers.pop();
            self.pop_append(span.end);
            return Ok(None);
        }
        let frame = self.stack.pop().expect("root frame");
        debug_assert!(self.stack.is_empty(), "root frame is the last one");
        match frame.close(span.end) {
            Markup::Document(doc) => Ok(Some(doc)),
            _ => unreachable!("bottom frame is a document"),
        }
    }

    /// Closes silently closable frames (sections, markdown lists) up to the
    /// nearest document; anything else open is a structural error.
    fn close_to_document(&mut self, span: Span) -> Result<(), VellumError> {
        loop {
            let frame = self.stack.last().expect("non-empty parse stack");
            if frame.is_document() {
                return Ok(());
            }
            if frame.is_markdown_item()
                || frame.is_markdown_list()
                || matches!(frame.node, Markup::Section(_))
            {
                self.pop_append(span.start);
                continue;
            }
            let what = match &frame.node {
                Markup::Environment(_) => "environment",
                _ => "command",
            };
            let open_span = Span::new(frame.node.span().start, span.start);
            return Err(self.err(
                format!("Unfinished {} before end of document", what),
                open_span,
            ));
        }
    }

    fn env_header(
        &mut self,
        span: Span,
        name: String,
        options: Option<String>,
    ) -> Result<(), VellumError> {
        self.flush();
        let env = Environment {
            name,
            options: parse_options(options.as_deref().unwrap_or("")),
            span,
            markdown_indent: None,
            content: Vec::new(),
        };
        self.stack.push(Frame::new(Markup::Environment(env)));
        if let Some(brace_span) = self.lookahead_open_brace()? {
            self.stack.push(Frame::new(Markup::EnvArg(Arg {
                span: brace_span,
                content: Vec::new(),
            })));
        }
        Ok(())
    }

    fn env_footer(&mut self, span: Span, name: String) -> Result<(), VellumError> {
        let frame = self.stack.last().expect("non-empty parse stack");
        let Markup::Environment(env) = &frame.node else {
            return Err(self.err("Cannot close environment here", span));
        };
        if env.name != name {
            let message =
                format!("Mismatched environment '{}' (expecting '{}')", name, env.name);
            return Err(err_ctx!(
                Parse,
                message,
                self.src(),
                span,
                "environments must close innermost-first",
                vec![RelatedLabel {
                    span: env.span,
                    label: "environment opened here".to_string(),
                }]
            ));
        }
        self.flush();
        self.pop_append(span.end);
        Ok(())
    }

    fn def_command(&mut self, span: Span, name: String, arity: usize) -> Result<(), VellumError> {
        self.flush();
        let (body, base, end) = self.read_raw_body("macro command template")?;
        let template =
            Template::compile_with(&body, TemplateSigils::for_macros(), self.src(), base)?;
        self.namespace().borrow_mut().register_command(MacroCommandDef {
            name,
            arity,
            template,
            span: Span::new(span.start, end),
        });
        Ok(())
    }

    fn def_environment(
        &mut self,
        span: Span,
        name: String,
        arity: usize,
    ) -> Result<(), VellumError> {
        self.flush();
        let (header_body, header_base, _) = self.read_raw_body("macro environment header")?;
        let (footer_body, footer_base, end) = self.read_raw_body("macro environment footer")?;
        let sigils = TemplateSigils::for_macros();
        let header =
            Template::compile_with(&header_body, sigils.clone(), self.src(), header_base)?;
        let footer = Template::compile_with(&footer_body, sigils, self.src(), footer_base)?;
        self.namespace()
            .borrow_mut()
            .register_environment(MacroEnvDef {
                name,
                arity,
                header,
                footer,
                span: Span::new(span.start, end),
            });
        Ok(())
    }

    /// Reads one brace-delimited template body verbatim: brace-depth
    /// counted, never tokenized. Backslash-escaped characters (notably
    /// `\{` and `\}`) do not count toward the depth.
    fn read_raw_body(
        &mut self,
        what: &str,
    ) -> Result<(String, SourcePos, SourcePos), VellumError> {
        while matches!(self.peek_char(), Some(ch) if ch.is_whitespace()) {
            self.lexer_mut().next_char();
        }
        let open_pos = self.pos();
        if self.lexer_mut().next_char() != Some('{') {
            return Err(self.err(
                format!("Expected '{{' to open {}", what),
                Span::at(open_pos),
            ));
        }
        let base = self.pos();
        let mut depth = 1usize;
        let mut body = String::new();
        loop {
            let Some(ch) = self.lexer_mut().next_char() else {
                return Err(self.err(
                    format!("Unterminated {} (missing '}}')", what),
                    Span::new(open_pos, self.pos()),
                ));
            };
            match ch {
                '\\' => {
                    body.push('\\');
                    if let Some(escaped) = self.lexer_mut().next_char() {
                        body.push(escaped);
                    }
                }
                '{' => {
                    depth += 1;
                    body.push('{');
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    body.push('}');
                }
                _ => body.push(ch),
            }
        }
        Ok((body, base, self.pos()))
    }

    fn include(&mut self, span: Span, path: String) -> Result<(), VellumError> {
        self.flush();
        let text = self.parser.include_loader.load(&path).map_err(|io| {
            VellumError::Include {
                message: format!("Cannot include '{}': {}", path, io),
                ctx: ErrorContext::with_source_and_span(SourceArc::clone(self.src()), span),
                source: Some(Box::new(io)),
            }
        })?;
        let lexer = Lexer::new(&path, text, Rc::clone(&self.parser.recognizers));
        let mut doc = Document::new_nested(DocumentKind::Sub, &path, self.namespace());
        doc.src = SourceArc::clone(lexer.src());
        self.lexers.push(lexer);
        self.stack.push(Frame::new(Markup::Document(doc)));
        Ok(())
    }

    fn section(&mut self, span: Span, title: String, depth: i32) -> Result<(), VellumError> {
        // Sections may not interleave with unfinished commands or
        // environments; that nesting must close first.
        for frame in self.stack.iter().rev() {
            match &frame.node {
                Markup::Document(_) => break,
                Markup::Section(_) => continue,
                Markup::Environment(_) => {
                    let open_span = Span::new(frame.node.span().start, span.start);
                    return Err(self.err("Unfinished environment before section", open_span));
                }
                _ => {
                    let open_span = Span::new(frame.node.span().start, span.start);
                    return Err(self.err("Unfinished command before section", open_span));
                }
            }
        }
        let Some(name) = section_of_depth(depth) else {
            return Err(self.err(format!("Not a valid section depth: {}", depth), span));
        };
        self.flush();
        while matches!(&self.current().node, Markup::Section(sec) if sec.depth >= depth) {
            self.pop_append(span.start);
        }
        self.stack.push(Frame::new(Markup::Section(Section {
            title,
            name: name.to_string(),
            depth,
            span,
            content: Vec::new(),
        })));
        Ok(())
    }

    fn list_marker(
        &mut self,
        span: Span,
        indent: usize,
        style: ListStyle,
    ) -> Result<(), VellumError> {
        self.flush();
        if self.current().is_markdown_item() {
            let item_level = self.current().list_indent.unwrap_or(0);
            if indent > item_level {
                // A deeper bullet nests a new list inside the open item.
                self.open_list_level(span, indent, style);
                return Ok(());
            }
            self.pop_append(span.start);
        }
        loop {
            let frame = self.stack.last().expect("non-empty parse stack");
            if let Markup::Environment(env) = &frame.node {
                if let Some(level) = env.markdown_indent {
                    if level == indent && env.name == style.env_name() {
                        self.push_item(span, indent);
                        return Ok(());
                    }
                    if level >= indent {
                        // Equal column but different bullet family also
                        // closes the level and reopens below.
                        self.pop_append(span.start);
                        if self.current().is_markdown_item() {
                            self.pop_append(span.start);
                        }
                        continue;
                    }
                    // Shallower open level with no open item: fresh nesting.
                    self.open_list_level(span, indent, style);
                    return Ok(());
                }
                if env.name == style.env_name() {
                    return Err(self.err(
                        "Mixing latex-style and markdown-style lists is forbidden",
                        span,
                    ));
                }
            }
            self.open_list_level(span, indent, style);
            return Ok(());
        }
    }

    fn open_list_level(&mut self, span: Span, indent: usize, style: ListStyle) {
        self.stack.push(Frame::new(Markup::Environment(Environment {
            name: style.env_name().to_string(),
            options: Default::default(),
            span,
            markdown_indent: Some(indent),
            content: Vec::new(),
        })));
        self.push_item(span, indent);
    }

    fn push_item(&mut self, span: Span, indent: usize) {
        self.stack.push(Frame::list_item(
            Markup::Command(Command {
                name: "item".to_string(),
                options: Default::default(),
                span,
                preformated: false,
                markdown_item: true,
                content: Vec::new(),
            }),
            indent,
        ));
    }

    fn cmd_pre_header(
        &mut self,
        span: Span,
        name: String,
        options: Option<String>,
    ) -> Result<(), VellumError> {
        self.flush();
        let options = parse_options(options.as_deref().unwrap_or(""));
        let lang = options
            .get("lang")
            .cloned()
            .unwrap_or_else(|| "block".to_string());
        let body_start = self.pos();
        let mut text = String::new();
        let body_end;
        loop {
            let at_closer = self
                .lexers
                .last()
                .expect("at least one lexer")
                .peek_chars(3)
                .map(|chunk| chunk == "}}}");
            match at_closer {
                Some(true) => {
                    body_end = self.pos();
                    self.lexer_mut().next_chars(3);
                    break;
                }
                Some(false) => {
                    let ch = self.lexer_mut().next_char().expect("peeked char");
                    text.push(ch);
                }
                None => {
                    return Err(self.err(
                        "Preformated command unfinished (missing '}}}')",
                        Span::new(span.start, self.pos()),
                    ));
                }
            }
        }
        let end = self.pos();
        let cmd = Command {
            name,
            options,
            span: Span::new(span.start, end),
            preformated: true,
            markdown_item: false,
            content: vec![Markup::Preformatted(Preformatted {
                text,
                lang,
                span: Span::new(body_start, body_end),
            })],
        };
        self.append(Markup::Command(cmd));
        Ok(())
    }

    fn cmd_header(
        &mut self,
        span: Span,
        name: String,
        options: Option<String>,
    ) -> Result<(), VellumError> {
        self.flush();
        if name == "item"
            && (self.current().is_markdown_item() || self.current().is_markdown_list())
        {
            return Err(self.err(
                "Mixing latex-style and markdown-style lists is forbidden",
                span,
            ));
        }
        let cmd = Command {
            name,
            options: parse_options(options.as_deref().unwrap_or("")),
            span,
            preformated: false,
            markdown_item: false,
            content: Vec::new(),
        };
        if let Some(brace_span) = self.lookahead_open_brace()? {
            self.stack.push(Frame::new(Markup::Command(cmd)));
            self.stack.push(Frame::new(Markup::CommandArg(Arg {
                span: brace_span,
                content: Vec::new(),
            })));
        } else {
            self.append(Markup::Command(cmd));
        }
        Ok(())
    }

    fn close_brace(&mut self, span: Span) -> Result<(), VellumError> {
        enum ArgContext {
            Command,
            Environment,
            None,
        }
        let context = match &self.stack.last().expect("non-empty parse stack").node {
            Markup::CommandArg(_) => ArgContext::Command,
            Markup::EnvArg(_) => ArgContext::Environment,
            _ => ArgContext::None,
        };
        match context {
            ArgContext::Command => {
                self.flush();
                self.pop_append(span.end);
                if let Some(brace_span) = self.lookahead_open_brace()? {
                    self.stack.push(Frame::new(Markup::CommandArg(Arg {
                        span: brace_span,
                        content: Vec::new(),
                    })));
                } else {
                    // Argument list finished; the command closes too.
                    self.pop_append(span.end);
                }
            }
            ArgContext::Environment => {
                self.flush();
                self.pop_append(span.end);
                if let Some(brace_span) = self.lookahead_open_brace()? {
                    self.stack.push(Frame::new(Markup::EnvArg(Arg {
                        span: brace_span,
                        content: Vec::new(),
                    })));
                }
                // Otherwise the environment body begins.
            }
            ArgContext::None => {
                // A brace outside any argument context is literal text.
                self.buffer.push_str("}", span);
            }
        }
        Ok(())
    }

    fn inline_pre(&mut self, span: Span, text: String) {
        self.flush();
        self.append(Markup::Preformatted(Preformatted {
            text,
            lang: "inline".to_string(),
            span,
        }));
    }

    fn emph(&mut self, span: Span, delim: EmphDelim) {
        if self.current().emph_delim == Some(delim) {
            self.flush();
            self.pop_append(span.end);
            return;
        }
        self.flush();
        self.stack.push(Frame::emph(
            Markup::Command(Command {
                name: delim.command_name().to_string(),
                options: Default::default(),
                span,
                preformated: false,
                markdown_item: false,
                content: Vec::new(),
            }),
            delim,
        ));
    }

    fn newline(&mut self, span: Span, first: char) {
        self.flush();
        let mut text = String::new();
        text.push(first);
        while matches!(self.peek_char(), Some('\n' | '\r')) {
            text.push(self.lexer_mut().next_char().expect("peeked char"));
        }
        let end = self.pos();
        // A blank line terminates the whole open markdown list scope.
        let breaks = text.replace("\r\n", "\n").chars().count();
        if breaks >= 2 {
            if self.current().is_markdown_item() {
                self.pop_append(span.start);
            }
            while self.current().is_markdown_list() {
                self.pop_append(span.start);
                if self.current().is_markdown_item() {
                    self.pop_append(span.start);
                }
            }
        }
        self.append(Markup::Newlines(Run {
            text,
            span: Span::new(span.start, end),
        }));
    }

    fn spaces(&mut self, span: Span, text: String) {
        self.flush();
        self.append(Markup::Spaces(Run { text, span }));
    }
}
