//! Unified, `miette`-based diagnostics for the vellum pipeline.
//!
//! Every failure mode of the crate (lexing, structural parsing, macro
//! arity, template compilation/rendering, file inclusion) is represented by
//! one variant of [`VellumError`]. Each variant carries a message plus an
//! [`ErrorContext`] holding the named source, the offending span and an
//! optional help line, so errors render as rich labeled reports.
//!
//! Construction goes through the `err_msg!` / `err_ctx!` macros; manual
//! `ErrorContext` assembly is only needed for multi-label diagnostics.
//!
//! Every error aborts the current parse or expansion, macro expansion
//! errors are attributed to the invocation span, and nothing is silently
//! swallowed except recognized line comments.

use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::lexer::pos::Span;

/// Shared handle to a named source text, cheap to clone into error contexts.
pub type SourceArc = Arc<NamedSource<String>>;

/// Type-safe error classification corresponding to [`VellumError`] variants.
/// Tests assert on this instead of matching message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lexer failure: input exhausted mid-token with no recognizer match.
    Lex,
    /// Structural parse failure: mismatched nesting, interleaving
    /// violations, unterminated verbatim spans, unrecognized tokens.
    Parse,
    /// Macro invocation argument count differs from the declared arity,
    /// or expansion exceeded the recursion bound.
    MacroArity,
    /// Malformed variable/inline/block escape in a template.
    TemplateCompile,
    /// Unbound variable or script evaluation failure while rendering.
    TemplateRender,
    /// `\include` target could not be opened or read.
    Include,
    /// Document processor misuse (duplicate handler registration).
    Process,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Lex => "Lex",
            ErrorKind::Parse => "Parse",
            ErrorKind::MacroArity => "MacroArity",
            ErrorKind::TemplateCompile => "TemplateCompile",
            ErrorKind::TemplateRender => "TemplateRender",
            ErrorKind::Include => "Include",
            ErrorKind::Process => "Process",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single additional label for multi-span diagnostics
/// (e.g. "environment opened here" on a mismatched footer).
#[derive(Debug)]
pub struct RelatedLabel {
    pub span: Span,
    pub label: String,
}

/// Minimal, composable error context for diagnostics.
#[derive(Debug, Default)]
pub struct ErrorContext {
    /// The source text this error points into (if any).
    pub source: Option<SourceArc>,
    /// The primary span for this error (if any).
    pub span: Option<Span>,
    /// An optional help message.
    pub help: Option<String>,
    /// Additional labeled spans for multi-label diagnostics.
    pub related: Vec<RelatedLabel>,
}

impl ErrorContext {
    /// Returns an empty error context (no source, span, or help).
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a context with both source and span.
    pub fn with_source_and_span(source: SourceArc, span: Span) -> Self {
        Self {
            source: Some(source),
            span: Some(span),
            help: None,
            related: vec![],
        }
    }
}

/// Unified error type for all vellum failure modes.
#[derive(Debug, Error)]
pub enum VellumError {
    #[error("Lex error: {message}")]
    Lex {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Macro error: {message}")]
    MacroArity {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Template compile error: {message}")]
    TemplateCompile {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Template render error: {message}")]
    TemplateRender {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Include error: {message}")]
    Include {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
    #[error("Process error: {message}")]
    Process {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl VellumError {
    fn get_ctx(&self) -> &ErrorContext {
        match self {
            VellumError::Lex { ctx, .. } => ctx,
            VellumError::Parse { ctx, .. } => ctx,
            VellumError::MacroArity { ctx, .. } => ctx,
            VellumError::TemplateCompile { ctx, .. } => ctx,
            VellumError::TemplateRender { ctx, .. } => ctx,
            VellumError::Include { ctx, .. } => ctx,
            VellumError::Process { ctx, .. } => ctx,
        }
    }

    fn message(&self) -> &str {
        match self {
            VellumError::Lex { message, .. } => message,
            VellumError::Parse { message, .. } => message,
            VellumError::MacroArity { message, .. } => message,
            VellumError::TemplateCompile { message, .. } => message,
            VellumError::TemplateRender { message, .. } => message,
            VellumError::Include { message, .. } => message,
            VellumError::Process { message, .. } => message,
        }
    }

    /// Returns the type-safe classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VellumError::Lex { .. } => ErrorKind::Lex,
            VellumError::Parse { .. } => ErrorKind::Parse,
            VellumError::MacroArity { .. } => ErrorKind::MacroArity,
            VellumError::TemplateCompile { .. } => ErrorKind::TemplateCompile,
            VellumError::TemplateRender { .. } => ErrorKind::TemplateRender,
            VellumError::Include { .. } => ErrorKind::Include,
            VellumError::Process { .. } => ErrorKind::Process,
        }
    }

    /// The primary span, if the error carries one.
    pub fn span(&self) -> Option<Span> {
        self.get_ctx().span
    }

    /// Re-attributes this error to a new source and span, keeping the
    /// original as the chained cause. Used when a macro expansion fails:
    /// the user should see the invocation site, not the generated text.
    pub fn attributed_to(self, source: SourceArc, span: Span) -> VellumError {
        let message = self.message().to_string();
        let kind = self.kind();
        let ctx = ErrorContext::with_source_and_span(source, span);
        let cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>> =
            Some(Box::new(self));
        match kind {
            ErrorKind::Lex => VellumError::Lex {
                message,
                ctx,
                source: cause,
            },
            ErrorKind::Parse => VellumError::Parse {
                message,
                ctx,
                source: cause,
            },
            ErrorKind::MacroArity => VellumError::MacroArity {
                message,
                ctx,
                source: cause,
            },
            ErrorKind::TemplateCompile => VellumError::TemplateCompile {
                message,
                ctx,
                source: cause,
            },
            ErrorKind::TemplateRender => VellumError::TemplateRender {
                message,
                ctx,
                source: cause,
            },
            ErrorKind::Include => VellumError::Include {
                message,
                ctx,
                source: cause,
            },
            ErrorKind::Process => VellumError::Process {
                message,
                ctx,
                source: cause,
            },
        }
    }
}

impl Diagnostic for VellumError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new(format!("vellum::{}", self.kind())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.get_ctx()
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn std::fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.get_ctx()
            .source
            .as_ref()
            .map(|s| s.as_ref() as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let ctx = self.get_ctx();
        let mut labels = Vec::new();
        if let Some(span) = ctx.span {
            labels.push(LabeledSpan::new(
                Some(self.message().to_string()),
                span.start.offset,
                span.len().max(1),
            ));
        }
        for rel in &ctx.related {
            labels.push(LabeledSpan::new(
                Some(rel.label.clone()),
                rel.span.start.offset,
                rel.span.len().max(1),
            ));
        }
        if labels.is_empty() {
            None
        } else {
            Some(Box::new(labels.into_iter()))
        }
    }
}

/// Converts a source string into an `Arc<NamedSource<String>>` for use in
/// error contexts.
pub fn to_error_source(name: impl AsRef<str>, source: impl AsRef<str>) -> SourceArc {
    Arc::new(NamedSource::new(
        name.as_ref().to_string(),
        source.as_ref().to_string(),
    ))
}

/// Prints a [`VellumError`] with full miette diagnostics.
///
/// Use this for user-facing error display; library code returns the error.
pub fn print_error(error: VellumError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}

/// Constructs a `VellumError` variant with a formatted message and no context.
#[macro_export]
macro_rules! err_msg {
    ($variant:ident, $msg:expr) => {
        $crate::VellumError::$variant {
            message: format!("{}", $msg),
            ctx: $crate::ErrorContext::none(),
            source: None,
        }
    };
    ($variant:ident, $msg:expr, $($arg:expr),+) => {
        $crate::VellumError::$variant {
            message: format!($msg, $($arg),+),
            ctx: $crate::ErrorContext::none(),
            source: None,
        }
    };
}

/// Constructs a `VellumError` variant with a message, a shared source and a
/// span, plus optionally a help line and related labels.
#[macro_export]
macro_rules! err_ctx {
    ($variant:ident, $msg:expr, $src:expr, $span:expr, $help:expr, $related:expr) => {
        $crate::VellumError::$variant {
            message: $msg.to_string(),
            ctx: $crate::ErrorContext {
                source: Some($crate::diagnostics::SourceArc::clone($src)),
                span: Some($span),
                help: Some(format!("{}", $help)),
                related: $related,
            },
            source: None,
        }
    };
    ($variant:ident, $msg:expr, $src:expr, $span:expr, $help:expr) => {
        $crate::VellumError::$variant {
            message: $msg.to_string(),
            ctx: $crate::ErrorContext {
                source: Some($crate::diagnostics::SourceArc::clone($src)),
                span: Some($span),
                help: Some(format!("{}", $help)),
                related: vec![],
            },
            source: None,
        }
    };
    ($variant:ident, $msg:expr, $src:expr, $span:expr) => {
        $crate::VellumError::$variant {
            message: $msg.to_string(),
            ctx: $crate::ErrorContext {
                source: Some($crate::diagnostics::SourceArc::clone($src)),
                span: Some($span),
                help: None,
                related: vec![],
            },
            source: None,
        }
    };
}
