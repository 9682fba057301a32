//! Vellum: a macro-capable markup front end.
//!
//! Parses a LaTeX/Markdown-like authoring syntax into a typed markup tree
//! and expands user-defined text macros by rendering their templates and
//! re-parsing the result in place.

pub use crate::diagnostics::{print_error, ErrorContext, ErrorKind, SourceArc, VellumError};
pub use crate::lexer::pos::{SourcePos, Span};

pub mod diagnostics;
pub mod lexer;
pub mod macros;
pub mod markup;
pub mod parser;
pub mod processor;
pub mod template;
