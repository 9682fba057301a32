//! The markup tree.
//!
//! Parsing produces a tree of [`Markup`] nodes: a closed enum matched
//! exhaustively, so adding a node kind is a compile-time-checked change.
//! Containers (documents, sections, environments, commands, argument slots)
//! own their children in source order; leaves carry their text. Every node
//! owns the span of the text it was parsed from.
//!
//! The tree is append-only during construction. Later stages (the document
//! processor, macro splicing) mutate it only through
//! [`Markup::replace_child`], which keeps the "no dangling child references"
//! invariant checkable in one place.

pub mod options;
pub mod source;

use serde::{Deserialize, Serialize};

use crate::diagnostics::SourceArc;
use crate::lexer::pos::Span;
use crate::macros::{MacroNamespace, MacroNamespaceRef};

pub use options::{parse_options, write_options, OptionsMap};
pub use source::write_markup;

/// What role a document node plays in a parse.
///
/// Only `Root` documents own their macro namespace; every other kind holds a
/// handle to the root's table, so definitions made inside included files or
/// macro expansions are visible to subsequently parsed siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    /// The top-level parse result.
    Root,
    /// An included file (`\include{path}`).
    Sub,
    /// Transient host for a re-parse of a rendered command macro.
    MacroCommand,
    /// Transient host for a rendered environment macro header.
    MacroEnvHeader,
    /// Transient host for a rendered environment macro footer.
    MacroEnvFooter,
    /// Replacement for an expanded environment macro: rendered header
    /// fragment, original body, rendered footer fragment.
    MacroEnv,
}

/// A document: the root parsing context or a nested one (include, macro
/// expansion). Nested documents delegate macro namespace reads and writes
/// to the root through the shared handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub kind: DocumentKind,
    /// File name, or a synthetic label such as `<macro-command:hello>`.
    pub name: String,
    pub span: Span,
    #[serde(skip, default = "MacroNamespace::new_ref")]
    pub namespace: MacroNamespaceRef,
    /// The document's text as a shared named source, for diagnostics that
    /// outlive the parse (macro expansion attribution).
    #[serde(skip, default = "unknown_source")]
    pub src: SourceArc,
    pub content: Vec<Markup>,
}

fn unknown_source() -> SourceArc {
    crate::diagnostics::to_error_source("<unknown>", "")
}

impl Document {
    pub fn new_root(name: impl Into<String>) -> Self {
        Self {
            kind: DocumentKind::Root,
            name: name.into(),
            span: Span::default(),
            namespace: MacroNamespace::new_ref(),
            src: unknown_source(),
            content: Vec::new(),
        }
    }

    /// A nested document sharing `namespace` with its root.
    pub fn new_nested(
        kind: DocumentKind,
        name: impl Into<String>,
        namespace: MacroNamespaceRef,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            span: Span::default(),
            namespace,
            src: unknown_source(),
            content: Vec::new(),
        }
    }
}

/// A sectioning node. Sections nest by integer depth, not by explicit
/// closing markers: opening a section closes every open section of greater
/// or equal depth first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    /// Canonical sectioning name for the depth (`part` … `paragraph`).
    pub name: String,
    pub depth: i32,
    pub span: Span,
    pub content: Vec<Markup>,
}

/// A `\begin{name}...\end{name}` environment. The leading `EnvArg` children
/// of `content` are its bracketed arguments; the rest is the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub options: OptionsMap,
    pub span: Span,
    /// Bullet column for markdown-born list environments; `None` for
    /// explicit `\begin`/`\end` ones. Also the marker that forbids mixing
    /// the two list styles at one nesting point.
    pub markdown_indent: Option<usize>,
    pub content: Vec<Markup>,
}

impl Environment {
    /// The bracketed arguments collected before the body.
    pub fn arguments(&self) -> impl Iterator<Item = &Arg> {
        self.content.iter().map_while(|child| match child {
            Markup::EnvArg(arg) => Some(arg),
            _ => None,
        })
    }

    pub fn arity(&self) -> usize {
        self.arguments().count()
    }

    /// The body: everything after the leading argument slots.
    pub fn body(&self) -> &[Markup] {
        &self.content[self.arity()..]
    }
}

/// A `\name[options]{arg}...` command. The leading `CommandArg` children of
/// `content` are its arguments; synthetic commands (`emph`, `strong`,
/// markdown `item`) carry their content directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub options: OptionsMap,
    pub span: Span,
    /// Body was captured verbatim (`{{{ ... }}}`); the content is a single
    /// `Preformatted` leaf.
    pub preformated: bool,
    /// Born from a markdown list bullet rather than an explicit `\item`.
    pub markdown_item: bool,
    pub content: Vec<Markup>,
}

impl Command {
    pub fn arguments(&self) -> impl Iterator<Item = &Arg> {
        self.content.iter().map_while(|child| match child {
            Markup::CommandArg(arg) => Some(arg),
            _ => None,
        })
    }

    pub fn arity(&self) -> usize {
        self.arguments().count()
    }

    pub fn body(&self) -> &[Markup] {
        &self.content[self.arity()..]
    }
}

/// One bracketed `{...}` argument slot of a command or environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arg {
    pub span: Span,
    pub content: Vec<Markup>,
}

/// A run of ordinary text. Never merged with adjacent whitespace leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    pub span: Span,
}

/// Verbatim text: a backtick span (`lang == "inline"`) or the captured body
/// of a preformatted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preformatted {
    pub text: String,
    pub lang: String,
    pub span: Span,
}

/// A run of whitespace characters (spaces or newlines, one kind per leaf).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    pub span: Span,
}

impl Run {
    pub fn count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A markup tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Markup {
    Document(Document),
    Section(Section),
    Environment(Environment),
    Command(Command),
    CommandArg(Arg),
    EnvArg(Arg),
    Text(Text),
    Preformatted(Preformatted),
    Spaces(Run),
    Newlines(Run),
    /// Tombstone left where a processor deleted a node in place.
    Skip(Span),
}

impl Markup {
    pub fn span(&self) -> Span {
        match self {
            Markup::Document(doc) => doc.span,
            Markup::Section(sec) => sec.span,
            Markup::Environment(env) => env.span,
            Markup::Command(cmd) => cmd.span,
            Markup::CommandArg(arg) | Markup::EnvArg(arg) => arg.span,
            Markup::Text(text) => text.span,
            Markup::Preformatted(pre) => pre.span,
            Markup::Spaces(run) | Markup::Newlines(run) => run.span,
            Markup::Skip(span) => *span,
        }
    }

    /// Short name for error messages and tests.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Markup::Document(_) => "document",
            Markup::Section(_) => "section",
            Markup::Environment(_) => "environment",
            Markup::Command(_) => "command",
            Markup::CommandArg(_) => "command_arg",
            Markup::EnvArg(_) => "env_arg",
            Markup::Text(_) => "text",
            Markup::Preformatted(_) => "preformated",
            Markup::Spaces(_) => "spaces",
            Markup::Newlines(_) => "newlines",
            Markup::Skip(_) => "skip",
        }
    }

    /// The children of a container node, `None` for leaves.
    pub fn children(&self) -> Option<&[Markup]> {
        match self {
            Markup::Document(doc) => Some(&doc.content),
            Markup::Section(sec) => Some(&sec.content),
            Markup::Environment(env) => Some(&env.content),
            Markup::Command(cmd) => Some(&cmd.content),
            Markup::CommandArg(arg) | Markup::EnvArg(arg) => Some(&arg.content),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Markup>> {
        match self {
            Markup::Document(doc) => Some(&mut doc.content),
            Markup::Section(sec) => Some(&mut sec.content),
            Markup::Environment(env) => Some(&mut env.content),
            Markup::Command(cmd) => Some(&mut cmd.content),
            Markup::CommandArg(arg) | Markup::EnvArg(arg) => Some(&mut arg.content),
            _ => None,
        }
    }

    /// Appends a child to a container node.
    ///
    /// # Panics
    /// Panics if `self` is a leaf; construction code only ever appends to
    /// the container it just opened.
    pub fn append(&mut self, child: Markup) {
        self.children_mut()
            .expect("append target must be a container")
            .push(child);
    }

    /// Replaces the child at `index`, returning the old node. This is the
    /// only sanctioned in-place mutation of a finished tree (macro splicing
    /// and processor transforms).
    ///
    /// # Panics
    /// Panics if `self` is a leaf or `index` is out of bounds.
    pub fn replace_child(&mut self, index: usize, node: Markup) -> Markup {
        let children = self
            .children_mut()
            .expect("replace_child target must be a container");
        std::mem::replace(&mut children[index], node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::pos::SourcePos;

    fn leaf_text(text: &str) -> Markup {
        Markup::Text(Text {
            text: text.to_string(),
            span: Span::default(),
        })
    }

    fn arg_of(content: Vec<Markup>) -> Arg {
        Arg {
            span: Span::default(),
            content,
        }
    }

    #[test]
    fn command_arguments_are_leading_arg_children() {
        let cmd = Command {
            name: "title".to_string(),
            options: OptionsMap::new(),
            span: Span::default(),
            preformated: false,
            markdown_item: false,
            content: vec![
                Markup::CommandArg(arg_of(vec![leaf_text("a")])),
                Markup::CommandArg(arg_of(vec![leaf_text("b")])),
            ],
        };
        assert_eq!(cmd.arity(), 2);
        assert!(cmd.body().is_empty());
    }

    #[test]
    fn environment_body_excludes_arguments() {
        let env = Environment {
            name: "frame".to_string(),
            options: OptionsMap::new(),
            span: Span::default(),
            markdown_indent: None,
            content: vec![
                Markup::EnvArg(arg_of(vec![leaf_text("arg")])),
                leaf_text("body"),
            ],
        };
        assert_eq!(env.arity(), 1);
        assert_eq!(env.body().len(), 1);
        assert_eq!(env.body()[0].kind_name(), "text");
    }

    #[test]
    fn replace_child_swaps_in_place() {
        let mut doc = Markup::Document(Document::new_root("<test>"));
        doc.append(leaf_text("old"));
        let old = doc.replace_child(
            0,
            Markup::Skip(Span::at(SourcePos::start())),
        );
        assert_eq!(old.kind_name(), "text");
        assert_eq!(doc.children().unwrap()[0].kind_name(), "skip");
    }
}
