//! User-defined macros: registration and expansion.
//!
//! A macro is a named command or environment with a fixed arity whose body
//! is a [`Template`]. Definitions are recorded during parsing
//! (`\defCommand` / `\defEnvironment`) into the root document's
//! [`MacroNamespace`]; every nested document (included file, macro
//! expansion sub-parse) holds a handle to the same table, so definitions
//! are visible to subsequently parsed siblings and sub-parses.
//!
//! Expansion renders the template against per-invocation bindings
//! (`_1.._n` bound to each argument's source text, `options` bound to the
//! invocation options), re-enters the structural parser on the rendered
//! text inside a transient document, recursively expands the result, and
//! hands back a replacement node that the caller splices in place of the
//! invocation. Each expansion uses an independent document, parser run and
//! bindings map; no parser state is shared between expansions, which is
//! what makes nested and re-entrant invocations safe.
//!
//! Self-referential macros are cut off by [`MAX_EXPANSION_DEPTH`]; errors
//! during expansion are attributed to the invocation span, not the macro
//! definition.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::SourceArc;
use crate::lexer::pos::Span;
use crate::markup::source::write_arg;
use crate::markup::{Command, Document, DocumentKind, Environment, Markup};
use crate::parser::Parser;
use crate::template::{ScriptEvaluator, Template, TemplateBindings};
use crate::{err_ctx, VellumError};

/// Maximum depth of re-entrant macro expansion. A macro whose template
/// (directly or indirectly) invokes itself hits this bound instead of
/// diverging.
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// A `\defCommand` registration: fixed-arity command template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroCommandDef {
    pub name: String,
    pub arity: usize,
    pub template: Template,
    /// Where the definition appeared (for duplicate/introspection tooling;
    /// expansion errors point at the invocation instead).
    pub span: Span,
}

/// A `\defEnvironment` registration: header and footer templates rendered
/// independently against the same per-invocation bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroEnvDef {
    pub name: String,
    pub arity: usize,
    pub header: Template,
    pub footer: Template,
    pub span: Span,
}

/// The macro namespace: one mutable table owned by the root document and
/// borrowed by reference from all descendants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroNamespace {
    commands: HashMap<String, MacroCommandDef>,
    environments: HashMap<String, MacroEnvDef>,
}

/// Shared handle to a namespace. The parse is single-threaded, so interior
/// mutability through `RefCell` is all the sharing discipline needed.
pub type MacroNamespaceRef = Rc<RefCell<MacroNamespace>>;

impl MacroNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_ref() -> MacroNamespaceRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Registers a command macro, returning the displaced definition if the
    /// name was already bound (redefinition is allowed, last one wins).
    pub fn register_command(&mut self, def: MacroCommandDef) -> Option<MacroCommandDef> {
        self.commands.insert(def.name.clone(), def)
    }

    pub fn register_environment(&mut self, def: MacroEnvDef) -> Option<MacroEnvDef> {
        self.environments.insert(def.name.clone(), def)
    }

    pub fn command(&self, name: &str) -> Option<&MacroCommandDef> {
        self.commands.get(name)
    }

    pub fn environment(&self, name: &str) -> Option<&MacroEnvDef> {
        self.environments.get(name)
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn has_environment(&self, name: &str) -> bool {
        self.environments.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.environments.is_empty()
    }

    pub fn command_names(&self) -> impl Iterator<Item = &String> {
        self.commands.keys()
    }

    pub fn environment_names(&self) -> impl Iterator<Item = &String> {
        self.environments.keys()
    }
}

/// Builds the per-invocation bindings shared by every render of one
/// expansion: `_1.._n` carry each argument's source text, `options` the
/// invocation's option map.
fn invocation_bindings<'a>(
    args: impl Iterator<Item = &'a crate::markup::Arg>,
    options: &crate::markup::OptionsMap,
) -> TemplateBindings {
    let mut bindings = TemplateBindings::new();
    for (index, arg) in args.enumerate() {
        bindings.insert_text(format!("_{}", index + 1), write_arg(arg));
    }
    bindings.insert_options("options", options.clone());
    bindings
}

fn depth_check(
    depth: usize,
    name: &str,
    src: &SourceArc,
    span: Span,
) -> Result<(), VellumError> {
    if depth >= MAX_EXPANSION_DEPTH {
        return Err(err_ctx!(
            MacroArity,
            format!(
                "Macro expansion of '{}' exceeded depth {} (self-referential macro?)",
                name, MAX_EXPANSION_DEPTH
            ),
            src,
            span
        ));
    }
    Ok(())
}

/// Expands one command macro invocation. Returns the replacement node: a
/// transient `MacroCommand` document hosting the re-parsed, recursively
/// expanded rendering.
pub fn expand_command(
    def: &MacroCommandDef,
    cmd: &Command,
    src: &SourceArc,
    namespace: &MacroNamespaceRef,
    parser: &Parser,
    evaluator: &mut dyn ScriptEvaluator,
    depth: usize,
) -> Result<Markup, VellumError> {
    depth_check(depth, &def.name, src, cmd.span)?;
    let given = cmd.arity();
    if given != def.arity {
        return Err(err_ctx!(
            MacroArity,
            format!(
                "Wrong arity for macro command '\\{}': expected {}, given {}",
                def.name, def.arity, given
            ),
            src,
            cmd.span
        ));
    }
    let bindings = invocation_bindings(cmd.arguments(), &cmd.options);
    let rendered = def
        .template
        .render(&bindings, evaluator)
        .map_err(|err| err.attributed_to(SourceArc::clone(src), cmd.span))?;

    let mut doc = parser
        .parse_nested(
            &rendered,
            &format!("<macro-command:{}>", def.name),
            DocumentKind::MacroCommand,
            Rc::clone(namespace),
        )
        .map_err(|err| err.attributed_to(SourceArc::clone(src), cmd.span))?;
    doc.span = cmd.span;

    let doc_src = SourceArc::clone(&doc.src);
    expand_children(&mut doc.content, &doc_src, namespace, parser, evaluator, depth + 1)?;
    Ok(Markup::Document(doc))
}

/// Expands one environment macro invocation. Header and footer render
/// independently against the same bindings computed once at header time;
/// the replacement wraps the rendered header fragment, the original body
/// and the rendered footer fragment.
pub fn expand_environment(
    def: &MacroEnvDef,
    env: Environment,
    src: &SourceArc,
    namespace: &MacroNamespaceRef,
    parser: &Parser,
    evaluator: &mut dyn ScriptEvaluator,
    depth: usize,
) -> Result<Markup, VellumError> {
    depth_check(depth, &def.name, src, env.span)?;
    let given = env.arity();
    if given != def.arity {
        return Err(err_ctx!(
            MacroArity,
            format!(
                "Wrong arity for macro environment '{}': expected {}, given {}",
                def.name, def.arity, given
            ),
            src,
            env.span
        ));
    }
    let bindings = invocation_bindings(env.arguments(), &env.options);

    let mut render_fragment = |template: &Template,
                               label: &str,
                               kind: DocumentKind|
     -> Result<Document, VellumError> {
        let rendered = template
            .render(&bindings, evaluator)
            .map_err(|err| err.attributed_to(SourceArc::clone(src), env.span))?;
        let mut doc = parser
            .parse_nested(
                &rendered,
                &format!("<macro-env-{}:{}>", label, def.name),
                kind,
                Rc::clone(namespace),
            )
            .map_err(|err| err.attributed_to(SourceArc::clone(src), env.span))?;
        doc.span = env.span;
        let doc_src = SourceArc::clone(&doc.src);
        expand_children(&mut doc.content, &doc_src, namespace, parser, evaluator, depth + 1)?;
        Ok(doc)
    };

    let header_doc = render_fragment(&def.header, "header", DocumentKind::MacroEnvHeader)?;
    let footer_doc = render_fragment(&def.footer, "footer", DocumentKind::MacroEnvFooter)?;

    // The body is original user text: nested macros in it expand at the
    // current depth, before the move into the wrapper.
    let arity = def.arity;
    let span = env.span;
    let mut body: Vec<Markup> = env.content.into_iter().skip(arity).collect();
    expand_children(&mut body, src, namespace, parser, evaluator, depth)?;

    let mut wrapper = Document::new_nested(
        DocumentKind::MacroEnv,
        format!("<macro-env:{}>", def.name),
        Rc::clone(namespace),
    );
    wrapper.span = span;
    wrapper.src = SourceArc::clone(src);
    wrapper.content.push(Markup::Document(header_doc));
    wrapper.content.extend(body);
    wrapper.content.push(Markup::Document(footer_doc));
    Ok(Markup::Document(wrapper))
}

/// Expands every registered macro invocation in a finished document, in
/// place. Convenience for pipelines that do not register custom processors
/// (the document processor reaches the same behavior through its fallback).
pub fn expand_document(
    doc: &mut Document,
    parser: &Parser,
    evaluator: &mut dyn ScriptEvaluator,
) -> Result<(), VellumError> {
    let namespace = Rc::clone(&doc.namespace);
    let src = SourceArc::clone(&doc.src);
    expand_children(&mut doc.content, &src, &namespace, parser, evaluator, 0)
}

/// Walks a child list, replacing macro invocations and descending into
/// everything else.
fn expand_children(
    children: &mut Vec<Markup>,
    src: &SourceArc,
    namespace: &MacroNamespaceRef,
    parser: &Parser,
    evaluator: &mut dyn ScriptEvaluator,
    depth: usize,
) -> Result<(), VellumError> {
    enum Action {
        ExpandCommand(MacroCommandDef),
        ExpandEnvironment(MacroEnvDef),
        Descend,
    }

    for index in 0..children.len() {
        // Clone the definition out of the namespace before expanding: the
        // expansion itself may register further macros.
        let action = match &children[index] {
            Markup::Command(cmd) if !cmd.preformated => namespace
                .borrow()
                .command(&cmd.name)
                .cloned()
                .map_or(Action::Descend, Action::ExpandCommand),
            Markup::Environment(env) => namespace
                .borrow()
                .environment(&env.name)
                .cloned()
                .map_or(Action::Descend, Action::ExpandEnvironment),
            _ => Action::Descend,
        };
        match action {
            Action::ExpandCommand(def) => {
                let replacement = {
                    let Markup::Command(cmd) = &children[index] else {
                        unreachable!("action chosen from a command node")
                    };
                    expand_command(&def, cmd, src, namespace, parser, evaluator, depth)?
                };
                children[index] = replacement;
            }
            Action::ExpandEnvironment(def) => {
                let placeholder = Markup::Skip(children[index].span());
                let Markup::Environment(env) =
                    std::mem::replace(&mut children[index], placeholder)
                else {
                    unreachable!("action chosen from an environment node")
                };
                children[index] =
                    expand_environment(&def, env, src, namespace, parser, evaluator, depth)?;
            }
            Action::Descend => {
                descend(&mut children[index], src, namespace, parser, evaluator, depth)?;
            }
        }
    }
    Ok(())
}

fn descend(
    node: &mut Markup,
    src: &SourceArc,
    namespace: &MacroNamespaceRef,
    parser: &Parser,
    evaluator: &mut dyn ScriptEvaluator,
    depth: usize,
) -> Result<(), VellumError> {
    match node {
        Markup::Document(doc) => {
            // Nested documents carry their own source text for attribution.
            let doc_src = SourceArc::clone(&doc.src);
            let doc_ns = Rc::clone(&doc.namespace);
            expand_children(&mut doc.content, &doc_src, &doc_ns, parser, evaluator, depth)
        }
        Markup::Section(sec) => {
            expand_children(&mut sec.content, src, namespace, parser, evaluator, depth)
        }
        Markup::Environment(env) => {
            expand_children(&mut env.content, src, namespace, parser, evaluator, depth)
        }
        Markup::Command(cmd) => {
            expand_children(&mut cmd.content, src, namespace, parser, evaluator, depth)
        }
        Markup::CommandArg(arg) | Markup::EnvArg(arg) => {
            expand_children(&mut arg.content, src, namespace, parser, evaluator, depth)
        }
        Markup::Text(_)
        | Markup::Preformatted(_)
        | Markup::Spaces(_)
        | Markup::Newlines(_)
        | Markup::Skip(_) => Ok(()),
    }
}
