//! The document processor.
//!
//! A thin, mechanical consumer of the finished tree: it walks containers in
//! source order and dispatches commands, environments and sections to
//! registered handlers, which may keep, replace or delete the node in
//! place. Replacement happens at the node's `(parent, index)` slot through
//! [`Markup::replace_child`]-equivalent vector writes; deletion leaves a
//! `Skip` tombstone so sibling indices stay stable.
//!
//! When no handler is registered for a command or environment, the
//! processor looks the name up in the root macro namespace and expands it
//! if defined; this is how macro expansion is actually driven. Names with
//! neither handler nor definition pass through untouched for downstream
//! generators.

use std::collections::HashMap;
use std::rc::Rc;

use crate::diagnostics::SourceArc;
use crate::err_msg;
use crate::macros::{expand_command, expand_environment, MacroNamespaceRef};
use crate::markup::{Command, Document, Environment, Markup, Preformatted, Run, Section, Text};
use crate::parser::Parser;
use crate::template::{NullEvaluator, ScriptEvaluator};
use crate::VellumError;

/// What a handler wants done with the node it processed.
#[derive(Debug)]
pub enum Transform {
    /// Leave the node as it is.
    Keep,
    /// Replace the node in place.
    Replace(Markup),
    /// Replace the node and process the replacement too.
    ReplaceRecursive(Markup),
    /// Delete the node, leaving a `Skip` tombstone.
    Delete,
}

/// Handler for a named command. `enter` runs before the command's content
/// is processed, `process` after.
pub trait CommandHandler {
    fn enter_command(&mut self, _cmd: &Command) {}

    fn process_command(&mut self, _cmd: &mut Command) -> Result<Transform, VellumError> {
        Ok(Transform::Keep)
    }
}

/// Handler for a named environment.
pub trait EnvironmentHandler {
    fn enter_environment(&mut self, _env: &Environment) {}

    fn process_environment(&mut self, _env: &mut Environment) -> Result<Transform, VellumError> {
        Ok(Transform::Keep)
    }
}

/// Handler for sections, registered per depth or globally.
pub trait SectionHandler {
    fn enter_section(&mut self, _sec: &Section) {}

    fn process_section(&mut self, _sec: &mut Section) -> Result<Transform, VellumError> {
        Ok(Transform::Keep)
    }
}

/// Optional leaf rewriters. Returning `None` keeps the leaf.
pub trait TextHandler {
    fn process_text(&mut self, text: &Text) -> Option<Markup>;
}

pub trait PreformattedHandler {
    fn process_preformatted(&mut self, pre: &Preformatted) -> Option<Markup>;
}

pub trait WhitespaceHandler {
    fn process_spaces(&mut self, _run: &Run) -> Option<Markup> {
        None
    }

    fn process_newlines(&mut self, _run: &Run) -> Option<Markup> {
        None
    }
}

/// Walk-and-mutate processor over a parsed document.
pub struct DocumentProcessor<'a> {
    parser: &'a Parser,
    evaluator: Box<dyn ScriptEvaluator + 'a>,
    cmd_handlers: HashMap<String, Box<dyn CommandHandler + 'a>>,
    env_handlers: HashMap<String, Box<dyn EnvironmentHandler + 'a>>,
    sec_handlers: HashMap<i32, Box<dyn SectionHandler + 'a>>,
    global_sec_handler: Option<Box<dyn SectionHandler + 'a>>,
    text_handler: Option<Box<dyn TextHandler + 'a>>,
    pre_handler: Option<Box<dyn PreformattedHandler + 'a>>,
    whitespace_handler: Option<Box<dyn WhitespaceHandler + 'a>>,
}

impl<'a> DocumentProcessor<'a> {
    /// A processor with no script evaluator: macros whose templates contain
    /// inline/block code will fail to render.
    pub fn new(parser: &'a Parser) -> Self {
        Self::with_evaluator(parser, Box::new(NullEvaluator))
    }

    pub fn with_evaluator(parser: &'a Parser, evaluator: Box<dyn ScriptEvaluator + 'a>) -> Self {
        Self {
            parser,
            evaluator,
            cmd_handlers: HashMap::new(),
            env_handlers: HashMap::new(),
            sec_handlers: HashMap::new(),
            global_sec_handler: None,
            text_handler: None,
            pre_handler: None,
            whitespace_handler: None,
        }
    }

    pub fn register_command_handler(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn CommandHandler + 'a>,
    ) -> Result<(), VellumError> {
        let name = name.into();
        if self.cmd_handlers.contains_key(&name) {
            return Err(err_msg!(
                Process,
                "Handler for command '{}' already registered",
                name
            ));
        }
        self.cmd_handlers.insert(name, handler);
        Ok(())
    }

    pub fn register_environment_handler(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn EnvironmentHandler + 'a>,
    ) -> Result<(), VellumError> {
        let name = name.into();
        if self.env_handlers.contains_key(&name) {
            return Err(err_msg!(
                Process,
                "Handler for environment '{}' already registered",
                name
            ));
        }
        self.env_handlers.insert(name, handler);
        Ok(())
    }

    pub fn register_section_handler(
        &mut self,
        depth: i32,
        handler: Box<dyn SectionHandler + 'a>,
    ) -> Result<(), VellumError> {
        if self.sec_handlers.contains_key(&depth) {
            return Err(err_msg!(
                Process,
                "Handler for section depth {} already registered",
                depth
            ));
        }
        self.sec_handlers.insert(depth, handler);
        Ok(())
    }

    /// A handler for every section depth; per-depth handlers take priority.
    pub fn register_global_section_handler(
        &mut self,
        handler: Box<dyn SectionHandler + 'a>,
    ) -> Result<(), VellumError> {
        if self.global_sec_handler.is_some() {
            return Err(err_msg!(Process, "Global section handler already registered"));
        }
        self.global_sec_handler = Some(handler);
        Ok(())
    }

    pub fn set_text_handler(&mut self, handler: Box<dyn TextHandler + 'a>) {
        self.text_handler = Some(handler);
    }

    pub fn set_preformatted_handler(&mut self, handler: Box<dyn PreformattedHandler + 'a>) {
        self.pre_handler = Some(handler);
    }

    pub fn set_whitespace_handler(&mut self, handler: Box<dyn WhitespaceHandler + 'a>) {
        self.whitespace_handler = Some(handler);
    }

    /// Processes the whole document in place.
    pub fn process(&mut self, doc: &mut Document) -> Result<(), VellumError> {
        let src = SourceArc::clone(&doc.src);
        let namespace = Rc::clone(&doc.namespace);
        self.process_children(&mut doc.content, &src, &namespace)
    }

    fn section_handler(&mut self, depth: i32) -> Option<&mut Box<dyn SectionHandler + 'a>> {
        if self.sec_handlers.contains_key(&depth) {
            return self.sec_handlers.get_mut(&depth);
        }
        self.global_sec_handler.as_mut()
    }

    fn process_children(
        &mut self,
        children: &mut Vec<Markup>,
        src: &SourceArc,
        namespace: &MacroNamespaceRef,
    ) -> Result<(), VellumError> {
        let mut index = 0;
        while index < children.len() {
            let mut transform = Transform::Keep;
            // Environment macro expansion needs the node by value; decided
            // here, performed after the borrow of the child ends.
            let mut env_macro = None;
            match &mut children[index] {
                Markup::Document(doc) => {
                    let doc_src = SourceArc::clone(&doc.src);
                    let doc_ns = Rc::clone(&doc.namespace);
                    self.process_children(&mut doc.content, &doc_src, &doc_ns)?;
                }
                Markup::Section(sec) => {
                    if let Some(handler) = self.section_handler(sec.depth) {
                        handler.enter_section(sec);
                    }
                    self.process_children(&mut sec.content, src, namespace)?;
                    if let Some(handler) = self.section_handler(sec.depth) {
                        transform = handler.process_section(sec)?;
                    }
                }
                Markup::Command(cmd) => {
                    if let Some(handler) = self.cmd_handlers.get_mut(&cmd.name) {
                        handler.enter_command(cmd);
                    }
                    if !cmd.preformated {
                        self.process_children(&mut cmd.content, src, namespace)?;
                    }
                    if let Some(handler) = self.cmd_handlers.get_mut(&cmd.name) {
                        transform = handler.process_command(cmd)?;
                    } else if !cmd.preformated {
                        let def = namespace.borrow().command(&cmd.name).cloned();
                        if let Some(def) = def {
                            transform = Transform::ReplaceRecursive(expand_command(
                                &def,
                                cmd,
                                src,
                                namespace,
                                self.parser,
                                self.evaluator.as_mut(),
                                0,
                            )?);
                        }
                    }
                }
                Markup::Environment(env) => {
                    if let Some(handler) = self.env_handlers.get_mut(&env.name) {
                        handler.enter_environment(env);
                    }
                    self.process_children(&mut env.content, src, namespace)?;
                    if let Some(handler) = self.env_handlers.get_mut(&env.name) {
                        transform = handler.process_environment(env)?;
                    } else {
                        env_macro = namespace.borrow().environment(&env.name).cloned();
                    }
                }
                Markup::CommandArg(arg) | Markup::EnvArg(arg) => {
                    self.process_children(&mut arg.content, src, namespace)?;
                }
                Markup::Text(text) => {
                    if let Some(handler) = &mut self.text_handler {
                        if let Some(replacement) = handler.process_text(text) {
                            transform = Transform::Replace(replacement);
                        }
                    }
                }
                Markup::Preformatted(pre) => {
                    if let Some(handler) = &mut self.pre_handler {
                        if let Some(replacement) = handler.process_preformatted(pre) {
                            transform = Transform::Replace(replacement);
                        }
                    }
                }
                Markup::Spaces(run) => {
                    if let Some(handler) = &mut self.whitespace_handler {
                        if let Some(replacement) = handler.process_spaces(run) {
                            transform = Transform::Replace(replacement);
                        }
                    }
                }
                Markup::Newlines(run) => {
                    if let Some(handler) = &mut self.whitespace_handler {
                        if let Some(replacement) = handler.process_newlines(run) {
                            transform = Transform::Replace(replacement);
                        }
                    }
                }
                Markup::Skip(_) => {}
            }
            if let Some(def) = env_macro {
                let placeholder = Markup::Skip(children[index].span());
                let Markup::Environment(env) =
                    std::mem::replace(&mut children[index], placeholder)
                else {
                    unreachable!("environment macro chosen from an environment node")
                };
                transform = Transform::ReplaceRecursive(expand_environment(
                    &def,
                    env,
                    src,
                    namespace,
                    self.parser,
                    self.evaluator.as_mut(),
                    0,
                )?);
            }
            match transform {
                Transform::Keep => index += 1,
                Transform::Replace(node) => {
                    children[index] = node;
                    index += 1;
                }
                Transform::ReplaceRecursive(node) => {
                    // Re-process the replacement at the same slot.
                    children[index] = node;
                }
                Transform::Delete => {
                    let span = children[index].span();
                    children[index] = Markup::Skip(span);
                    index += 1;
                }
            }
        }
        Ok(())
    }
}
