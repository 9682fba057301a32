//! The script-evaluation seam of the template engine.
//!
//! Inline and block template elements contain host-language code. The core
//! never evaluates it: it hands the code, the current bindings and an
//! `emit` callback to an injected [`ScriptEvaluator`] and consumes whatever
//! text comes back. The crate ships only [`NullEvaluator`], which fails;
//! wiring up a real interpreter is a collaborator's job.

use std::collections::BTreeMap;

use crate::markup::options::{write_options, OptionsMap};

/// A value bound to a template variable.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// Plain text (macro argument source, literal values).
    Text(String),
    /// An invocation's option map, rendered as `key=value,...` when
    /// substituted textually.
    Options(OptionsMap),
}

impl std::fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateValue::Text(text) => f.write_str(text),
            TemplateValue::Options(opts) => f.write_str(&write_options(opts)),
        }
    }
}

/// Per-render variable bindings, threaded into every evaluation; there is
/// no process-wide environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateBindings {
    values: BTreeMap<String, TemplateValue>,
}

impl TemplateBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(name.into(), TemplateValue::Text(value.into()));
    }

    pub fn insert_options(&mut self, name: impl Into<String>, options: OptionsMap) {
        self.values
            .insert(name.into(), TemplateValue::Options(options));
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TemplateValue)> {
        self.values.iter()
    }
}

/// Evaluates inline expressions and statement blocks embedded in templates.
///
/// `emit` may be called any number of times to append text to the render
/// result; an inline evaluation additionally returns its value as text.
/// Errors are plain strings; the template renderer wraps them into a
/// `TemplateRender` diagnostic carrying the element's span.
pub trait ScriptEvaluator {
    fn eval_inline(
        &mut self,
        code: &str,
        bindings: &TemplateBindings,
        emit: &mut dyn FnMut(&str),
    ) -> Result<String, String>;

    fn eval_block(
        &mut self,
        code: &str,
        bindings: &TemplateBindings,
        emit: &mut dyn FnMut(&str),
    ) -> Result<(), String>;
}

/// The default evaluator: refuses all code. Documents with inline/block
/// template elements require a real evaluator from the embedder.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvaluator;

impl ScriptEvaluator for NullEvaluator {
    fn eval_inline(
        &mut self,
        _code: &str,
        _bindings: &TemplateBindings,
        _emit: &mut dyn FnMut(&str),
    ) -> Result<String, String> {
        Err("no script evaluator is configured".to_string())
    }

    fn eval_block(
        &mut self,
        _code: &str,
        _bindings: &TemplateBindings,
        _emit: &mut dyn FnMut(&str),
    ) -> Result<(), String> {
        Err("no script evaluator is configured".to_string())
    }
}
