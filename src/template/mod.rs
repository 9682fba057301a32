//! The template engine.
//!
//! A template is compiled once into an ordered list of elements (literal
//! text, variable references, inline expressions and statement blocks)
//! and rendered against per-invocation bindings. Escape recognition is
//! driven by configurable sigils; the defaults are `$var`, `%expr%` and
//! `%{ statements %}`, and the macro subsystem swaps the variable sigil for
//! `#` so `#1` names the first positional argument.
//!
//! Escape forms:
//! - variable: sigil + identifier. The identifier is the longest prefix of
//!   the following printable run that is a valid identifier or decimal;
//!   decimals are normalized to `_n` (positional arguments).
//! - inline: sigil … sigil, one expression evaluated for its value.
//! - block: sigil+open … sigil+close, statements that may call
//!   `emit(text)` to append to the render result.
//! - a doubled sigil is the escape for one literal sigil character.
//!
//! Rendering inline/block code goes through the injected
//! [`ScriptEvaluator`] capability; the core never evaluates host code.

pub mod eval;

use serde::{Deserialize, Serialize};

use crate::diagnostics::SourceArc;
use crate::lexer::pos::{SourcePos, Span};
use crate::{err_ctx, err_msg, VellumError};

pub use eval::{NullEvaluator, ScriptEvaluator, TemplateBindings, TemplateValue};

/// Escape sigil configuration for template compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSigils {
    pub var: char,
    pub inline: char,
    pub block: char,
    pub block_open: char,
    pub block_close: char,
    /// Name under which the emit capability is exposed to scripts.
    pub emit_name: String,
}

impl Default for TemplateSigils {
    fn default() -> Self {
        Self {
            var: '$',
            inline: '%',
            block: '%',
            block_open: '{',
            block_close: '}',
            emit_name: "emit".to_string(),
        }
    }
}

impl TemplateSigils {
    /// The configuration used for macro templates: `#1` references the
    /// first positional argument.
    pub fn for_macros() -> Self {
        Self {
            var: '#',
            ..Self::default()
        }
    }

    /// Rejects ambiguous configurations (sigils must be distinguishable).
    pub fn validate(&self) -> Result<(), VellumError> {
        let distinct = [
            (self.var != self.inline, "variable and inline sigils"),
            (self.var != self.block, "variable and block sigils"),
            (self.block_open != self.inline, "block opener and inline sigil"),
            (self.block_close != self.inline, "block closer and inline sigil"),
            (self.block_open != self.block, "block opener and block sigil"),
            (self.block_close != self.block, "block closer and block sigil"),
        ];
        for (ok, what) in distinct {
            if !ok {
                return Err(err_msg!(
                    TemplateCompile,
                    "Template sigils must differ: {}",
                    what
                ));
            }
        }
        Ok(())
    }
}

/// One compiled template element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateElement {
    Literal {
        text: String,
        span: Span,
    },
    Variable {
        name: String,
        span: Span,
    },
    Inline {
        code: String,
        span: Span,
    },
    Block {
        code: String,
        span: Span,
        /// Column the block opener started in; emitted lines are re-indented
        /// to it so multi-line output lines up with the template.
        start_column: u32,
    },
}

impl TemplateElement {
    pub fn span(&self) -> Span {
        match self {
            TemplateElement::Literal { span, .. }
            | TemplateElement::Variable { span, .. }
            | TemplateElement::Inline { span, .. }
            | TemplateElement::Block { span, .. } => *span,
        }
    }
}

/// A compiled template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    source: String,
    sigils: TemplateSigils,
    elements: Vec<TemplateElement>,
    #[serde(skip, default = "default_template_src")]
    src: SourceArc,
}

fn default_template_src() -> SourceArc {
    crate::diagnostics::to_error_source("<template>", "")
}

struct Compiler<'a> {
    chars: Vec<char>,
    index: usize,
    pos: SourcePos,
    sigils: &'a TemplateSigils,
    src: &'a SourceArc,
    elements: Vec<TemplateElement>,
}

impl Template {
    /// Compiles `source` with the default sigils, anchored at the start of
    /// its own virtual source. Convenient for standalone templates.
    pub fn compile(source: &str) -> Result<Template, VellumError> {
        let src = crate::diagnostics::to_error_source("<template>", source);
        Self::compile_with(source, TemplateSigils::default(), &src, SourcePos::start())
    }

    /// Compiles `source` with explicit sigils, attributing element spans to
    /// `src` starting at `base_pos` (the position of the template text
    /// inside the enclosing document).
    pub fn compile_with(
        source: &str,
        sigils: TemplateSigils,
        src: &SourceArc,
        base_pos: SourcePos,
    ) -> Result<Template, VellumError> {
        sigils.validate()?;
        let mut compiler = Compiler {
            chars: source.chars().collect(),
            index: 0,
            pos: base_pos,
            sigils: &sigils,
            src,
            elements: Vec::new(),
        };
        compiler.run()?;
        Ok(Template {
            source: source.to_string(),
            sigils: sigils.clone(),
            elements: compiler.elements,
            src: SourceArc::clone(src),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn elements(&self) -> &[TemplateElement] {
        &self.elements
    }

    /// True when rendering needs no script evaluator.
    pub fn is_literal_only(&self) -> bool {
        self.elements.iter().all(|el| {
            matches!(
                el,
                TemplateElement::Literal { .. } | TemplateElement::Variable { .. }
            )
        })
    }

    /// Renders the template against `bindings`, delegating inline/block
    /// code to `evaluator`.
    pub fn render(
        &self,
        bindings: &TemplateBindings,
        evaluator: &mut dyn ScriptEvaluator,
    ) -> Result<String, VellumError> {
        let mut out = String::new();
        for element in &self.elements {
            match element {
                TemplateElement::Literal { text, .. } => out.push_str(text),
                TemplateElement::Variable { name, span } => match bindings.get(name) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => {
                        return Err(err_ctx!(
                            TemplateRender,
                            format!("Variable '{}' not bound", name),
                            &self.src,
                            *span
                        ));
                    }
                },
                TemplateElement::Inline { code, span } => {
                    let mut emitted = String::new();
                    let value = evaluator
                        .eval_inline(code, bindings, &mut |text| emitted.push_str(text))
                        .map_err(|reason| {
                            err_ctx!(TemplateRender, reason, &self.src, *span)
                        })?;
                    out.push_str(&emitted);
                    out.push_str(&value);
                }
                TemplateElement::Block {
                    code,
                    span,
                    start_column,
                } => {
                    let mut emitted = String::new();
                    evaluator
                        .eval_block(code, bindings, &mut |text| emitted.push_str(text))
                        .map_err(|reason| {
                            err_ctx!(TemplateRender, reason, &self.src, *span)
                        })?;
                    out.push_str(&reindent(&emitted, *start_column));
                }
            }
        }
        Ok(out)
    }
}

/// Indents every line after the first to the block's starting column.
fn reindent(text: &str, start_column: u32) -> String {
    if start_column <= 1 {
        return text.to_string();
    }
    let indent = " ".repeat(start_column as usize - 1);
    let pieces: Vec<&str> = text.split_inclusive('\n').collect();
    pieces.join(&indent)
}

impl<'a> Compiler<'a> {
    fn run(&mut self) -> Result<(), VellumError> {
        let mut literal = String::new();
        let mut literal_start = self.pos;
        while let Some(ch) = self.peek() {
            let next = self.peek_ahead(1);
            let sig = self.sigils;
            if ch == sig.var && next == Some(sig.var) {
                literal.push(sig.var);
                self.bump();
                self.bump();
            } else if ch == sig.var && next.is_some() {
                self.flush_literal(&mut literal, &mut literal_start);
                self.parse_variable()?;
                literal_start = self.pos;
            } else if ch == sig.inline && next == Some(sig.inline) {
                literal.push(sig.inline);
                self.bump();
                self.bump();
            } else if ch == sig.block && next == Some(sig.block_open) {
                self.flush_literal(&mut literal, &mut literal_start);
                self.parse_block()?;
                literal_start = self.pos;
            } else if ch == sig.inline && next != Some(sig.block_open) {
                self.flush_literal(&mut literal, &mut literal_start);
                self.parse_inline()?;
                literal_start = self.pos;
            } else {
                literal.push(ch);
                self.bump();
            }
        }
        self.flush_literal(&mut literal, &mut literal_start);
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.index + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos = self.pos.advance_char(ch);
        self.index += 1;
        Some(ch)
    }

    fn flush_literal(&mut self, literal: &mut String, start: &mut SourcePos) {
        if !literal.is_empty() {
            self.elements.push(TemplateElement::Literal {
                text: std::mem::take(literal),
                span: Span::new(*start, self.pos),
            });
        }
        *start = self.pos;
    }

    /// Sigil + longest trailing run that is a valid identifier or decimal.
    fn parse_variable(&mut self) -> Result<(), VellumError> {
        let start = self.pos;
        self.bump(); // the sigil
        let mut run = String::new();
        let mut positions = vec![self.pos];
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch.is_control() {
                break;
            }
            run.push(ch);
            self.bump();
            positions.push(self.pos);
        }
        let mut keep = run.chars().count();
        while keep > 0 && !is_identifier(&take_chars(&run, keep)) && !is_decimal(&take_chars(&run, keep)) {
            keep -= 1;
        }
        if keep == 0 {
            return Err(err_ctx!(
                TemplateCompile,
                format!("Not a variable identifier: '{}'", run),
                self.src,
                Span::new(start, self.pos)
            ));
        }
        // Rewind past the rejected tail.
        let tail: String = run.chars().skip(keep).collect();
        self.index -= tail.chars().count();
        self.pos = positions[keep];
        let mut name = take_chars(&run, keep);
        if is_decimal(&name) {
            // Positional arguments are decimal references, bound as `_n`.
            name.insert(0, '_');
        }
        self.elements.push(TemplateElement::Variable {
            name,
            span: Span::new(start, self.pos),
        });
        Ok(())
    }

    /// Sigil … sigil, a single expression. A doubled sigil inside the code
    /// stands for one literal sigil character.
    fn parse_inline(&mut self) -> Result<(), VellumError> {
        let start = self.pos;
        let sig = self.sigils.inline;
        self.bump(); // opening sigil
        let mut code = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(err_ctx!(
                        TemplateCompile,
                        format!(
                            "Unexpected end of template within inline escape (missing closing {})",
                            sig
                        ),
                        self.src,
                        Span::new(start, self.pos)
                    ));
                }
                Some(ch) if ch == sig && self.peek_ahead(1) == Some(sig) => {
                    code.push(sig);
                    self.bump();
                    self.bump();
                }
                Some(ch) if ch == sig => {
                    self.bump();
                    break;
                }
                Some(ch) => {
                    code.push(ch);
                    self.bump();
                }
            }
        }
        self.elements.push(TemplateElement::Inline {
            code,
            span: Span::new(start, self.pos),
        });
        Ok(())
    }

    /// Sigil+open … sigil+close, multiple statements.
    fn parse_block(&mut self) -> Result<(), VellumError> {
        let start = self.pos;
        let sig = self.sigils.block;
        let close = self.sigils.block_close;
        self.bump(); // block sigil
        self.bump(); // block opener
        let mut code = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(err_ctx!(
                        TemplateCompile,
                        format!(
                            "Unexpected end of template within block escape (missing closing {}{})",
                            sig, close
                        ),
                        self.src,
                        Span::new(start, self.pos)
                    ));
                }
                Some(ch) if ch == sig && self.peek_ahead(1) == Some(close) => {
                    self.bump();
                    self.bump();
                    break;
                }
                Some(ch) => {
                    code.push(ch);
                    self.bump();
                }
            }
        }
        self.elements.push(TemplateElement::Block {
            code,
            span: Span::new(start, self.pos),
            start_column: start.column,
        });
        Ok(())
    }
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_literal(template: &Template) -> String {
        template
            .render(&TemplateBindings::new(), &mut NullEvaluator)
            .unwrap()
    }

    #[test]
    fn pure_literal_templates_are_render_stable() {
        for source in ["hello world", "no escapes here\nat all", ""] {
            let template = Template::compile(source).unwrap();
            assert_eq!(render_literal(&template), source);
        }
    }

    #[test]
    fn variable_lookup_and_doubled_sigil_escape() {
        let template =
            Template::compile("The value of myvar is '$myvar' obtained by $$myvar").unwrap();
        let mut bindings = TemplateBindings::new();
        bindings.insert_text("myvar", "42");
        let rendered = template.render(&bindings, &mut NullEvaluator).unwrap();
        assert_eq!(rendered, "The value of myvar is '42' obtained by $myvar");
    }

    #[test]
    fn alternate_variable_sigil() {
        let sigils = TemplateSigils {
            var: '?',
            ..TemplateSigils::default()
        };
        let src = crate::diagnostics::to_error_source("<template>", "v=?x.");
        let template =
            Template::compile_with("v=?x.", sigils, &src, SourcePos::start()).unwrap();
        let mut bindings = TemplateBindings::new();
        bindings.insert_text("x", "7");
        assert_eq!(
            template.render(&bindings, &mut NullEvaluator).unwrap(),
            "v=7."
        );
    }

    #[test]
    fn decimal_reference_normalizes_to_positional_name() {
        let src = crate::diagnostics::to_error_source("<template>", "brave #1 world");
        let template = Template::compile_with(
            "brave #1 world",
            TemplateSigils::for_macros(),
            &src,
            SourcePos::start(),
        )
        .unwrap();
        assert!(matches!(
            &template.elements()[1],
            TemplateElement::Variable { name, .. } if name == "_1"
        ));
        let mut bindings = TemplateBindings::new();
        bindings.insert_text("_1", "new");
        assert_eq!(
            template.render(&bindings, &mut NullEvaluator).unwrap(),
            "brave new world"
        );
    }

    #[test]
    fn identifier_is_longest_valid_prefix_of_the_run() {
        let template = Template::compile("'$myvar'!").unwrap();
        assert!(matches!(
            &template.elements()[1],
            TemplateElement::Variable { name, .. } if name == "myvar"
        ));
        // The rejected tail stays literal.
        assert!(matches!(
            &template.elements()[2],
            TemplateElement::Literal { text, .. } if text == "'!"
        ));
    }

    #[test]
    fn empty_variable_reference_fails_compilation() {
        let err = Template::compile("$ nope").unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::TemplateCompile);
    }

    #[test]
    fn unbound_variable_fails_rendering() {
        let template = Template::compile("$missing").unwrap();
        let err = template
            .render(&TemplateBindings::new(), &mut NullEvaluator)
            .unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::TemplateRender);
    }

    #[test]
    fn inline_and_block_elements_compile_with_spans() {
        let template = Template::compile("a %x + 1% b %{ emit(\"hi\") %} c").unwrap();
        let kinds: Vec<&str> = template
            .elements()
            .iter()
            .map(|el| match el {
                TemplateElement::Literal { .. } => "literal",
                TemplateElement::Variable { .. } => "variable",
                TemplateElement::Inline { .. } => "inline",
                TemplateElement::Block { .. } => "block",
            })
            .collect();
        assert_eq!(kinds, ["literal", "inline", "literal", "block", "literal"]);
        assert!(!template.is_literal_only());
    }

    #[test]
    fn unterminated_inline_escape_fails() {
        let err = Template::compile("a %x + 1").unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::TemplateCompile);
    }

    #[test]
    fn unterminated_block_escape_fails() {
        let err = Template::compile("%{ emit(1)").unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::TemplateCompile);
    }

    #[test]
    fn inline_and_block_route_through_the_evaluator() {
        struct Upper;
        impl ScriptEvaluator for Upper {
            fn eval_inline(
                &mut self,
                code: &str,
                _bindings: &TemplateBindings,
                _emit: &mut dyn FnMut(&str),
            ) -> Result<String, String> {
                Ok(code.trim().to_uppercase())
            }
            fn eval_block(
                &mut self,
                code: &str,
                _bindings: &TemplateBindings,
                emit: &mut dyn FnMut(&str),
            ) -> Result<(), String> {
                emit(code.trim());
                emit("!");
                Ok(())
            }
        }
        let template = Template::compile("[%ab%|%{cd%}]").unwrap();
        assert_eq!(
            template.render(&TemplateBindings::new(), &mut Upper).unwrap(),
            "[AB|cd!]"
        );
    }

    #[test]
    fn null_evaluator_rejects_code_elements() {
        let template = Template::compile("%1 + 1%").unwrap();
        let err = template
            .render(&TemplateBindings::new(), &mut NullEvaluator)
            .unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::TemplateRender);
    }

    #[test]
    fn block_output_is_reindented_to_its_column() {
        struct TwoLines;
        impl ScriptEvaluator for TwoLines {
            fn eval_inline(
                &mut self,
                _code: &str,
                _bindings: &TemplateBindings,
                _emit: &mut dyn FnMut(&str),
            ) -> Result<String, String> {
                unreachable!()
            }
            fn eval_block(
                &mut self,
                _code: &str,
                _bindings: &TemplateBindings,
                emit: &mut dyn FnMut(&str),
            ) -> Result<(), String> {
                emit("one\ntwo");
                Ok(())
            }
        }
        // Block starts at column 3, so continuation lines indent by 2.
        let template = Template::compile("ab%{x%}").unwrap();
        assert_eq!(
            template.render(&TemplateBindings::new(), &mut TwoLines).unwrap(),
            "abone\n  two"
        );
    }
}
