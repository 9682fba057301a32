// tests/template_tests.rs
//
// Template engine behavior observable through the public API: literal
// stability, sigil configuration, and evaluator routing.

use vellum::diagnostics::ErrorKind;
use vellum::template::{
    NullEvaluator, ScriptEvaluator, Template, TemplateBindings, TemplateSigils,
};

#[test]
fn literal_only_templates_reproduce_their_source() {
    for source in [
        "plain text",
        "multi\nline\ntext",
        "punctuation: {braces} [brackets] (parens)",
    ] {
        let template = Template::compile(source).unwrap();
        assert!(template.is_literal_only());
        let rendered = template
            .render(&TemplateBindings::new(), &mut NullEvaluator)
            .unwrap();
        assert_eq!(rendered, source);
    }
}

#[test]
fn variables_render_from_bindings() {
    let template = Template::compile("dear $name, welcome").unwrap();
    let mut bindings = TemplateBindings::new();
    bindings.insert_text("name", "Ada");
    assert_eq!(
        template.render(&bindings, &mut NullEvaluator).unwrap(),
        "dear Ada, welcome"
    );
}

#[test]
fn ambiguous_sigil_configuration_is_rejected() {
    let sigils = TemplateSigils {
        var: '%',
        ..TemplateSigils::default()
    };
    let src = vellum::diagnostics::to_error_source("<template>", "x");
    let err = Template::compile_with("x", sigils, &src, vellum::SourcePos::start())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateCompile);
}

#[test]
fn evaluator_sees_bindings_and_emit() {
    struct Echo;
    impl ScriptEvaluator for Echo {
        fn eval_inline(
            &mut self,
            code: &str,
            bindings: &TemplateBindings,
            emit: &mut dyn FnMut(&str),
        ) -> Result<String, String> {
            if code.trim() == "who" {
                emit("<");
                let who = bindings
                    .get("who")
                    .map(|value| value.to_string())
                    .ok_or_else(|| "who is unbound".to_string())?;
                Ok(format!("{}>", who))
            } else {
                Err(format!("unknown expression '{}'", code))
            }
        }

        fn eval_block(
            &mut self,
            _code: &str,
            _bindings: &TemplateBindings,
            emit: &mut dyn FnMut(&str),
        ) -> Result<(), String> {
            emit("block");
            Ok(())
        }
    }

    let template = Template::compile("a %who% b %{ignored%} c").unwrap();
    let mut bindings = TemplateBindings::new();
    bindings.insert_text("who", "me");
    assert_eq!(
        template.render(&bindings, &mut Echo).unwrap(),
        "a <me> b block c"
    );
}

#[test]
fn evaluation_failure_is_a_render_error() {
    struct Failing;
    impl ScriptEvaluator for Failing {
        fn eval_inline(
            &mut self,
            _code: &str,
            _bindings: &TemplateBindings,
            _emit: &mut dyn FnMut(&str),
        ) -> Result<String, String> {
            Err("boom".to_string())
        }

        fn eval_block(
            &mut self,
            _code: &str,
            _bindings: &TemplateBindings,
            _emit: &mut dyn FnMut(&str),
        ) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    let template = Template::compile("%anything%").unwrap();
    let err = template
        .render(&TemplateBindings::new(), &mut Failing)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateRender);
}
