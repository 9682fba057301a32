// tests/parser_tests.rs
//
// Structural parser tests: token transitions, nesting invariants and
// failure modes, asserting on node kinds rather than rendered strings.

use vellum::diagnostics::ErrorKind;
use vellum::markup::{Document, Markup};
use vellum::parser::{IncludeLoader, Parser};

fn parse(input: &str) -> Document {
    Parser::new()
        .parse_str(input, "<test>")
        .expect("parse should succeed")
}

fn parse_err(input: &str) -> vellum::VellumError {
    Parser::new()
        .parse_str(input, "<test>")
        .expect_err("parse should fail")
}

fn kinds(children: &[Markup]) -> Vec<&'static str> {
    children.iter().map(Markup::kind_name).collect()
}

fn sections(children: &[Markup]) -> Vec<&vellum::markup::Section> {
    children
        .iter()
        .filter_map(|node| match node {
            Markup::Section(sec) => Some(sec),
            _ => None,
        })
        .collect()
}

fn first_command<'a>(children: &'a [Markup]) -> &'a vellum::markup::Command {
    children
        .iter()
        .find_map(|node| match node {
            Markup::Command(cmd) => Some(cmd),
            _ => None,
        })
        .expect("expected a command node")
}

// ---
// Sections
// ---

#[test]
fn section_of_equal_depth_becomes_a_sibling() {
    let doc = parse("\\section{A}\n\\subsection{B}\n\\section{C}\n");
    let top = sections(&doc.content);
    assert_eq!(top.len(), 2, "A and C must both sit under the document");
    assert_eq!(top[0].title, "A");
    assert_eq!(top[1].title, "C");
    let inner = sections(&top[0].content);
    assert_eq!(inner.len(), 1);
    assert_eq!(inner[0].title, "B");
    assert!(sections(&top[1].content).is_empty());
}

#[test]
fn latex_section_depths_are_fixed() {
    let doc = parse("\\part{P}\n");
    let top = sections(&doc.content);
    assert_eq!(top[0].depth, -1);
    assert_eq!(top[0].name, "part");
}

#[test]
fn markdown_sections_nest_by_marker_count() {
    let doc = parse("= Top =\n== Inner ==\n= Next =\n");
    let top = sections(&doc.content);
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].title, "Top");
    assert_eq!(top[0].depth, 1);
    let inner = sections(&top[0].content);
    assert_eq!(inner[0].title, "Inner");
    assert_eq!(inner[0].depth, 2);
}

#[test]
fn section_inside_open_command_is_fatal() {
    let err = parse_err("\\emph{text \\section{A}}");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn section_inside_open_environment_is_fatal() {
    let err = parse_err("\\begin{quote}\n\\section{A}\n\\end{quote}\n");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

// ---
// Environments
// ---

#[test]
fn environment_footer_must_match_header_name() {
    let err = parse_err("\\begin{foo} body \\end{bar}\n");
    assert_eq!(err.kind(), ErrorKind::Parse);

    let doc = parse("\\begin{foo} body \\end{foo}\n");
    let envs: Vec<_> = doc
        .content
        .iter()
        .filter_map(|node| match node {
            Markup::Environment(env) => Some(env),
            _ => None,
        })
        .collect();
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0].name, "foo");
}

#[test]
fn environment_collects_bracketed_arguments_before_body() {
    let doc = parse("\\begin{frame}[color=red]{first}{second} body \\end{frame}\n");
    let Markup::Environment(env) = &doc.content[0] else {
        panic!("expected environment first, got {:?}", kinds(&doc.content));
    };
    assert_eq!(env.arity(), 2);
    assert_eq!(env.options.get("color").map(String::as_str), Some("red"));
    assert!(!env.body().is_empty());
}

#[test]
fn unfinished_environment_at_end_of_input_is_fatal() {
    let err = parse_err("\\begin{foo} body\n");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

// ---
// Commands
// ---

#[test]
fn command_with_options_and_arguments() {
    let doc = parse("\\link[style=bold]{target}{label}\n");
    let cmd = first_command(&doc.content);
    assert_eq!(cmd.name, "link");
    assert_eq!(cmd.arity(), 2);
    assert_eq!(cmd.options.get("style").map(String::as_str), Some("bold"));
}

#[test]
fn zero_argument_command_is_a_leaf() {
    let doc = parse("\\noindent rest\n");
    let cmd = first_command(&doc.content);
    assert_eq!(cmd.name, "noindent");
    assert_eq!(cmd.arity(), 0);
    assert!(cmd.content.is_empty());
}

#[test]
fn preformatted_command_body_is_captured_verbatim() {
    let doc = parse("\\code[lang=rust]{{{let x = \\emph{1};}}}\n");
    let cmd = first_command(&doc.content);
    assert!(cmd.preformated);
    let Markup::Preformatted(pre) = &cmd.content[0] else {
        panic!("preformatted command holds a preformatted leaf");
    };
    // No tokenization inside: the \emph stays raw text.
    assert_eq!(pre.text, "let x = \\emph{1};");
    assert_eq!(pre.lang, "rust");
}

#[test]
fn unterminated_preformatted_body_is_fatal() {
    let err = parse_err("\\code{{{never closed\n");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn bare_braces_outside_arguments_are_literal_text() {
    let doc = parse("a { b } c\n");
    let text: Vec<&str> = doc
        .content
        .iter()
        .filter_map(|node| match node {
            Markup::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text.join(""), "a{b}c");
}

#[test]
fn protected_braces_are_literal_characters() {
    let doc = parse("\\{x\\}\n");
    let Markup::Text(text) = &doc.content[0] else {
        panic!("expected text first, got {:?}", kinds(&doc.content));
    };
    assert_eq!(text.text, "{x}");
}

// ---
// Whitespace and comments
// ---

#[test]
fn text_and_whitespace_stay_distinct_leaves() {
    let doc = parse("word  \nnext");
    assert_eq!(
        kinds(&doc.content),
        vec!["text", "spaces", "newlines", "text"]
    );
}

#[test]
fn line_comments_leave_no_trace() {
    let doc = parse("a % gone\nb");
    assert_eq!(
        kinds(&doc.content),
        vec!["text", "spaces", "newlines", "text"]
    );
}

// ---
// Inline emphasis and preformatted spans
// ---

#[test]
fn emphasis_becomes_a_synthetic_command() {
    let doc = parse("x _hello_ y");
    let cmd = first_command(&doc.content);
    assert_eq!(cmd.name, "emph");
    let Markup::Text(inner) = &cmd.content[0] else {
        panic!("emphasis content should be text");
    };
    assert_eq!(inner.text, "hello");
}

#[test]
fn strong_emphasis_uses_doubled_delimiters() {
    let doc = parse("**bold**");
    let cmd = first_command(&doc.content);
    assert_eq!(cmd.name, "strong");
}

#[test]
fn emphasis_can_nest_with_different_delimiters() {
    let doc = parse("_a *b* c_");
    let outer = first_command(&doc.content);
    assert_eq!(outer.name, "emph");
    assert!(outer
        .content
        .iter()
        .any(|node| matches!(node, Markup::Command(inner) if inner.name == "emph")));
}

#[test]
fn lone_delimiters_stay_text() {
    let doc = parse("2 * 3 * 4");
    assert!(doc
        .content
        .iter()
        .all(|node| !matches!(node, Markup::Command(_))));
}

#[test]
fn backtick_span_is_inline_preformatted() {
    let doc = parse("see `let x` here");
    let pre = doc
        .content
        .iter()
        .find_map(|node| match node {
            Markup::Preformatted(pre) => Some(pre),
            _ => None,
        })
        .expect("expected an inline preformatted leaf");
    assert_eq!(pre.text, "let x");
    assert_eq!(pre.lang, "inline");
}

// ---
// Markdown lists
// ---

fn list_items(env: &vellum::markup::Environment) -> Vec<&vellum::markup::Command> {
    env.content
        .iter()
        .filter_map(|node| match node {
            Markup::Command(cmd) if cmd.name == "item" => Some(cmd),
            _ => None,
        })
        .collect()
}

#[test]
fn markdown_list_nests_by_indentation() {
    let doc = parse("   - item 1.1\n   - item 1.2\n     * item 2.1\n     * item 2.2\n");
    let Markup::Environment(outer) = &doc.content[0] else {
        panic!("expected list environment, got {:?}", kinds(&doc.content));
    };
    assert_eq!(outer.name, "itemize");
    assert_eq!(outer.markdown_indent, Some(3));

    let items = list_items(outer);
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.markdown_item));

    let nested: Vec<_> = items[1]
        .content
        .iter()
        .filter_map(|node| match node {
            Markup::Environment(env) => Some(env),
            _ => None,
        })
        .collect();
    assert_eq!(nested.len(), 1, "second item hosts the deeper list");
    assert_eq!(nested[0].markdown_indent, Some(5));
    assert_eq!(list_items(nested[0]).len(), 2);
    assert!(
        items[0]
            .content
            .iter()
            .all(|node| !matches!(node, Markup::Environment(_))),
        "first item has no nested list"
    );
}

#[test]
fn digit_markers_build_enumerate_environments() {
    let doc = parse(" 1. first\n 2. second\n");
    let Markup::Environment(env) = &doc.content[0] else {
        panic!("expected list environment, got {:?}", kinds(&doc.content));
    };
    assert_eq!(env.name, "enumerate");
    assert_eq!(list_items(env).len(), 2);
}

#[test]
fn blank_line_closes_the_whole_list_scope() {
    let doc = parse(" - a\n   - b\n\nafter\n");
    let env_count = doc
        .content
        .iter()
        .filter(|node| matches!(node, Markup::Environment(_)))
        .count();
    assert_eq!(env_count, 1, "one top-level list; the nested one is inside it");
    assert!(doc
        .content
        .iter()
        .any(|node| matches!(node, Markup::Text(t) if t.text == "after")));
}

#[test]
fn markdown_marker_inside_explicit_list_is_fatal() {
    let err = parse_err("\\begin{itemize}\n - a\n\\end{itemize}\n");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn latex_item_inside_markdown_list_is_fatal() {
    let err = parse_err(" - a\n\\item b\n");
    assert_eq!(err.kind(), ErrorKind::Parse);
}

// ---
// Includes
// ---

struct MapLoader(std::collections::HashMap<String, String>);

impl IncludeLoader for MapLoader {
    fn load(&self, path: &str) -> std::io::Result<String> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
    }
}

fn loader(files: &[(&str, &str)]) -> Box<MapLoader> {
    Box::new(MapLoader(
        files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    ))
}

#[test]
fn include_splices_a_sub_document() {
    let parser = Parser::with_include_loader(loader(&[("part.vlm", "included \\emph{text}\n")]));
    let doc = parser
        .parse_str("before \\include{part.vlm} after", "<main>")
        .unwrap();
    let sub = doc
        .content
        .iter()
        .find_map(|node| match node {
            Markup::Document(sub) => Some(sub),
            _ => None,
        })
        .expect("included file parses into a nested document");
    assert_eq!(sub.kind, vellum::markup::DocumentKind::Sub);
    assert_eq!(sub.name, "part.vlm");
    assert!(sub
        .content
        .iter()
        .any(|node| matches!(node, Markup::Command(cmd) if cmd.name == "emph")));
    // Parsing resumes in the outer document after the include.
    assert!(doc
        .content
        .iter()
        .any(|node| matches!(node, Markup::Text(t) if t.text == "after")));
}

#[test]
fn missing_include_is_an_include_error() {
    let parser = Parser::with_include_loader(loader(&[]));
    let err = parser
        .parse_str("\\include{nowhere.vlm}", "<main>")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Include);
}

#[test]
fn footer_cannot_close_an_environment_opened_in_the_including_file() {
    let parser = Parser::with_include_loader(loader(&[("tail.vlm", "\\end{outer}\n")]));
    let err = parser
        .parse_str("\\begin{outer}\\include{tail.vlm}\n", "<main>")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

// ---
// Spans
// ---

#[test]
fn node_spans_cover_their_source_text() {
    let input = "\\emph{hi}";
    let doc = parse(input);
    let cmd = first_command(&doc.content);
    assert_eq!(cmd.span.start.offset, 0);
    assert_eq!(cmd.span.end.offset, input.len());
    assert!(cmd.span.start <= cmd.span.end);
}

#[test]
fn sibling_spans_are_monotone() {
    let doc = parse("one `two` three");
    let mut last = 0;
    for node in &doc.content {
        let span = node.span();
        assert!(span.start.offset >= last);
        last = span.start.offset;
    }
}
