//! Writing a markup subtree back to source text.
//!
//! The macro engine binds each invocation argument to the *source text* of
//! its subtree, so rendered templates can be re-parsed with the argument
//! markup intact (including nested macro invocations). This writer
//! reconstructs that text. Output is canonical rather than byte-identical:
//! synthetic constructs (emphasis, markdown list items) print in their
//! LaTeX-style spelling, which re-parses to an equivalent tree.

use crate::markup::{write_options, Arg, Markup};

/// Writes one node back to markup source text.
pub fn write_markup(node: &Markup) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

/// Writes a sequence of sibling nodes.
pub fn write_nodes(nodes: &[Markup]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Markup, out: &mut String) {
    match node {
        Markup::Document(doc) => {
            for child in &doc.content {
                write_node(child, out);
            }
        }
        Markup::Section(sec) => {
            out.push('\\');
            out.push_str(&sec.name);
            out.push('{');
            out.push_str(&sec.title);
            out.push('}');
            for child in &sec.content {
                write_node(child, out);
            }
        }
        Markup::Environment(env) => {
            out.push_str("\\begin{");
            out.push_str(&env.name);
            out.push('}');
            push_options(&env.options, out);
            for child in &env.content {
                write_node(child, out);
            }
            out.push_str("\\end{");
            out.push_str(&env.name);
            out.push('}');
        }
        Markup::Command(cmd) => {
            out.push('\\');
            out.push_str(&cmd.name);
            push_options(&cmd.options, out);
            if cmd.preformated {
                out.push_str("{{{");
                for child in &cmd.content {
                    if let Markup::Preformatted(pre) = child {
                        out.push_str(&pre.text);
                    }
                }
                out.push_str("}}}");
                return;
            }
            let arity = cmd.arity();
            for child in &cmd.content[..arity] {
                write_node(child, out);
            }
            let body = &cmd.content[arity..];
            if body.is_empty() {
                return;
            }
            // Synthetic containers (emphasis) re-print braced so the body
            // stays attached on re-parse; `\item` takes its body bare.
            if cmd.name == "item" {
                out.push(' ');
                for child in body {
                    write_node(child, out);
                }
            } else {
                out.push('{');
                for child in body {
                    write_node(child, out);
                }
                out.push('}');
            }
        }
        Markup::CommandArg(arg) | Markup::EnvArg(arg) => {
            out.push('{');
            push_arg_content(arg, out);
            out.push('}');
        }
        Markup::Text(text) => {
            for ch in text.text.chars() {
                match ch {
                    '{' => out.push_str("\\{"),
                    '}' => out.push_str("\\}"),
                    _ => out.push(ch),
                }
            }
        }
        Markup::Preformatted(pre) => {
            if pre.lang == "inline" {
                out.push('`');
                out.push_str(&pre.text);
                out.push('`');
            } else {
                out.push_str(&pre.text);
            }
        }
        Markup::Spaces(run) | Markup::Newlines(run) => out.push_str(&run.text),
        Markup::Skip(_) => {}
    }
}

/// Writes the content of one argument slot, without the braces.
pub fn write_arg(arg: &Arg) -> String {
    let mut out = String::new();
    push_arg_content(arg, &mut out);
    out
}

fn push_arg_content(arg: &Arg, out: &mut String) {
    for child in &arg.content {
        write_node(child, out);
    }
}

fn push_options(options: &crate::markup::OptionsMap, out: &mut String) {
    if !options.is_empty() {
        out.push('[');
        out.push_str(&write_options(options));
        out.push(']');
    }
}
