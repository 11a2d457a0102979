//! One compiler pass over a tree-sitter syntax tree.
//!
//! The pass never rebuilds the program. It walks the concrete syntax tree and
//! records [`Edit`]s for the transforms enabled in [`Transforms`]: byte ranges
//! to strip, replace or render as JSX factory calls. Everything outside an
//! edit is copied through verbatim by [`emit::render`].

mod jsx;
mod modules;
mod types;

use tree_sitter::Node;

use super::CompileError;
use super::emit::{self, Edit, EditKind};
use super::syntax::{self, Syntax};
use crate::language::{EnvOptions, JsxOptions};

pub(crate) type PResult<T> = Result<T, CompileError>;

/// Rewrites performed by one pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct Transforms {
    pub strip_types: bool,
    pub jsx: Option<JsxOptions>,
    pub modules: Option<EnvOptions>,
}

/// Parse `src` and apply `transforms`.
pub(crate) fn transform(src: &str, syntax: Syntax, transforms: &Transforms) -> PResult<String> {
    let tree = syntax::parse(src, syntax)?;
    let mut rewriter = Rewriter {
        src,
        transforms,
        edits: Vec::new(),
        default_export: None,
    };
    rewriter.visit(tree.root_node())?;

    let mut edits = rewriter.edits;
    if let (Some(_), Some(name)) = (&transforms.modules, rewriter.default_export) {
        edits.push(Edit {
            start: src.len(),
            end: src.len(),
            kind: EditKind::Replace(format!("\nreturn {name};")),
        });
    }
    Ok(emit::render(src, edits, transforms.jsx.as_ref()))
}

struct Rewriter<'a> {
    src: &'a str,
    transforms: &'a Transforms,
    edits: Vec<Edit>,
    /// Binding returned by the lowered module body.
    default_export: Option<String>,
}

impl<'a> Rewriter<'a> {
    fn visit(&mut self, node: Node<'_>) -> PResult<()> {
        let kind = node.kind();
        if self.transforms.strip_types && self.strip_typescript(node)? {
            return Ok(());
        }
        if self.transforms.jsx.is_some() && matches!(kind, "jsx_element" | "jsx_self_closing_element")
        {
            let element = self.jsx_element(node)?;
            self.edits.push(Edit {
                start: node.start_byte(),
                end: node.end_byte(),
                kind: EditKind::Jsx(Box::new(element)),
            });
            return Ok(());
        }
        if self.transforms.modules.is_some() {
            match kind {
                "import_statement" => return self.lower_import(node),
                "export_statement" => return self.lower_export(node),
                _ => {}
            }
        }
        self.visit_children(node)
    }

    fn visit_children(&mut self, node: Node<'_>) -> PResult<()> {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child)?;
        }
        Ok(())
    }

    // ==== Source access ====

    fn text(&self, node: Node<'_>) -> &'a str {
        &self.src[node.byte_range()]
    }

    fn error_at(&self, node: Node<'_>, message: impl Into<String>) -> CompileError {
        CompileError::at(self.src, node.start_byte(), message)
    }

    // ==== Edits ====

    fn strip(&mut self, start: usize, end: usize) {
        if end > start {
            self.edits.push(Edit {
                start,
                end,
                kind: EditKind::Strip,
            });
        }
    }

    fn strip_node(&mut self, node: Node<'_>) {
        self.strip(node.start_byte(), node.end_byte());
    }

    /// Strip a keyword together with the whitespace after it.
    fn strip_keyword(&mut self, node: Node<'_>) {
        let end = node
            .next_sibling()
            .map_or(node.end_byte(), |next| next.start_byte());
        self.strip(node.start_byte(), end);
    }

    fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            kind: EditKind::Replace(text.into()),
        });
    }
}

/// Anonymous child tokens of `node`, such as keywords and punctuation.
fn tokens<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| !child.is_named())
        .collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    tokens(node).iter().any(|t| t.kind() == token)
}

/// The contents of a string literal, escapes left as written.
fn unquote(literal: &str) -> &str {
    literal.get(1..literal.len().saturating_sub(1)).unwrap_or_default()
}
