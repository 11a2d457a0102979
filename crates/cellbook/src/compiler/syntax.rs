//! Parsing with tree-sitter and the checks every pass runs before rewriting.
//!
//! tree-sitter recovers from syntax errors instead of failing, so a parsed
//! tree is only accepted once [`check`] has found no `ERROR` or missing node,
//! no JSX where the language has none, and no nesting deeper than
//! [`MAX_NESTING`]. The rewriter recurses over the tree; the depth bound keeps
//! that recursion, and the engine's own parser later on, off the end of the
//! stack.

use tree_sitter::{Node, Parser, Tree};

use super::CompileError;

/// Deepest syntax tree accepted.
pub(crate) const MAX_NESTING: usize = 256;

/// Syntax extensions accepted on top of JavaScript.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Syntax {
    pub typescript: bool,
    pub jsx: bool,
}

impl Syntax {
    fn language(self) -> tree_sitter::Language {
        match (self.typescript, self.jsx) {
            (true, true) => tree_sitter_typescript::LANGUAGE_TSX.into(),
            (true, false) => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            (false, _) => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// Parse `src` with the grammar for `syntax` and reject anything the
/// rewriter must not see.
pub(crate) fn parse(src: &str, syntax: Syntax) -> Result<Tree, CompileError> {
    let mut parser = Parser::new();
    parser
        .set_language(&syntax.language())
        .map_err(|e| CompileError::new(format!("failed to load grammar: {e}")))?;
    let tree = parser
        .parse(src, None)
        .ok_or_else(|| CompileError::new("parser produced no syntax tree"))?;
    check(&tree, src, syntax)?;
    Ok(tree)
}

/// Walk the whole tree without recursion and report the first problem in
/// document order.
fn check(tree: &Tree, src: &str, syntax: Syntax) -> Result<(), CompileError> {
    let mut cursor = tree.walk();
    let mut depth = 0;
    loop {
        let node = cursor.node();
        if depth > MAX_NESTING {
            return Err(CompileError::at(src, node.start_byte(), "Nesting too deep"));
        }
        if let Some(message) = problem(node, src, syntax) {
            return Err(CompileError::at(src, node.start_byte(), message));
        }
        if !node.is_error() && cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Ok(());
            }
            depth -= 1;
        }
    }
}

fn problem(node: Node<'_>, src: &str, syntax: Syntax) -> Option<String> {
    if node.is_missing() {
        return Some(format!("Expected `{}`", node.kind()));
    }
    if node.is_error() {
        return Some(unexpected(node, src));
    }
    match node.kind() {
        kind if kind.starts_with("jsx_") && !syntax.jsx => {
            Some("JSX syntax is not enabled for this language".to_string())
        }
        "jsx_element" => {
            let open = tag_name(node.child_by_field_name("open_tag")?, src);
            let close = tag_name(node.child_by_field_name("close_tag")?, src);
            (open != close).then(|| {
                format!("Expected corresponding JSX closing tag for <{open}>, found </{close}>")
            })
        }
        _ => None,
    }
}

fn tag_name<'a>(tag: Node<'_>, src: &'a str) -> &'a str {
    tag.child_by_field_name("name")
        .map_or("", |name| &src[name.byte_range()])
}

/// Describe an `ERROR` node by its first token.
fn unexpected(node: Node<'_>, src: &str) -> String {
    let mut first = node;
    while let Some(child) = first.child(0) {
        first = child;
    }
    let text = src[first.byte_range()].trim();
    if text.is_empty() {
        return if first.start_byte() >= src.trim_end().len() {
            "Unexpected end of input".to_string()
        } else {
            "Unexpected token".to_string()
        };
    }
    let short = match text.char_indices().nth(24) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    };
    format!("Unexpected token `{short}`")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TS: Syntax = Syntax {
        typescript: true,
        jsx: false,
    };

    #[test]
    fn test_grammar_follows_syntax() {
        assert!(parse("let x: number = 1;", TS).is_ok());
        assert!(parse("let x: number = 1;", Syntax::default()).is_err());
        let tsx = Syntax {
            typescript: true,
            jsx: true,
        };
        assert!(parse("const a = <b>{x as number}</b>;", tsx).is_ok());
    }

    #[test]
    fn test_jsx_needs_jsx_syntax() {
        let err = parse("render(<div />)", Syntax::default()).unwrap_err();
        assert!(err.message.contains("JSX"), "{}", err.message);
        assert_eq!((err.line, err.column), (1, 8));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let src = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse(&src, Syntax::default()).unwrap_err();
        assert_eq!(err.message, "Nesting too deep");

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&shallow, Syntax::default()).is_ok());
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let jsx = Syntax {
            typescript: false,
            jsx: true,
        };
        let err = parse("const a = <a></b>;", jsx).unwrap_err();
        assert!(err.message.contains("closing tag for <a>"), "{}", err.message);
    }

    #[test]
    fn test_error_is_located() {
        let err = parse("let ok = 1;\nlet x = ;", Syntax::default()).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.starts_with("Unexpected") || err.message.starts_with("Expected"));
    }
}
