//! JSX elements into the pieces [`emit`](crate::compiler::emit) renders as
//! factory calls.

use tree_sitter::Node;

use super::{PResult, Rewriter};
use crate::compiler::emit::{JsxAttr, JsxChild, JsxElement, JsxName, JsxValue, Span};

impl Rewriter<'_> {
    pub(super) fn jsx_element(&mut self, node: Node<'_>) -> PResult<JsxElement> {
        let (open, close) = match node.kind() {
            "jsx_self_closing_element" => (node, None),
            _ => match node.child_by_field_name("open_tag") {
                Some(open) => (open, node.child_by_field_name("close_tag")),
                None => return Err(self.error_at(node, "Malformed JSX element")),
            },
        };
        let name = match open.child_by_field_name("name") {
            None => JsxName::Fragment,
            Some(name) => self.jsx_name(name),
        };

        let mut attrs = Vec::new();
        let mut cursor = open.walk();
        let attributes: Vec<Node<'_>> = open
            .named_children(&mut cursor)
            .filter(|child| matches!(child.kind(), "jsx_attribute" | "jsx_expression"))
            .collect();
        for attribute in attributes {
            attrs.push(self.jsx_attribute(attribute)?);
        }

        let mut children = Vec::new();
        if let Some(close) = close {
            let mut text_start = open.end_byte();
            let mut cursor = node.walk();
            let nodes: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            for child in nodes {
                let kind = child.kind();
                if !matches!(kind, "jsx_expression" | "jsx_element" | "jsx_self_closing_element") {
                    continue;
                }
                self.push_text(text_start, child.start_byte(), &mut children);
                text_start = child.end_byte();
                match kind {
                    "jsx_expression" => {
                        if let Some(child) = self.jsx_expression(child)? {
                            children.push(child);
                        }
                    }
                    _ => children.push(JsxChild::Element(Box::new(self.jsx_element(child)?))),
                }
            }
            self.push_text(text_start, close.start_byte(), &mut children);
        }

        Ok(JsxElement {
            name,
            attrs,
            children,
        })
    }

    fn jsx_name(&self, name: Node<'_>) -> JsxName {
        let text = self.text(name);
        let intrinsic = name.kind() == "jsx_namespace_name"
            || (!text.contains('.')
                && (text.starts_with(|c: char| c.is_ascii_lowercase()) || text.contains('-')));
        if intrinsic {
            JsxName::Intrinsic(text.to_string())
        } else {
            JsxName::Component(text.to_string())
        }
    }

    fn jsx_attribute(&mut self, attribute: Node<'_>) -> PResult<JsxAttr> {
        if attribute.kind() == "jsx_expression" {
            return match self.jsx_expression(attribute)? {
                Some(JsxChild::Spread(span)) => Ok(JsxAttr::Spread(span)),
                _ => Err(self.error_at(attribute, "Expected `...` in JSX spread attribute")),
            };
        }
        let Some(key) = attribute.named_child(0) else {
            return Err(self.error_at(attribute, "Malformed JSX attribute"));
        };
        let name = self.text(key).to_string();
        let value = match attribute.named_child(1) {
            None => JsxValue::True,
            Some(value) => match value.kind() {
                "string" => JsxValue::Str(super::unquote(self.text(value)).to_string()),
                "jsx_expression" => match self.jsx_expression(value)? {
                    Some(JsxChild::Expr(span)) => JsxValue::Expr(span),
                    _ => {
                        return Err(self.error_at(
                            value,
                            "JSX attributes must only be assigned a non-empty expression",
                        ));
                    }
                },
                "jsx_element" | "jsx_self_closing_element" => {
                    JsxValue::Element(Box::new(self.jsx_element(value)?))
                }
                _ => return Err(self.error_at(value, "Unsupported JSX attribute value")),
            },
        };
        Ok(JsxAttr::Named { name, value })
    }

    /// `{expr}` or `{...expr}`; `None` when the braces hold only comments.
    fn jsx_expression(&mut self, node: Node<'_>) -> PResult<Option<JsxChild>> {
        let mut cursor = node.walk();
        let inner: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|child| child.kind() != "comment")
            .collect();
        let (Some(first), Some(last)) = (inner.first(), inner.last()) else {
            return Ok(None);
        };
        if first.kind() == "spread_element" {
            let Some(argument) = first.named_child(0) else {
                return Err(self.error_at(*first, "Expected expression after `...`"));
            };
            self.visit(argument)?;
            return Ok(Some(JsxChild::Spread(span_of(argument, argument))));
        }
        for child in &inner {
            self.visit(*child)?;
        }
        Ok(Some(JsxChild::Expr(span_of(*first, *last))))
    }

    fn push_text(&self, start: usize, end: usize, children: &mut Vec<JsxChild>) {
        if end > start {
            children.push(JsxChild::Text(self.src[start..end].to_string()));
        }
    }
}

fn span_of(first: Node<'_>, last: Node<'_>) -> Span {
    Span {
        start: first.start_byte(),
        end: last.end_byte(),
    }
}
