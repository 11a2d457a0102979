//! TypeScript erasure: annotations, type-only declarations and modifiers are
//! stripped; enums and parameter properties are lowered to plain JavaScript.

use tree_sitter::Node;

use super::{PResult, Rewriter, has_token, tokens, unquote};
use crate::compiler::emit::{Edit, EditKind, EnumDecl, EnumInit, EnumMember, EnumValue, Span};

/// Nodes that vanish along with everything inside them.
const ERASED: &[&str] = &[
    "type_annotation",
    "type_parameters",
    "type_arguments",
    "implements_clause",
    "asserts_annotation",
    "type_predicate_annotation",
    "interface_declaration",
    "type_alias_declaration",
    "ambient_declaration",
    "function_signature",
];

/// Class members that vanish with the `;` that ends them.
const ERASED_MEMBERS: &[&str] = &["method_signature", "abstract_method_signature", "index_signature"];

/// Parents whose `?`, `!`, `readonly` and `abstract` tokens are type syntax.
const MODIFIED: &[&str] = &[
    "required_parameter",
    "optional_parameter",
    "public_field_definition",
    "method_definition",
    "abstract_class_declaration",
];

impl Rewriter<'_> {
    /// Record the edits that erase TypeScript from `node`. Returns `true` when
    /// the node has been dealt with entirely.
    pub(super) fn strip_typescript(&mut self, node: Node<'_>) -> PResult<bool> {
        let kind = node.kind();
        if ERASED.contains(&kind) {
            self.strip_node(node);
            return Ok(true);
        }
        if ERASED_MEMBERS.contains(&kind) || is_erased_field(node) {
            self.strip_member(node);
            return Ok(true);
        }
        match kind {
            "accessibility_modifier" | "override_modifier" => {
                self.strip_keyword(node);
                return Ok(true);
            }
            "as_expression" | "satisfies_expression" | "non_null_expression" => {
                if let Some(expression) = node.named_child(0) {
                    self.strip(expression.end_byte(), node.end_byte());
                    self.visit(expression)?;
                }
                return Ok(true);
            }
            "enum_declaration" => {
                self.lower_enum(node)?;
                return Ok(true);
            }
            "internal_module" | "module" => {
                return Err(self.error_at(node, "TypeScript namespaces are not supported"));
            }
            "import_alias" => {
                return Err(self.error_at(node, "`import x = require(...)` is not supported"));
            }
            "import_statement" => return Ok(self.strip_type_imports(node)),
            "export_statement" => return self.strip_type_exports(node),
            "method_definition" => self.parameter_properties(node),
            _ => {}
        }
        if MODIFIED.contains(&kind) {
            for token in tokens(node) {
                match token.kind() {
                    "?" | "!" => self.strip_node(token),
                    "readonly" | "abstract" | "declare" => self.strip_keyword(token),
                    _ => {}
                }
            }
        }
        Ok(false)
    }

    /// Strip a class member and the `;` that follows it.
    fn strip_member(&mut self, node: Node<'_>) {
        let end = match node.next_sibling() {
            Some(next) if next.kind() == ";" => next.end_byte(),
            _ => node.end_byte(),
        };
        self.strip(node.start_byte(), end);
    }

    fn strip_type_imports(&mut self, node: Node<'_>) -> bool {
        if has_token(node, "type") || has_token(node, "typeof") {
            self.strip_node(node);
            return true;
        }
        let Some(clause) = named_child_of_kind(node, "import_clause") else {
            return false;
        };
        let Some(named) = named_child_of_kind(clause, "named_imports") else {
            return false;
        };
        let specifiers = named_children_of_kind(named, "import_specifier");
        let type_only: Vec<_> = specifiers.iter().copied().filter(|s| is_type_only(*s)).collect();
        if type_only.is_empty() {
            return false;
        }
        if type_only.len() == specifiers.len() && clause.named_child_count() == 1 {
            self.strip_node(node);
            return true;
        }
        for specifier in type_only {
            self.strip_specifier(specifier);
        }
        // The statement still needs module lowering.
        false
    }

    fn strip_type_exports(&mut self, node: Node<'_>) -> PResult<bool> {
        let keywords = tokens(node);
        if keywords.iter().any(|t| t.kind() == "=") {
            return Err(self.error_at(node, "`export =` is not supported"));
        }
        if keywords.iter().any(|t| matches!(t.kind(), "type" | "namespace")) {
            self.strip_node(node);
            return Ok(true);
        }
        if let Some(declaration) = node.child_by_field_name("declaration") {
            if ERASED.contains(&declaration.kind()) {
                self.strip_node(node);
                return Ok(true);
            }
            return Ok(false);
        }
        if let Some(clause) = named_child_of_kind(node, "export_clause") {
            let specifiers = named_children_of_kind(clause, "export_specifier");
            let type_only: Vec<_> = specifiers.iter().copied().filter(|s| is_type_only(*s)).collect();
            if !specifiers.is_empty() && type_only.len() == specifiers.len() {
                self.strip_node(node);
                return Ok(true);
            }
            for specifier in type_only {
                self.strip_specifier(specifier);
            }
        }
        Ok(false)
    }

    /// Strip `type A,` from a specifier list.
    fn strip_specifier(&mut self, specifier: Node<'_>) {
        let end = match specifier.next_sibling() {
            Some(comma) if comma.kind() == "," => comma
                .next_sibling()
                .map_or(comma.end_byte(), |next| next.start_byte()),
            _ => specifier.end_byte(),
        };
        self.strip(specifier.start_byte(), end);
    }

    // ==== Classes ====

    /// `constructor(private x: number)` assigns `this.x = x` on entry, or right
    /// after `super(...)` in a derived class.
    fn parameter_properties(&mut self, method: Node<'_>) {
        let is_constructor = method
            .child_by_field_name("name")
            .is_some_and(|name| self.text(name) == "constructor");
        let (Some(params), Some(body)) = (
            method.child_by_field_name("parameters"),
            method.child_by_field_name("body"),
        ) else {
            return;
        };
        if !is_constructor {
            return;
        }

        let mut cursor = params.walk();
        let assignments: String = params
            .named_children(&mut cursor)
            .filter(|param| is_parameter_property(*param))
            .filter_map(|param| param.child_by_field_name("pattern"))
            .filter(|pattern| pattern.kind() == "identifier")
            .map(|pattern| {
                let name = self.text(pattern);
                format!(" this.{name} = {name};")
            })
            .collect();
        if assignments.is_empty() {
            return;
        }

        let at = if is_derived(method) {
            super_call(body).map_or(body.end_byte().saturating_sub(1), |call| call.end_byte())
        } else {
            body.start_byte() + 1
        };
        self.replace(at, at, assignments);
    }

    // ==== Enums ====

    fn lower_enum(&mut self, node: Node<'_>) -> PResult<()> {
        let (Some(name), Some(body)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("body"),
        ) else {
            return Err(self.error_at(node, "Malformed enum declaration"));
        };
        let mut members = Vec::new();
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "enum_assignment" => {
                    let (Some(key), Some(value)) = (
                        member.child_by_field_name("name"),
                        member.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    self.visit(value)?;
                    members.push(EnumMember {
                        name: self.member_name(key),
                        init: Some(EnumInit {
                            span: Span {
                                start: value.start_byte(),
                                end: value.end_byte(),
                            },
                            value: self.enum_value(value),
                        }),
                    });
                }
                "comment" => {}
                _ => members.push(EnumMember {
                    name: self.member_name(member),
                    init: None,
                }),
            }
        }
        self.edits.push(Edit {
            start: node.start_byte(),
            end: node.end_byte(),
            kind: EditKind::Enum(Box::new(EnumDecl {
                name: self.text(name).to_string(),
                members,
            })),
        });
        Ok(())
    }

    fn member_name(&self, key: Node<'_>) -> String {
        match key.kind() {
            "string" => unquote(self.text(key)).to_string(),
            _ => self.text(key).to_string(),
        }
    }

    fn enum_value(&self, value: Node<'_>) -> EnumValue {
        match value.kind() {
            "number" => self
                .text(value)
                .replace('_', "")
                .parse()
                .map_or(EnumValue::Computed, EnumValue::Number),
            "string" | "template_string" => EnumValue::String,
            _ => EnumValue::Computed,
        }
    }
}

/// `declare x: T;` and `abstract x: T;` have no runtime form.
fn is_erased_field(node: Node<'_>) -> bool {
    node.kind() == "public_field_definition"
        && (has_token(node, "declare") || has_token(node, "abstract"))
}

fn is_type_only(specifier: Node<'_>) -> bool {
    has_token(specifier, "type") || has_token(specifier, "typeof")
}

fn is_parameter_property(param: Node<'_>) -> bool {
    let mut cursor = param.walk();
    let modified = param.children(&mut cursor).any(|child| {
        matches!(
            child.kind(),
            "accessibility_modifier" | "override_modifier" | "readonly"
        )
    });
    modified
}

/// Whether the class declaring `method` has an `extends` clause.
fn is_derived(method: Node<'_>) -> bool {
    let Some(class) = method.parent().and_then(|body| body.parent()) else {
        return false;
    };
    let Some(heritage) = named_child_of_kind(class, "class_heritage") else {
        return false;
    };
    named_child_of_kind(heritage, "extends_clause").is_some()
}

/// The top-level `super(...)` statement of a constructor body.
fn super_call(body: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = body.walk();
    let found = body.named_children(&mut cursor).find(|statement| {
        statement.kind() == "expression_statement"
            && statement
                .named_child(0)
                .filter(|call| call.kind() == "call_expression")
                .and_then(|call| call.child_by_field_name("function"))
                .is_some_and(|callee| callee.kind() == "super")
    });
    found
}

pub(super) fn named_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|child| child.kind() == kind);
    found
}

pub(super) fn named_children_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() == kind)
        .collect()
}
