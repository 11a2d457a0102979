//! Module syntax lowered for a script body: imports become bindings to the
//! values the sandbox provides, `export` keywords go away and the default
//! export is returned at the end.

use tree_sitter::Node;

use super::types::{named_child_of_kind, named_children_of_kind};
use super::{PResult, Rewriter, has_token, unquote};
use crate::compiler::emit::{is_identifier, js_string};

impl Rewriter<'_> {
    pub(super) fn lower_import(&mut self, node: Node<'_>) -> PResult<()> {
        let transforms = self.transforms;
        let Some(env) = &transforms.modules else {
            return Ok(());
        };
        let Some(source) = node.child_by_field_name("source") else {
            return Err(self.error_at(node, "Expected a module specifier"));
        };
        let specifier = unquote(self.text(source));
        let Some(binding) = env.modules.get(specifier) else {
            let available = if env.modules.is_empty() {
                "no modules can be imported in this language".to_string()
            } else {
                let names: Vec<&str> = env.modules.keys().map(String::as_str).collect();
                format!("available modules: {}", names.join(", "))
            };
            return Err(self.error_at(
                source,
                format!("Cannot resolve module \"{specifier}\" ({available})"),
            ));
        };

        let mut parts = Vec::new();
        if let Some(clause) = named_child_of_kind(node, "import_clause") {
            let mut cursor = clause.walk();
            for part in clause.named_children(&mut cursor) {
                match part.kind() {
                    "identifier" => self.alias_import(part, binding, &mut parts),
                    "namespace_import" => {
                        if let Some(local) = named_child_of_kind(part, "identifier") {
                            self.alias_import(local, binding, &mut parts);
                        }
                    }
                    "named_imports" => {
                        let entries: Vec<String> = named_children_of_kind(part, "import_specifier")
                            .into_iter()
                            .filter_map(|specifier| self.import_entry(specifier))
                            .collect();
                        if !entries.is_empty() {
                            parts.push(format!("const {{ {} }} = {binding};", entries.join(", ")));
                        }
                    }
                    _ => {}
                }
            }
        }
        self.replace(node.start_byte(), node.end_byte(), parts.join(" "));
        Ok(())
    }

    fn alias_import(&self, local: Node<'_>, binding: &str, parts: &mut Vec<String>) {
        let local = self.text(local);
        if local != binding {
            parts.push(format!("const {local} = {binding};"));
        }
    }

    /// `a`, `a as b` or `"a-b" as c` as a destructuring entry.
    fn import_entry(&self, specifier: Node<'_>) -> Option<String> {
        let name = specifier.child_by_field_name("name")?;
        let imported = match name.kind() {
            "string" => unquote(self.text(name)),
            _ => self.text(name),
        };
        let local = specifier
            .child_by_field_name("alias")
            .map_or(imported, |alias| self.text(alias));
        Some(if imported == local {
            imported.to_string()
        } else if is_identifier(imported) {
            format!("{imported}: {local}")
        } else {
            format!("{}: {local}", js_string(imported))
        })
    }

    pub(super) fn lower_export(&mut self, node: Node<'_>) -> PResult<()> {
        if node.child_by_field_name("source").is_some() || has_token(node, "*") {
            return Err(self.error_at(node, "Re-exporting from other modules is not supported"));
        }
        let is_default = has_token(node, "default");

        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.strip(node.start_byte(), declaration.start_byte());
            if is_default {
                self.default_export = self.declared_name(declaration);
            }
            return self.visit(declaration);
        }

        if let Some(value) = node.child_by_field_name("value") {
            if let Some(name) = self.declared_name(value) {
                self.strip(node.start_byte(), value.start_byte());
                self.default_export = Some(name);
                return self.visit(value);
            }
            let Some(keyword) = tokens_named(node, "default") else {
                return Err(self.error_at(node, "Expected `default`"));
            };
            self.replace(node.start_byte(), keyword.end_byte(), "const __default =");
            if !has_token(node, ";") {
                self.replace(value.end_byte(), value.end_byte(), ";");
            }
            self.default_export = Some("__default".to_string());
            return self.visit(value);
        }

        // `export { a, b as c }` only names bindings that already exist.
        self.strip_node(node);
        Ok(())
    }

    /// The binding a named function or class declares.
    fn declared_name(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "abstract_class_declaration"
            | "function_expression"
            | "function"
            | "generator_function"
            | "class" => node
                .child_by_field_name("name")
                .map(|name| self.text(name).to_string()),
            _ => None,
        }
    }
}

fn tokens_named<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    super::tokens(node).into_iter().find(|t| t.kind() == kind)
}
