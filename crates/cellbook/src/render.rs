//! Mounting element trees into named containers.
//!
//! [`Renderer`] is the UI runtime contract; mounting is always an explicit
//! call and a remount replaces whatever the container held. [`HtmlRenderer`]
//! is a headless implementation that keeps an HTML string per container.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::RwLock;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::sandbox::{Element, Node};

/// Errors that can occur while mounting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountError {
    /// No container with this name has been registered.
    #[error("unknown container `{0}`")]
    UnknownContainer(String),
    /// The tree contains a tag that cannot be rendered.
    #[error("invalid tag name `{0}`")]
    InvalidTag(String),
    /// The renderer's state is unusable.
    #[error("renderer error: {0}")]
    Renderer(String),
}

/// Contract of the UI runtime.
pub trait Renderer: Send + Sync {
    /// Render `element` into `container`, replacing its previous contents.
    fn mount(&self, element: &Element, container: &str) -> Result<(), MountError>;
}

/// Renders element trees to HTML strings.
///
/// Containers must be registered before anything can be mounted into them,
/// mirroring a DOM lookup that finds no node, unless the renderer was built
/// with [`auto_create`](Self::auto_create).
#[derive(Debug, Default)]
pub struct HtmlRenderer {
    containers: RwLock<BTreeMap<String, String>>,
    auto_create: bool,
}

impl HtmlRenderer {
    /// Create a renderer with no containers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a renderer with the given containers registered.
    pub fn with_containers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let containers = names
            .into_iter()
            .map(|name| (name.into(), String::new()))
            .collect();
        Self {
            containers: RwLock::new(containers),
            auto_create: false,
        }
    }

    /// Create a renderer that registers containers on first mount.
    pub fn auto_create() -> Self {
        Self {
            auto_create: true,
            ..Self::default()
        }
    }

    /// Register an empty container. Returns `false` if it already existed.
    pub fn register(&self, name: impl Into<String>) -> bool {
        match self.containers.write() {
            Ok(mut containers) => {
                let name = name.into();
                if containers.contains_key(&name) {
                    false
                } else {
                    containers.insert(name, String::new());
                    true
                }
            }
            Err(_) => false,
        }
    }

    /// Current HTML of a container.
    pub fn html(&self, container: &str) -> Option<String> {
        self.containers
            .read()
            .ok()
            .and_then(|containers| containers.get(container).cloned())
    }

    /// Names of all registered containers.
    pub fn containers(&self) -> Vec<String> {
        self.containers
            .read()
            .map(|containers| containers.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Renderer for HtmlRenderer {
    fn mount(&self, element: &Element, container: &str) -> Result<(), MountError> {
        let html = render_html(element)?;
        let mut containers = self
            .containers
            .write()
            .map_err(|e| MountError::Renderer(e.to_string()))?;
        if self.auto_create && !containers.contains_key(container) {
            tracing::debug!(container, "creating container");
            containers.insert(container.to_string(), String::new());
        }
        let slot = containers
            .get_mut(container)
            .ok_or_else(|| MountError::UnknownContainer(container.to_string()))?;
        *slot = html;
        tracing::debug!(container, bytes = slot.len(), "mounted element");
        Ok(())
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Style properties that take plain numbers.
const UNITLESS_STYLES: &[&str] = &[
    "flex",
    "flexGrow",
    "flexShrink",
    "fontWeight",
    "lineHeight",
    "opacity",
    "order",
    "zIndex",
    "zoom",
];

/// Serialize an element tree to HTML.
pub fn render_html(element: &Element) -> Result<String, MountError> {
    let mut out = String::new();
    write_element(element, &mut out)?;
    Ok(out)
}

fn write_element(element: &Element, out: &mut String) -> Result<(), MountError> {
    if element.is_fragment() {
        return write_children(&element.children, out);
    }
    if !is_valid_tag(&element.tag) {
        return Err(MountError::InvalidTag(element.tag.clone()));
    }

    out.push('<');
    out.push_str(&element.tag);
    write_attributes(&element.props, out);
    out.push('>');
    if VOID_ELEMENTS.contains(&element.tag.as_str()) {
        return Ok(());
    }
    write_children(&element.children, out)?;
    let _ = write!(out, "</{}>", element.tag);
    Ok(())
}

fn write_children(children: &[Node], out: &mut String) -> Result<(), MountError> {
    for child in children {
        match child {
            Node::Text(text) => escape_into(text, false, out),
            Node::Element(element) => write_element(element, out)?,
        }
    }
    Ok(())
}

fn write_attributes(props: &Map<String, Value>, out: &mut String) {
    for (name, value) in props {
        if is_event_handler(name)
            || name == "dangerouslySetInnerHTML"
            || !is_valid_attribute_name(name)
        {
            tracing::trace!(attribute = %name, "attribute not rendered");
            continue;
        }
        let attr = match name.as_str() {
            "className" => "class",
            "htmlFor" => "for",
            other => other,
        };
        let text = match value {
            Value::Null | Value::Bool(false) => continue,
            Value::Bool(true) => {
                let _ = write!(out, " {attr}");
                continue;
            }
            Value::Object(style) if name == "style" => style_text(style),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = write!(out, " {attr}=\"");
        escape_into(&text, true, out);
        out.push('"');
    }
}

/// `onClick`, `onclick`, `ONLOAD`: anything the browser could treat as a
/// handler.
fn is_event_handler(name: &str) -> bool {
    name.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("on"))
}

/// The HTML attribute-name grammar: no controls, whitespace, quotes, `>`, `/`,
/// `=` or noncharacters.
fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            !c.is_control()
                && !c.is_whitespace()
                && !matches!(c, '"' | '\'' | '>' | '/' | '=' | '<')
                && !is_noncharacter(c)
        })
}

fn is_noncharacter(c: char) -> bool {
    let code = c as u32;
    (0xFDD0..=0xFDEF).contains(&code) || code & 0xFFFE == 0xFFFE
}

fn style_text(style: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (name, value) in style {
        let value = match value {
            Value::Null | Value::Bool(_) => continue,
            Value::Number(n) if needs_px(name, n) => format!("{n}px"),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{}: {value};", kebab_case(name));
    }
    out
}

fn needs_px(name: &str, n: &serde_json::Number) -> bool {
    !UNITLESS_STYLES.contains(&name) && n.as_f64().is_some_and(|v| v != 0.0)
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '.')
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    // ==== HTML Tests ====

    #[test]
    fn test_render_attributes_and_text() {
        let element = Element::new("label")
            .with_prop("className", "field")
            .with_prop("htmlFor", "name")
            .with_prop("onClick", "[Function: onClick]")
            .with_prop("hidden", false)
            .with_prop("required", true)
            .with_child("a < b & \"c\"");

        assert_eq!(
            render_html(&element).unwrap(),
            "<label class=\"field\" for=\"name\" required>a &lt; b &amp; \"c\"</label>"
        );
    }

    #[test]
    fn test_unsafe_attribute_names_are_dropped() {
        let element = Element::new("div")
            .with_prop("x><script>alert(1)</script><i y", "1")
            .with_prop("onclick", "steal()")
            .with_prop("ONLOAD", "steal()")
            .with_prop("a b", "1")
            .with_prop("data-ok", "yes")
            .with_prop("aria-label", "fine");

        assert_eq!(
            render_html(&element).unwrap(),
            "<div aria-label=\"fine\" data-ok=\"yes\"></div>"
        );
    }

    #[test]
    fn test_render_style_object() {
        let element = Element::new("div").with_prop(
            "style",
            json!({"marginTop": 4, "opacity": 0.5, "color": "red", "padding": 0}),
        );

        assert_eq!(
            render_html(&element).unwrap(),
            "<div style=\"color: red; margin-top: 4px; opacity: 0.5; padding: 0;\"></div>"
        );
    }

    #[test]
    fn test_void_elements_and_fragments() {
        let element = Element::new(crate::sandbox::FRAGMENT_TAG)
            .with_child(Element::new("img").with_prop("src", "a.png"))
            .with_child(Element::new("br"))
            .with_child("tail");

        assert_eq!(render_html(&element).unwrap(), "<img src=\"a.png\"><br>tail");
    }

    #[test]
    fn test_invalid_tag() {
        let element = Element::new("div").with_child(Element::new("<script>"));
        assert_eq!(
            render_html(&element),
            Err(MountError::InvalidTag("<script>".into()))
        );
    }

    // ==== Mount Tests ====

    #[test]
    fn test_remount_replaces_contents() {
        let renderer = HtmlRenderer::with_containers(["root"]);

        renderer.mount(&Element::new("p").with_child("one"), "root").unwrap();
        renderer.mount(&Element::new("p").with_child("two"), "root").unwrap();

        assert_eq!(renderer.html("root").as_deref(), Some("<p>two</p>"));
    }

    #[test]
    fn test_unknown_container() {
        let renderer = HtmlRenderer::new();
        let err = renderer.mount(&Element::new("p"), "missing").unwrap_err();

        assert_eq!(err, MountError::UnknownContainer("missing".into()));
        assert!(renderer.register("missing"));
        assert!(!renderer.register("missing"));
        assert_eq!(renderer.containers(), ["missing"]);
    }

    #[test]
    fn test_auto_create_containers() {
        let renderer = HtmlRenderer::auto_create();
        renderer.mount(&Element::new("hr"), "cell-1").unwrap();

        assert_eq!(renderer.html("cell-1").as_deref(), Some("<hr>"));
        assert_eq!(renderer.containers(), ["cell-1"]);
    }
}
