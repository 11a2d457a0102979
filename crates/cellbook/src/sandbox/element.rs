//! Host element trees produced by UI cells.
//!
//! Components are resolved inside the sandbox, so an [`Element`] only ever
//! names a host tag: `h1`, `div`, `my-widget`, or [`FRAGMENT_TAG`] for a
//! result with several roots.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag of the synthetic element wrapping several roots.
pub const FRAGMENT_TAG: &str = "#fragment";

/// A resolved UI node with a host tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Host tag name.
    pub tag: String,
    /// Properties other than `children`, `key` and `ref`, as JSON.
    #[serde(default)]
    pub props: Map<String, Value>,
    /// Child nodes in order.
    #[serde(default)]
    pub children: Vec<Node>,
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Text content.
    Text(String),
    /// A nested element.
    Element(Element),
}

impl Element {
    /// An element without props or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            props: Map::new(),
            children: Vec::new(),
        }
    }

    /// Add a prop.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Append a child.
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Whether this is the synthetic multi-root wrapper.
    pub fn is_fragment(&self) -> bool {
        self.tag == FRAGMENT_TAG
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(children: &[Node], out: &mut String) {
    for child in children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Text(text)
    }
}
