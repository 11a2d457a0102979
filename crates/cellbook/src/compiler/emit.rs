//! Source edits recorded by a rewrite pass and the code generator that
//! applies them.
//!
//! A pass records byte ranges of the input that must be removed or replaced;
//! everything outside an edit is copied through verbatim. Removed and replaced text keeps its line breaks so that
//! positions in the output stay on the same line as in the input.

use crate::language::JsxOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub kind: EditKind,
}

#[derive(Debug)]
pub(crate) enum EditKind {
    /// Remove the range.
    Strip,
    /// Replace the range with text. An empty range is an insertion.
    Replace(String),
    /// A JSX element expression.
    Jsx(Box<JsxElement>),
    /// An `enum` declaration.
    Enum(Box<EnumDecl>),
}

#[derive(Debug)]
pub(crate) struct JsxElement {
    pub name: JsxName,
    pub attrs: Vec<JsxAttr>,
    pub children: Vec<JsxChild>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JsxName {
    Fragment,
    /// Host element such as `div`; emitted as a string.
    Intrinsic(String),
    /// Component reference; emitted as an expression.
    Component(String),
}

#[derive(Debug)]
pub(crate) enum JsxAttr {
    Named { name: String, value: JsxValue },
    Spread(Span),
}

#[derive(Debug)]
pub(crate) enum JsxValue {
    True,
    /// Raw string contents, entities not yet decoded.
    Str(String),
    Expr(Span),
    Element(Box<JsxElement>),
}

#[derive(Debug)]
pub(crate) enum JsxChild {
    /// Raw text, whitespace not yet collapsed.
    Text(String),
    Expr(Span),
    Spread(Span),
    Element(Box<JsxElement>),
}

#[derive(Debug)]
pub(crate) struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
}

#[derive(Debug)]
pub(crate) struct EnumMember {
    pub name: String,
    pub init: Option<EnumInit>,
}

#[derive(Debug)]
pub(crate) struct EnumInit {
    pub span: Span,
    pub value: EnumValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EnumValue {
    Number(f64),
    String,
    Computed,
}

/// Apply `edits` to `src`.
pub(crate) fn render(src: &str, mut edits: Vec<Edit>, jsx: Option<&JsxOptions>) -> String {
    // Insertions first, then outer ranges before the ranges nested in them.
    edits.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then((a.end > a.start).cmp(&(b.end > b.start)))
            .then(b.end.cmp(&a.end))
    });
    let default_jsx = JsxOptions::default();
    let emitter = Emitter {
        src,
        edits: &edits,
        jsx: jsx.unwrap_or(&default_jsx),
    };
    let mut out = String::with_capacity(src.len() + src.len() / 4);
    let whole = Span {
        start: 0,
        end: src.len(),
    };
    emitter.render_range(whole, &mut out);
    out
}

struct Emitter<'a> {
    src: &'a str,
    edits: &'a [Edit],
    jsx: &'a JsxOptions,
}

impl Emitter<'_> {
    fn render_range(&self, range: Span, out: &mut String) {
        let mut cursor = range.start;
        let first = self.edits.partition_point(|e| e.start < range.start);
        for edit in &self.edits[first..] {
            if edit.start > range.end {
                break;
            }
            if edit.start < cursor || edit.end > range.end {
                continue;
            }
            out.push_str(&self.src[cursor..edit.start]);
            self.apply(edit, out);
            cursor = edit.end;
        }
        out.push_str(&self.src[cursor..range.end]);
    }

    fn apply(&self, edit: &Edit, out: &mut String) {
        let mark = out.len();
        match &edit.kind {
            EditKind::Strip => {}
            EditKind::Replace(text) => out.push_str(text),
            EditKind::Jsx(element) => self.render_jsx(element, out),
            EditKind::Enum(decl) => self.render_enum(decl, out),
        }
        let original = self.src[edit.start..edit.end].matches('\n').count();
        let emitted = out[mark..].matches('\n').count();
        for _ in emitted..original {
            out.push('\n');
        }
    }

    fn render_jsx(&self, element: &JsxElement, out: &mut String) {
        out.push_str(&self.jsx.pragma);
        out.push('(');
        match &element.name {
            JsxName::Fragment => out.push_str(&self.jsx.pragma_frag),
            JsxName::Intrinsic(name) => out.push_str(&js_string(name)),
            JsxName::Component(name) => out.push_str(name),
        }
        out.push_str(", ");
        self.render_props(&element.attrs, out);
        for child in &element.children {
            match child {
                JsxChild::Text(raw) => {
                    if let Some(text) = clean_jsx_text(raw) {
                        out.push_str(", ");
                        out.push_str(&js_string(&text));
                    }
                }
                JsxChild::Expr(span) => {
                    out.push_str(", ");
                    self.render_range(*span, out);
                }
                JsxChild::Spread(span) => {
                    out.push_str(", ...");
                    self.render_range(*span, out);
                }
                JsxChild::Element(child) => {
                    out.push_str(", ");
                    self.render_jsx(child, out);
                }
            }
        }
        out.push(')');
    }

    fn render_props(&self, attrs: &[JsxAttr], out: &mut String) {
        if attrs.is_empty() {
            out.push_str("null");
            return;
        }
        out.push('{');
        for (i, attr) in attrs.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { ", " });
            match attr {
                JsxAttr::Named { name, value } => {
                    if is_identifier(name) {
                        out.push_str(name);
                    } else {
                        out.push_str(&js_string(name));
                    }
                    out.push_str(": ");
                    match value {
                        JsxValue::True => out.push_str("true"),
                        JsxValue::Str(raw) => out.push_str(&js_string(&decode_entities(raw))),
                        JsxValue::Expr(span) => self.render_range(*span, out),
                        JsxValue::Element(element) => self.render_jsx(element, out),
                    }
                }
                JsxAttr::Spread(span) => {
                    out.push_str("...");
                    self.render_range(*span, out);
                }
            }
        }
        out.push_str(" }");
    }

    fn render_enum(&self, decl: &EnumDecl, out: &mut String) {
        let name = &decl.name;
        out.push_str(&format!("var {name}; (function ({name}) {{"));
        // Auto-increment base: a known number, or the member it follows.
        let mut previous: Option<Result<f64, String>> = None;
        for member in &decl.members {
            let key = js_string(&member.name);
            let (value, is_string) = match &member.init {
                Some(init) => {
                    let mut text = String::new();
                    self.render_range(init.span, &mut text);
                    previous = match init.value {
                        EnumValue::Number(v) => Some(Ok(v)),
                        EnumValue::String => None,
                        EnumValue::Computed => Some(Err(key.clone())),
                    };
                    (text, init.value == EnumValue::String)
                }
                None => {
                    let value = match &previous {
                        None => 0.0,
                        Some(Ok(v)) => v + 1.0,
                        Some(Err(prev_key)) => {
                            let text = format!("{name}[{prev_key}] + 1");
                            previous = Some(Err(key.clone()));
                            out.push_str(&format!(" {name}[{name}[{key}] = {text}] = {key};"));
                            self.push_enum_local(decl, member, &key, out);
                            continue;
                        }
                    };
                    previous = Some(Ok(value));
                    (format_number(value), false)
                }
            };
            if is_string {
                out.push_str(&format!(" {name}[{key}] = {value};"));
            } else {
                out.push_str(&format!(" {name}[{name}[{key}] = {value}] = {key};"));
            }
            self.push_enum_local(decl, member, &key, out);
        }
        out.push_str(&format!(" }})({name} || ({name} = {{}}));"));
    }

    // Later initializers may refer to earlier members by their bare name.
    fn push_enum_local(&self, decl: &EnumDecl, member: &EnumMember, key: &str, out: &mut String) {
        if is_identifier(&member.name) && member.name != decl.name {
            out.push_str(&format!(" var {} = {}[{key}];", member.name, decl.name));
        }
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| is_id_char(c) && !c.is_numeric())
        && chars.all(|c| is_id_char(c) || matches!(c, '\u{200c}' | '\u{200d}'))
}

fn is_id_char(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphanumeric()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Quote `s` as a double-quoted JavaScript string literal.
pub(crate) fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Collapse JSX text the way React's JSX transform does: lines are trimmed,
/// whitespace-only lines vanish and the remaining lines join with one space.
fn clean_jsx_text(raw: &str) -> Option<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t'));
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.replace('\t', " ");
        let mut trimmed = line.as_str();
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ');
        }
        if i + 1 != lines.len() {
            trimmed = trimmed.trim_end_matches(' ');
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(trimmed);
        if Some(i) != last_non_empty {
            out.push(' ');
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(decode_entities(&out))
    }
}

/// Decode the HTML character references JSX text and attribute strings allow.
pub(crate) fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}
