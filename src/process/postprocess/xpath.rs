//! `var/xpath`: extract node values from an HTML or XML body
//!
//! Bodies are parsed leniently into a small element tree (unclosed and void
//! HTML elements are tolerated). Expressions support a practical XPath
//! subset: absolute and relative location paths over the child (`/`) and
//! descendant (`//`) axes, name tests, `*`, `.`, `..`, a final `text()` or
//! `@attr` step, and the predicates `[n]`, `[last()]`, `[@a]`, `[@a='v']`
//! and `[child='v']`.

use indexmap::IndexMap;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::process::{ExtractionErrors, VariableSink};

#[derive(Debug, Clone, Deserialize)]
pub struct VarXPath {
    pub mapping: IndexMap<String, String>,
}

impl VarXPath {
    /// Every mapping entry yields the list of matched node values (possibly
    /// empty).
    pub fn process(&self, sink: &mut dyn VariableSink, body: &[u8]) -> Result<(), ExtractionErrors> {
        let mut errors = ExtractionErrors::new();

        let text = String::from_utf8_lossy(body);
        let doc = match Document::parse(&text) {
            Ok(doc) => doc,
            Err(message) => {
                errors.push("*", message);
                return Err(errors);
            }
        };

        for (key, expr) in &self.mapping {
            match XPath::compile(expr) {
                Ok(xpath) => {
                    let values = xpath.select(&doc).into_iter().map(JsonValue::String).collect();
                    sink.set(key, JsonValue::Array(values));
                }
                Err(message) => errors.push(key, format!("invalid xpath {}: {}", expr, message)),
            }
        }

        errors.into_result()
    }
}

/// Character and predefined XML references; anything else is kept verbatim
fn resolve_reference(e: &BytesRef<'_>) -> String {
    if let Ok(Some(ch)) = e.resolve_char_ref() {
        return ch.to_string();
    }
    let name = String::from_utf8_lossy(e);
    match resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{};", name),
    }
}

const ROOT: usize = 0;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug)]
enum Child {
    Element(usize),
    Text(String),
}

#[derive(Debug)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    children: Vec<Child>,
}

/// Arena of elements in document order; index 0 is the document node
#[derive(Debug)]
pub struct Document {
    elements: Vec<Element>,
}

impl Document {
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().check_end_names = false;

        let mut doc = Document {
            elements: vec![Element {
                name: String::new(),
                attrs: Vec::new(),
                parent: None,
                children: Vec::new(),
            }],
        };
        let mut stack = vec![ROOT];

        loop {
            let top = stack.last().copied().unwrap_or(ROOT);
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let id = doc.push_element(e, top);
                    if !is_void(&doc.elements[id].name) {
                        stack.push(id);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    doc.push_element(e, top);
                }
                Ok(Event::End(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    // Close up to the nearest matching open element; stray end tags are ignored
                    if let Some(pos) = stack
                        .iter()
                        .rposition(|&id| id != ROOT && doc.elements[id].name.eq_ignore_ascii_case(&name))
                    {
                        stack.truncate(pos);
                    }
                }
                Ok(Event::Text(ref e)) => {
                    doc.push_text(top, String::from_utf8_lossy(e).to_string());
                }
                Ok(Event::CData(ref e)) => {
                    doc.push_text(top, String::from_utf8_lossy(e).to_string());
                }
                Ok(Event::GeneralRef(ref e)) => {
                    doc.push_text(top, resolve_reference(e));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(format!("failed to parse document: {}", e)),
            }
        }

        Ok(doc)
    }

    fn push_element(&mut self, e: &BytesStart<'_>, parent: usize) -> usize {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let attrs = e
            .attributes()
            .flatten()
            .map(|attr| {
                let raw = String::from_utf8_lossy(&attr.value);
                // Unknown (HTML-only) entities keep the raw value
                let value = unescape(&raw).map(|v| v.into_owned()).unwrap_or_else(|_| raw.to_string());
                (String::from_utf8_lossy(attr.key.as_ref()).to_string(), value)
            })
            .collect();

        let id = self.elements.len();
        self.elements.push(Element {
            name,
            attrs,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.elements[parent].children.push(Child::Element(id));
        id
    }

    /// Adjacent text runs (split around entity references) are merged
    fn push_text(&mut self, parent: usize, text: String) {
        if text.is_empty() {
            return;
        }
        let children = &mut self.elements[parent].children;
        match children.last_mut() {
            Some(Child::Text(last)) => last.push_str(&text),
            _ => children.push(Child::Text(text)),
        }
    }

    fn child_elements(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.elements[id].children.iter().filter_map(|c| match c {
            Child::Element(child) => Some(*child),
            Child::Text(_) => None,
        })
    }

    /// `id` and every element below it, in document order
    fn descendants_or_self(&self, id: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            out.push(next);
            let children: Vec<usize> = self.child_elements(next).collect();
            pending.extend(children.into_iter().rev());
        }
        out
    }

    fn attr(&self, id: usize, name: &str) -> Option<&str> {
        self.elements[id]
            .attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the element and its descendants, trimmed
    fn string_value(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        for child in &self.elements[id].children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(child) => self.collect_text(*child, out),
            }
        }
    }
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    AnyElement,
    SelfNode,
    Parent,
    Text,
    Attr(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttr(String),
    AttrEq(String, String),
    ChildEq(String, String),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled location path
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    steps: Vec<Step>,
}

impl XPath {
    pub fn compile(expr: &str) -> Result<Self, String> {
        let mut rest = expr.trim();
        if rest.is_empty() {
            return Err("empty expression".to_string());
        }

        let mut axis = Axis::Child;
        if let Some(r) = rest.strip_prefix("//") {
            axis = Axis::Descendant;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
        }

        let mut steps = Vec::new();
        loop {
            let (text, remainder) = take_step(rest)?;
            steps.push(parse_step(text, axis)?);

            if remainder.is_empty() {
                break;
            }
            if let Some(r) = remainder.strip_prefix("//") {
                axis = Axis::Descendant;
                rest = r;
            } else {
                axis = Axis::Child;
                rest = &remainder[1..];
            }
            if rest.is_empty() {
                return Err("trailing `/`".to_string());
            }
        }

        let last = steps.len() - 1;
        for (i, step) in steps.iter().enumerate() {
            if matches!(step.test, NodeTest::Text | NodeTest::Attr(_)) && i != last {
                return Err("text() and @attr are only supported as the last step".to_string());
            }
        }

        Ok(Self { steps })
    }

    /// Values of the selected nodes in document order
    pub fn select(&self, doc: &Document) -> Vec<String> {
        let mut ctx = vec![ROOT];

        for step in &self.steps {
            match &step.test {
                NodeTest::Text => return select_text(doc, &ctx, step.axis),
                NodeTest::Attr(name) => return select_attr(doc, &ctx, step.axis, name),
                _ => ctx = select_nodes(doc, &ctx, step),
            }
        }

        ctx.into_iter()
            .filter(|&id| id != ROOT)
            .map(|id| doc.string_value(id))
            .collect()
    }
}

fn bases(doc: &Document, ctx: &[usize], axis: Axis) -> Vec<usize> {
    match axis {
        Axis::Child => ctx.to_vec(),
        Axis::Descendant => {
            let mut all: Vec<usize> = ctx.iter().flat_map(|&c| doc.descendants_or_self(c)).collect();
            all.sort_unstable();
            all.dedup();
            all
        }
    }
}

fn select_nodes(doc: &Document, ctx: &[usize], step: &Step) -> Vec<usize> {
    let mut out = Vec::new();

    for base in bases(doc, ctx, step.axis) {
        let candidates: Vec<usize> = match &step.test {
            NodeTest::Name(name) => doc
                .child_elements(base)
                .filter(|&id| doc.elements[id].name.eq_ignore_ascii_case(name))
                .collect(),
            NodeTest::AnyElement => doc.child_elements(base).collect(),
            NodeTest::SelfNode => vec![base],
            NodeTest::Parent => doc.elements[base].parent.into_iter().collect(),
            NodeTest::Text | NodeTest::Attr(_) => Vec::new(),
        };
        out.extend(filter(doc, candidates, &step.predicates));
    }

    out.sort_unstable();
    out.dedup();
    out
}

fn filter(doc: &Document, mut nodes: Vec<usize>, predicates: &[Predicate]) -> Vec<usize> {
    for predicate in predicates {
        nodes = match predicate {
            Predicate::Position(n) => nodes.get(n - 1).copied().into_iter().collect(),
            Predicate::Last => nodes.last().copied().into_iter().collect(),
            Predicate::HasAttr(a) => nodes.into_iter().filter(|&id| doc.attr(id, a).is_some()).collect(),
            Predicate::AttrEq(a, v) => nodes
                .into_iter()
                .filter(|&id| doc.attr(id, a) == Some(v.as_str()))
                .collect(),
            Predicate::ChildEq(name, v) => nodes
                .into_iter()
                .filter(|&id| {
                    doc.child_elements(id).any(|c| {
                        doc.elements[c].name.eq_ignore_ascii_case(name) && doc.string_value(c) == *v
                    })
                })
                .collect(),
        };
    }
    nodes
}

fn select_text(doc: &Document, ctx: &[usize], axis: Axis) -> Vec<String> {
    bases(doc, ctx, axis)
        .into_iter()
        .flat_map(|id| doc.elements[id].children.iter())
        .filter_map(|c| match c {
            Child::Text(text) => Some(text.trim()),
            Child::Element(_) => None,
        })
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn select_attr(doc: &Document, ctx: &[usize], axis: Axis, name: &str) -> Vec<String> {
    bases(doc, ctx, axis)
        .into_iter()
        .flat_map(|id| doc.elements[id].attrs.iter())
        .filter(|(k, _)| name == "*" || k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
        .collect()
}

/// Split off the first step, honouring brackets and quotes
fn take_step(input: &str) -> Result<(&str, &str), String> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced `]`".to_string())?;
            }
            (None, '/') if depth == 0 => return Ok((&input[..i], &input[i..])),
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err("unterminated predicate".to_string());
    }
    Ok((input, ""))
}

fn parse_step(text: &str, axis: Axis) -> Result<Step, String> {
    let (head, mut rest) = match text.find('[') {
        Some(open) => (&text[..open], &text[open..]),
        None => (text, ""),
    };

    let test = match head.trim() {
        "" => return Err("empty step".to_string()),
        "*" | "node()" => NodeTest::AnyElement,
        "." => NodeTest::SelfNode,
        ".." => NodeTest::Parent,
        "text()" => NodeTest::Text,
        name => match name.strip_prefix('@') {
            Some("*") => NodeTest::Attr("*".to_string()),
            Some(attr) if is_name(attr) => NodeTest::Attr(attr.to_string()),
            None if is_name(name) => NodeTest::Name(name.to_string()),
            _ => return Err(format!("unsupported step `{}`", name)),
        },
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let (inner, remainder) = take_predicate(rest)?;
        predicates.push(parse_predicate(inner)?);
        rest = remainder;
    }

    if !predicates.is_empty() && matches!(test, NodeTest::Text | NodeTest::Attr(_)) {
        return Err("predicates on text() or @attr are not supported".to_string());
    }

    Ok(Step { axis, test, predicates })
}

/// `[inner]rest` -> `(inner, rest)`
fn take_predicate(input: &str) -> Result<(&str, &str), String> {
    let body = input
        .strip_prefix('[')
        .ok_or_else(|| format!("unexpected `{}`", input))?;
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Ok((&body[..i], &body[i + 1..])),
            _ => {}
        }
    }
    Err("unterminated predicate".to_string())
}

fn parse_predicate(inner: &str) -> Result<Predicate, String> {
    let inner = inner.trim();
    if inner == "last()" {
        return Ok(Predicate::Last);
    }
    if let Ok(n) = inner.parse::<usize>() {
        return if n == 0 {
            Err("positions start at 1".to_string())
        } else {
            Ok(Predicate::Position(n))
        };
    }

    let (lhs, rhs) = match inner.split_once('=') {
        Some((l, r)) => (l.trim(), Some(literal(r.trim())?)),
        None => (inner, None),
    };

    match (lhs.strip_prefix('@'), rhs) {
        (Some(attr), None) if is_name(attr) => Ok(Predicate::HasAttr(attr.to_string())),
        (Some(attr), Some(v)) if is_name(attr) => Ok(Predicate::AttrEq(attr.to_string(), v)),
        (None, Some(v)) if is_name(lhs) => Ok(Predicate::ChildEq(lhs.to_string(), v)),
        _ => Err(format!("unsupported predicate `[{}]`", inner)),
    }
}

fn literal(raw: &str) -> Result<String, String> {
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return Ok(raw[1..raw.len() - 1].to_string());
        }
    }
    Err(format!("expected a quoted string, got `{}`", raw))
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ':' || c == '.')
}
