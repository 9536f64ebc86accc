use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, TransformError};
use crate::ops::Path;
use crate::range::Point;

pub type Attrs = BTreeMap<String, Value>;

pub const RESERVED_ATTRS: [&str; 3] = ["type", "children", "text"];

pub const SEED_TEXT: &str = "A line of text in a paragraph.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    HeadingThree,
    HeadingFour,
    HeadingFive,
    HeadingSix,
    BlockQuote,
    BulletedList,
    ListItem,
    Code,
    Link,
    /// Element persisted without a kind; rendered like a paragraph.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    BlockOnly,
    InlineOnly,
    TextOnly,
}

impl ElementKind {
    pub const ALL: [ElementKind; 13] = [
        ElementKind::Paragraph,
        ElementKind::HeadingOne,
        ElementKind::HeadingTwo,
        ElementKind::HeadingThree,
        ElementKind::HeadingFour,
        ElementKind::HeadingFive,
        ElementKind::HeadingSix,
        ElementKind::BlockQuote,
        ElementKind::BulletedList,
        ElementKind::ListItem,
        ElementKind::Code,
        ElementKind::Link,
        ElementKind::Default,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Paragraph => "paragraph",
            ElementKind::HeadingOne => "heading-one",
            ElementKind::HeadingTwo => "heading-two",
            ElementKind::HeadingThree => "heading-three",
            ElementKind::HeadingFour => "heading-four",
            ElementKind::HeadingFive => "heading-five",
            ElementKind::HeadingSix => "heading-six",
            ElementKind::BlockQuote => "block-quote",
            ElementKind::BulletedList => "bulleted-list",
            ElementKind::ListItem => "list-item",
            ElementKind::Code => "code",
            ElementKind::Link => "link",
            ElementKind::Default => "default",
        }
    }

    pub fn heading(level: usize) -> Option<Self> {
        match level {
            1 => Some(ElementKind::HeadingOne),
            2 => Some(ElementKind::HeadingTwo),
            3 => Some(ElementKind::HeadingThree),
            4 => Some(ElementKind::HeadingFour),
            5 => Some(ElementKind::HeadingFive),
            6 => Some(ElementKind::HeadingSix),
            _ => None,
        }
    }

    pub fn heading_level(self) -> Option<usize> {
        (1..=6).find(|level| ElementKind::heading(*level) == Some(self))
    }

    pub fn role(self) -> NodeRole {
        match self {
            ElementKind::Link => NodeRole::Inline,
            _ => NodeRole::Block,
        }
    }

    pub fn children(self) -> ChildConstraint {
        match self {
            ElementKind::BulletedList => ChildConstraint::BlockOnly,
            ElementKind::Link => ChildConstraint::TextOnly,
            _ => ChildConstraint::InlineOnly,
        }
    }

    pub fn is_inline(self) -> bool {
        self.role() == NodeRole::Inline
    }

    pub fn is_text_block(self) -> bool {
        self.role() == NodeRole::Block && self.children() == ChildConstraint::InlineOnly
    }

    pub fn is_container(self) -> bool {
        self.children() == ChildConstraint::BlockOnly
    }

    fn is_default(&self) -> bool {
        *self == ElementKind::Default
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown element kind: {s}"))
    }
}

fn default_kind() -> ElementKind {
    ElementKind::Default
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkFormat {
    Bold,
    Italic,
    #[serde(alias = "underlined")]
    Underline,
    Code,
}

impl MarkFormat {
    pub const ALL: [MarkFormat; 4] = [
        MarkFormat::Bold,
        MarkFormat::Italic,
        MarkFormat::Underline,
        MarkFormat::Code,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkFormat::Bold => "bold",
            MarkFormat::Italic => "italic",
            MarkFormat::Underline => "underline",
            MarkFormat::Code => "code",
        }
    }
}

impl fmt::Display for MarkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bold" => Ok(MarkFormat::Bold),
            "italic" => Ok(MarkFormat::Italic),
            "underline" | "underlined" => Ok(MarkFormat::Underline),
            "code" => Ok(MarkFormat::Code),
            _ => Err(format!("Unknown mark: {s}")),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false", alias = "underlined")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

impl Marks {
    pub fn get(&self, format: MarkFormat) -> bool {
        match format {
            MarkFormat::Bold => self.bold,
            MarkFormat::Italic => self.italic,
            MarkFormat::Underline => self.underline,
            MarkFormat::Code => self.code,
        }
    }

    pub fn set(&mut self, format: MarkFormat, value: bool) {
        match format {
            MarkFormat::Bold => self.bold = value,
            MarkFormat::Italic => self.italic = value,
            MarkFormat::Underline => self.underline = value,
            MarkFormat::Code => self.code = value,
        }
    }

    pub fn with(mut self, format: MarkFormat, value: bool) -> Self {
        self.set(format, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Marks::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(flatten)]
    pub marks: Marks,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(
        rename = "type",
        default = "default_kind",
        skip_serializing_if = "ElementKind::is_default"
    )]
    pub kind: ElementKind,
    #[serde(flatten)]
    pub attrs: Attrs,
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(kind: ElementKind, attrs: Attrs, children: Vec<Node>) -> Result<Self, SchemaError> {
        let element = Self {
            kind,
            attrs,
            children,
        };
        validate_element(&element, &mut Vec::new())?;
        Ok(element)
    }

    pub fn text_block(kind: ElementKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            attrs: Attrs::default(),
            children: vec![Node::Text(TextNode::new(text))],
        }
    }

    pub fn link_template(url: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("url".to_string(), Value::String(url.into()));
        Self {
            kind: ElementKind::Link,
            attrs,
            children: Vec::new(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.attrs.get("url").and_then(|v| v.as_str())
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Text(TextNode),
    Element(ElementNode),
}

// A node is a text leaf exactly when it carries a `text` key; everything else
// must parse as an element, so unknown kinds surface serde's own error.
impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Err(de::Error::custom("expected a node object"));
        }
        if value.get("text").is_some() {
            TextNode::deserialize(value)
                .map(Node::Text)
                .map_err(de::Error::custom)
        } else {
            ElementNode::deserialize(value)
                .map(Node::Element)
                .map_err(de::Error::custom)
        }
    }
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Element(ElementNode::text_block(ElementKind::Paragraph, text))
    }

    pub fn text_block(kind: ElementKind, text: impl Into<String>) -> Self {
        Node::Element(ElementNode::text_block(kind, text))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode::new(text))
    }

    pub fn marked(text: impl Into<String>, marks: Marks) -> Self {
        Node::Text(TextNode::marked(text, marks))
    }

    pub fn link(url: impl Into<String>, text: impl Into<String>) -> Self {
        let mut link = ElementNode::link_template(url);
        link.children.push(Node::text(text));
        Node::Element(link)
    }

    pub fn element(kind: ElementKind, children: Vec<Node>) -> Result<Self, SchemaError> {
        ElementNode::new(kind, Attrs::default(), children).map(Node::Element)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Node::Element(el) if !el.kind.is_inline())
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Node::Element(el) if el.kind.is_inline())
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(el) => el.text(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Node::Text(_) => "text".to_string(),
            Node::Element(el) => el.kind.as_str().to_string(),
        }
    }
}

fn collect_text(children: &[Node], out: &mut String) {
    for child in children {
        match child {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Document {
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
pub struct TextBlock<'a> {
    pub element: &'a ElementNode,
    pub depth: usize,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn seed() -> Self {
        Self {
            children: vec![Node::paragraph(SEED_TEXT)],
        }
    }

    pub fn node_at(&self, path: &[usize]) -> Result<&Node, TransformError> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| TransformError::invalid_path(path, "the root is not a node"))?;
        let mut node = self
            .children
            .get(*first)
            .ok_or_else(|| TransformError::invalid_path(path, "index out of bounds"))?;
        for &ix in rest {
            node = match node {
                Node::Element(el) => el
                    .children
                    .get(ix)
                    .ok_or_else(|| TransformError::invalid_path(path, "index out of bounds"))?,
                Node::Text(_) => {
                    return Err(TransformError::invalid_path(path, "text nodes have no children"));
                }
            };
        }
        Ok(node)
    }

    pub fn element_at(&self, path: &[usize]) -> Result<&ElementNode, TransformError> {
        match self.node_at(path)? {
            Node::Element(el) => Ok(el),
            Node::Text(_) => Err(TransformError::invalid_path(path, "expected an element")),
        }
    }

    pub fn text_at(&self, path: &[usize]) -> Result<&TextNode, TransformError> {
        match self.node_at(path)? {
            Node::Text(t) => Ok(t),
            Node::Element(_) => Err(TransformError::invalid_path(path, "expected a text node")),
        }
    }

    pub fn children_at(&self, path: &[usize]) -> Result<&[Node], TransformError> {
        if path.is_empty() {
            return Ok(&self.children);
        }
        Ok(&self.element_at(path)?.children)
    }

    /// Parent element of the node at `path`. Top-level nodes have the root as
    /// parent, which is not a node, so they fail like the root itself.
    pub fn parent(&self, path: &[usize]) -> Result<(&ElementNode, Path), TransformError> {
        if path.len() < 2 {
            return Err(TransformError::invalid_path(path, "node has no parent element"));
        }
        self.node_at(path)?;
        let parent_path = path[..path.len() - 1].to_vec();
        let parent = self.element_at(&parent_path)?;
        Ok((parent, parent_path))
    }

    pub fn text_blocks(&self) -> Vec<(Path, TextBlock<'_>)> {
        let mut out = Vec::new();
        collect_text_blocks(&self.children, &mut Vec::new(), &mut out);
        out
    }

    pub fn text_block_of(&self, path: &[usize]) -> Option<Path> {
        (1..=path.len()).rev().find_map(|len| {
            let prefix = &path[..len];
            match self.node_at(prefix) {
                Ok(Node::Element(el)) if el.kind.is_text_block() => Some(prefix.to_vec()),
                _ => None,
            }
        })
    }

    pub fn start_point(&self) -> Option<Point> {
        edge_text_point(&self.children, &mut Vec::new(), false)
    }

    pub fn end_point(&self) -> Option<Point> {
        edge_text_point(&self.children, &mut Vec::new(), true)
    }

    pub fn plain_text(&self) -> String {
        self.children
            .iter()
            .map(Node::text_content)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        for (ix, node) in self.children.iter().enumerate() {
            let mut path = vec![ix];
            match node {
                Node::Element(el) if !el.kind.is_inline() => validate_element(el, &mut path)?,
                other => {
                    return Err(SchemaError::InvalidRootChild {
                        child: other.describe(),
                        path,
                    });
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn collect_text_blocks<'a>(
    children: &'a [Node],
    path: &mut Vec<usize>,
    out: &mut Vec<(Path, TextBlock<'a>)>,
) {
    for (ix, node) in children.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        if el.kind.is_inline() {
            continue;
        }
        path.push(ix);
        if el.kind.is_text_block() {
            out.push((
                path.clone(),
                TextBlock {
                    element: el,
                    depth: path.len(),
                },
            ));
        } else {
            collect_text_blocks(&el.children, path, out);
        }
        path.pop();
    }
}

pub(crate) fn edge_text_point(children: &[Node], path: &mut Vec<usize>, end: bool) -> Option<Point> {
    let indices: Box<dyn Iterator<Item = usize>> = if end {
        Box::new((0..children.len()).rev())
    } else {
        Box::new(0..children.len())
    };
    for ix in indices {
        path.push(ix);
        let found = match &children[ix] {
            Node::Text(t) => Some(Point::new(path.clone(), if end { t.text.len() } else { 0 })),
            Node::Element(el) => edge_text_point(&el.children, path, end),
        };
        path.pop();
        if found.is_some() {
            return found;
        }
    }
    None
}

fn validate_element(el: &ElementNode, path: &mut Vec<usize>) -> Result<(), SchemaError> {
    if el.children.is_empty() {
        return Err(SchemaError::EmptyElement {
            kind: el.kind,
            path: path.clone(),
        });
    }
    if let Some(key) = RESERVED_ATTRS.iter().find(|key| el.attrs.contains_key(**key)) {
        return Err(SchemaError::ReservedAttribute {
            key: key.to_string(),
            path: path.clone(),
        });
    }

    for (ix, child) in el.children.iter().enumerate() {
        let allowed = match el.kind.children() {
            ChildConstraint::BlockOnly => child.is_block(),
            ChildConstraint::InlineOnly => child.is_text() || child.is_inline(),
            ChildConstraint::TextOnly => child.is_text(),
        };
        path.push(ix);
        if !allowed {
            return Err(SchemaError::InvalidChild {
                parent: el.kind,
                child: child.describe(),
                path: path.clone(),
            });
        }
        if let Node::Element(child_el) = child {
            validate_element(child_el, path)?;
        }
        path.pop();
    }
    Ok(())
}
