//! Document tree produced by the parser and rewritten by the resolver.

use std::collections::BTreeMap;

use crate::frontmatter::Frontmatter;

/// Position of a node: child indices from the document root down.
pub type NodePath = Vec<usize>;

/// A parsed Markdown/MDX document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Frontmatter map (empty when the source has none)
    pub frontmatter: Frontmatter,

    /// Top-level nodes in source order
    pub children: Vec<Node>,
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Any ordinary markdown construct, normalised to an element name.
    Element(Element),
    /// Plain text
    Text(String),
    /// Inline code span
    InlineCode(String),
    /// Raw HTML, passed through untouched
    Html(String),
    /// Hard line break
    Break,
    /// `:name{...}` directive not yet resolved
    Directive(DirectiveNode),
    /// Standard markdown image
    Image(ImageNode),
    /// Resolved embeddable component reference
    Embed(EmbedNode),
}

/// An opaque element such as a paragraph, heading or table cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element name (`p`, `h2`, `blockquote`, ...)
    pub tag: String,

    /// Attributes in emission order
    pub attributes: Vec<(String, String)>,

    /// Child nodes
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element without attributes.
    pub fn new(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children,
        }
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A custom directive such as `:youtube{id="..."}`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveNode {
    /// Directive name (`youtube`, `preview`, ...)
    pub name: String,

    /// Parsed attributes. Shorthand values are stored under `#`.
    pub attributes: BTreeMap<String, String>,

    /// Source text of the directive, used when it stays unresolved
    pub raw: String,

    /// Whether the directive stood alone in its paragraph
    pub flow: bool,
}

impl DirectiveNode {
    /// Shorthand key used for `{#value}`.
    pub const SHORTHAND: &'static str = "#";

    /// Attribute value without surrounding whitespace, if any remains.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Named attribute, falling back to the shorthand positional value.
    pub fn attribute_or_shorthand(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .or_else(|| self.attribute(Self::SHORTHAND))
    }
}

/// A standard markdown image reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    /// Image destination
    pub url: String,

    /// Alt text (plain text of the image label)
    pub alt: String,

    /// Optional title
    pub title: Option<String>,
}

/// Renderable component an embed refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    YouTube,
    LinkPreview,
    Image,
}

impl Component {
    /// All embeddable components.
    pub const ALL: [Component; 3] = [Self::YouTube, Self::LinkPreview, Self::Image];

    /// Name the rendering layer maps to a concrete renderer.
    pub fn name(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::LinkPreview => "LinkPreviewStatic",
            Self::Image => "MdxImage",
        }
    }
}

/// "Render this component with these attributes."
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedNode {
    /// Component to render
    pub component: Component,

    /// Attributes in emission order
    pub attributes: Vec<(String, String)>,
}

impl EmbedNode {
    /// Create an embed without attributes.
    pub fn new(component: Component) -> Self {
        Self {
            component,
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute push.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Append an attribute.
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.push((name.to_string(), value.into()));
    }

    /// Replace an attribute value, appending it when absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute names in order.
    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|(key, _)| key.as_str()).collect()
    }
}

impl Node {
    /// Child nodes, for node kinds that have them.
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Element(element) => Some(&element.children),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Element(element) => Some(&mut element.children),
            _ => None,
        }
    }

    /// Concatenated text content.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) | Node::InlineCode(text) => out.push_str(text),
        Node::Element(element) => {
            for child in &element.children {
                collect_text(child, out);
            }
        }
        Node::Image(image) => out.push_str(&image.alt),
        _ => {}
    }
}

impl Document {
    /// Visit every node depth-first in document order.
    pub fn visit<F>(&self, mut f: F)
    where
        F: FnMut(&[usize], &Node),
    {
        let mut path = Vec::new();
        visit_nodes(&self.children, &mut path, &mut f);
    }

    /// Paths of every node matching `predicate`, in document order.
    pub fn find_paths<P>(&self, mut predicate: P) -> Vec<NodePath>
    where
        P: FnMut(&Node) -> bool,
    {
        let mut paths = Vec::new();
        self.visit(|path, node| {
            if predicate(node) {
                paths.push(path.to_vec());
            }
        });
        paths
    }

    /// Node at `path`.
    pub fn get(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            node = node.children()?.get(*index)?;
        }
        Some(node)
    }

    /// Mutable node at `path`.
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for index in rest {
            node = node.children_mut()?.get_mut(*index)?;
        }
        Some(node)
    }

    /// Substitute the node at `path`, returning the previous one.
    pub fn replace(&mut self, path: &[usize], replacement: Node) -> Option<Node> {
        let slot = self.get_mut(path)?;
        Some(std::mem::replace(slot, replacement))
    }

    /// All embed nodes in document order.
    pub fn embeds(&self) -> Vec<&EmbedNode> {
        let mut embeds = Vec::new();
        collect_embeds(&self.children, &mut embeds);
        embeds
    }
}

fn visit_nodes<F>(nodes: &[Node], path: &mut Vec<usize>, f: &mut F)
where
    F: FnMut(&[usize], &Node),
{
    for (index, node) in nodes.iter().enumerate() {
        path.push(index);
        f(path, node);
        if let Some(children) = node.children() {
            visit_nodes(children, path, f);
        }
        path.pop();
    }
}

fn collect_embeds<'a>(nodes: &'a [Node], out: &mut Vec<&'a EmbedNode>) {
    for node in nodes {
        match node {
            Node::Embed(embed) => out.push(embed),
            Node::Element(element) => collect_embeds(&element.children, out),
            _ => {}
        }
    }
}
