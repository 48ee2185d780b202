//! MDX document parser.
//!
//! Directives are found in the raw source before markdown parsing and
//! replaced by markers, so inline syntax inside attribute values (`*`,
//! backslashes, entities) reaches the directive exactly as written.

use std::borrow::Cow;
use std::sync::LazyLock;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use regex::{Captures, Regex};

use crate::directive::scan_directives;
use crate::frontmatter::{extract_frontmatter, FrontmatterError};
use crate::tree::{DirectiveNode, Document, Element, ImageNode, Node};

const MARK_OPEN: char = '\u{E000}';
const MARK_CLOSE: char = '\u{E001}';

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x{E000}(\d+)\x{E001}").expect("Invalid directive marker regex"));

/// Errors that can occur when parsing MDX.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Frontmatter error: {0}")]
    Frontmatter(#[from] FrontmatterError),
}

/// Markdown extensions enabled for every document.
pub fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// Parse an MDX document.
///
/// Extracts frontmatter, then builds the document tree with directives and
/// images as dedicated nodes.
pub fn parse_document(source: &str) -> Result<Document, ParseError> {
    let (frontmatter, content) = extract_frontmatter(source)?;

    Ok(Document {
        frontmatter: frontmatter.unwrap_or_default(),
        children: parse_markdown(content),
    })
}

/// Parse markdown (without frontmatter) into tree nodes.
pub fn parse_markdown(content: &str) -> Vec<Node> {
    let (marked, directives) = mark_directives(content);
    let mut builder = TreeBuilder::new(directives);
    for event in Parser::new_ext(&marked, markdown_options()) {
        builder.push(event);
    }
    builder.finish()
}

/// Swap every directive in `content` for an indexed marker.
fn mark_directives(content: &str) -> (Cow<'_, str>, Vec<DirectiveNode>) {
    let found = scan_directives(content);
    if found.is_empty() {
        return (Cow::Borrowed(content), Vec::new());
    }

    let mut marked = String::with_capacity(content.len());
    let mut directives = Vec::with_capacity(found.len());
    let mut cursor = 0;
    for directive in found {
        marked.push_str(&content[cursor..directive.range.start]);
        cursor = directive.range.end;
        marked.push(MARK_OPEN);
        marked.push_str(&directives.len().to_string());
        marked.push(MARK_CLOSE);
        directives.push(directive.into_node(content));
    }
    marked.push_str(&content[cursor..]);

    (Cow::Owned(marked), directives)
}

enum FrameKind {
    Root,
    Element { tag: String, attributes: Vec<(String, String)> },
    Paragraph,
    CodeBlock { language: Option<String> },
    Image { url: String, title: Option<String> },
    TableHead,
    Table { alignments: Vec<Alignment> },
    Transparent,
}

struct Frame {
    kind: FrameKind,
    children: Vec<Node>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }
}

/// Builds a tree from the flat pulldown-cmark event stream.
struct TreeBuilder {
    stack: Vec<Frame>,
    directives: Vec<DirectiveNode>,
    in_table_head: bool,
    cell_index: usize,
}

impl TreeBuilder {
    fn new(directives: Vec<DirectiveNode>) -> Self {
        Self {
            stack: vec![Frame::new(FrameKind::Root)],
            directives,
            in_table_head: false,
            cell_index: 0,
        }
    }

    fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.open(tag),
            Event::End(_) => self.close(),
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => {
                let code = self.restore(&code).into_owned();
                self.append(Node::InlineCode(code));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let html = self.restore(&html).into_owned();
                self.append(Node::Html(html));
            }
            Event::SoftBreak => self.push_text("\n"),
            Event::HardBreak => self.append(Node::Break),
            Event::Rule => self.append(Node::Element(Element::new("hr", Vec::new()))),
            Event::FootnoteReference(label) => {
                let label = self.restore(&label).into_owned();
                let link = Element {
                    tag: "a".to_string(),
                    attributes: vec![("href".to_string(), format!("#fn-{}", label))],
                    children: vec![Node::Text(label)],
                };
                self.append(Node::Element(Element::new("sup", vec![Node::Element(link)])));
            }
            Event::TaskListMarker(checked) => {
                let mut attributes = vec![
                    ("type".to_string(), "checkbox".to_string()),
                    ("disabled".to_string(), "true".to_string()),
                ];
                if checked {
                    attributes.push(("checked".to_string(), "true".to_string()));
                }
                self.append(Node::Element(Element {
                    tag: "input".to_string(),
                    attributes,
                    children: Vec::new(),
                }));
            }
            _ => {}
        }
    }

    fn open(&mut self, tag: Tag<'_>) {
        let kind = match tag {
            Tag::Paragraph => FrameKind::Paragraph,
            Tag::Heading { level, id, classes, .. } => {
                let mut attributes = Vec::new();
                if let Some(id) = id {
                    attributes.push(("id".to_string(), self.restore(&id).into_owned()));
                }
                if !classes.is_empty() {
                    let classes: Vec<_> = classes.iter().map(|c| self.restore(c).into_owned()).collect();
                    attributes.push(("className".to_string(), classes.join(" ")));
                }
                FrameKind::Element {
                    tag: heading_tag(level).to_string(),
                    attributes,
                }
            }
            Tag::BlockQuote(_) => element("blockquote"),
            Tag::CodeBlock(kind) => FrameKind::CodeBlock {
                language: match kind {
                    CodeBlockKind::Fenced(info) => self
                        .restore(&info)
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                },
            },
            Tag::HtmlBlock => FrameKind::Transparent,
            Tag::List(Some(start)) => {
                let attributes = if start == 1 {
                    Vec::new()
                } else {
                    vec![("start".to_string(), start.to_string())]
                };
                FrameKind::Element {
                    tag: "ol".to_string(),
                    attributes,
                }
            }
            Tag::List(None) => element("ul"),
            Tag::Item => element("li"),
            Tag::FootnoteDefinition(label) => FrameKind::Element {
                tag: "div".to_string(),
                attributes: vec![
                    ("id".to_string(), format!("fn-{}", self.restore(&label))),
                    ("className".to_string(), "footnote-definition".to_string()),
                ],
            },
            Tag::Table(alignments) => FrameKind::Table { alignments },
            Tag::TableHead => {
                self.in_table_head = true;
                self.cell_index = 0;
                FrameKind::TableHead
            }
            Tag::TableRow => {
                self.cell_index = 0;
                element("tr")
            }
            Tag::TableCell => {
                let mut attributes = Vec::new();
                if let Some(align) = self.current_alignment() {
                    attributes.push(("align".to_string(), align.to_string()));
                }
                self.cell_index += 1;
                FrameKind::Element {
                    tag: if self.in_table_head { "th" } else { "td" }.to_string(),
                    attributes,
                }
            }
            Tag::Emphasis => element("em"),
            Tag::Strong => element("strong"),
            Tag::Strikethrough => element("del"),
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut attributes = vec![("href".to_string(), self.restore(&dest_url).into_owned())];
                if !title.is_empty() {
                    attributes.push(("title".to_string(), self.restore(&title).into_owned()));
                }
                FrameKind::Element {
                    tag: "a".to_string(),
                    attributes,
                }
            }
            Tag::Image {
                dest_url, title, ..
            } => FrameKind::Image {
                url: self.restore(&dest_url).into_owned(),
                title: (!title.is_empty()).then(|| self.restore(&title).into_owned()),
            },
            _ => element("div"),
        };

        self.stack.push(Frame::new(kind));
    }

    fn close(&mut self) {
        // The root frame is never popped by an end event.
        if self.stack.len() < 2 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };

        match frame.kind {
            FrameKind::Root => {}
            FrameKind::Paragraph => {
                let mut children = self.split_directives(frame.children);
                if let Some(index) = lone_directive(&children) {
                    if let Node::Directive(mut directive) = children.swap_remove(index) {
                        directive.flow = true;
                        self.append(Node::Directive(directive));
                        return;
                    }
                }
                self.append(Node::Element(Element::new("p", children)));
            }
            FrameKind::Element { tag, attributes } => {
                self.append(Node::Element(Element {
                    tag,
                    attributes,
                    children: self.split_directives(frame.children),
                }));
            }
            FrameKind::CodeBlock { language } => {
                let code = Element {
                    tag: "code".to_string(),
                    attributes: language
                        .map(|lang| vec![("className".to_string(), format!("language-{}", lang))])
                        .unwrap_or_default(),
                    children: frame
                        .children
                        .into_iter()
                        .map(|child| match child {
                            Node::Text(text) => Node::Text(self.restore(&text).into_owned()),
                            other => other,
                        })
                        .collect(),
                };
                self.append(Node::Element(Element::new("pre", vec![Node::Element(code)])));
            }
            FrameKind::Image { url, title } => {
                let alt: String = frame.children.iter().map(Node::text_content).collect();
                let alt = self.restore(&alt).into_owned();
                self.append(Node::Image(ImageNode { url, alt, title }));
            }
            FrameKind::TableHead => {
                self.in_table_head = false;
                let row = Node::Element(Element::new("tr", frame.children));
                self.append(Node::Element(Element::new("thead", vec![row])));
            }
            FrameKind::Table { .. } => {
                let mut head = Vec::new();
                let mut body = Vec::new();
                for child in frame.children {
                    match &child {
                        Node::Element(el) if el.tag == "thead" => head.push(child),
                        _ => body.push(child),
                    }
                }
                if !body.is_empty() {
                    head.push(Node::Element(Element::new("tbody", body)));
                }
                self.append(Node::Element(Element::new("table", head)));
            }
            FrameKind::Transparent => {
                for child in frame.children {
                    self.append(child);
                }
            }
        }
    }

    fn current_alignment(&self) -> Option<&'static str> {
        let alignments = self.stack.iter().rev().find_map(|frame| match &frame.kind {
            FrameKind::Table { alignments } => Some(alignments),
            _ => None,
        })?;

        match alignments.get(self.cell_index)? {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.current_children();
        if let Some(Node::Text(existing)) = children.last_mut() {
            existing.push_str(text);
        } else {
            children.push(Node::Text(text.to_string()));
        }
    }

    fn append(&mut self, node: Node) {
        self.current_children().push(node);
    }

    fn current_children(&mut self) -> &mut Vec<Node> {
        let last = self.stack.len() - 1;
        &mut self.stack[last].children
    }

    fn finish(mut self) -> Vec<Node> {
        while self.stack.len() > 1 {
            self.close();
        }
        match self.stack.pop() {
            Some(root) => self.split_directives(root.children),
            None => Vec::new(),
        }
    }

    fn directive(&self, index: &str) -> Option<&DirectiveNode> {
        index.parse::<usize>().ok().and_then(|i| self.directives.get(i))
    }

    /// Put the source text of any directive markers back into `text`.
    fn restore<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.directives.is_empty() || !text.contains(MARK_OPEN) {
            return Cow::Borrowed(text);
        }
        MARKER_RE.replace_all(text, |caps: &Captures<'_>| match self.directive(&caps[1]) {
            Some(directive) => directive.raw.clone(),
            None => caps[0].to_string(),
        })
    }

    /// Split text nodes around directive markers, leaving everything else
    /// untouched.
    fn split_directives(&self, children: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::with_capacity(children.len());

        for child in children {
            let Node::Text(text) = child else {
                out.push(child);
                continue;
            };
            if !text.contains(MARK_OPEN) {
                out.push(Node::Text(text));
                continue;
            }

            let mut cursor = 0;
            for caps in MARKER_RE.captures_iter(&text) {
                let (Some(whole), Some(directive)) = (caps.get(0), self.directive(&caps[1])) else {
                    continue;
                };
                if whole.start() > cursor {
                    out.push(Node::Text(text[cursor..whole.start()].to_string()));
                }
                cursor = whole.end();
                out.push(Node::Directive(directive.clone()));
            }
            if cursor < text.len() {
                out.push(Node::Text(text[cursor..].to_string()));
            }
        }

        out
    }
}

fn element(tag: &str) -> FrameKind {
    FrameKind::Element {
        tag: tag.to_string(),
        attributes: Vec::new(),
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

/// Index of the only directive in a paragraph whose other children are blank text.
fn lone_directive(children: &[Node]) -> Option<usize> {
    let mut found = None;
    for (index, child) in children.iter().enumerate() {
        match child {
            Node::Directive(_) if found.is_none() => found = Some(index),
            Node::Text(text) if text.trim().is_empty() => {}
            _ => return None,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DirectiveNode;
    use pretty_assertions::assert_eq;

    fn only_paragraph(doc: &Document) -> &Element {
        match doc.children.as_slice() {
            [Node::Element(p)] if p.tag == "p" => p,
            other => panic!("expected a single paragraph, got {:?}", other),
        }
    }

    #[test]
    fn parses_complete_mdx() {
        let source = r#"---
title: Fragments
---

# Heading

Some *emphasis* and `code`.

```rust
fn main() {}
```
"#;

        let doc = parse_document(source).unwrap();

        assert_eq!(doc.frontmatter.title(), Some("Fragments"));
        assert_eq!(doc.children.len(), 3);

        let Node::Element(heading) = &doc.children[0] else {
            panic!("expected heading");
        };
        assert_eq!(heading.tag, "h1");
        assert_eq!(doc.children[0].text_content(), "Heading");

        let Node::Element(pre) = &doc.children[2] else {
            panic!("expected code block");
        };
        assert_eq!(pre.tag, "pre");
        let Some(Node::Element(code)) = pre.children.first() else {
            panic!("expected code element");
        };
        assert_eq!(code.attribute("className"), Some("language-rust"));
        assert_eq!(code.children, vec![Node::Text("fn main() {}\n".to_string())]);
    }

    #[test]
    fn lone_directive_replaces_paragraph() {
        let doc = parse_document(r#":youtube{id="dQw4w9WgXcQ"}"#).unwrap();

        let [Node::Directive(directive)] = doc.children.as_slice() else {
            panic!("expected a flow directive, got {:?}", doc.children);
        };
        assert_eq!(directive.name, "youtube");
        assert!(directive.flow);
        assert_eq!(directive.attribute("id"), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn inline_directive_stays_in_paragraph() {
        let doc = parse_document(r#"See :preview{url="https://example.com"} for more."#).unwrap();
        let p = only_paragraph(&doc);

        assert_eq!(p.children.len(), 3);
        assert_eq!(p.children[0], Node::Text("See ".to_string()));
        let Node::Directive(DirectiveNode { name, flow, .. }) = &p.children[1] else {
            panic!("expected directive");
        };
        assert_eq!(name, "preview");
        assert!(!flow);
        assert_eq!(p.children[2], Node::Text(" for more.".to_string()));
    }

    #[test]
    fn images_and_directives_keep_sibling_order() {
        let doc = parse_document("![img](u1) :preview{url=u2} ![img](u3)").unwrap();
        let p = only_paragraph(&doc);

        let kinds: Vec<&str> = p
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Image(image) => Some(image.url.as_str()),
                Node::Directive(directive) => directive.attribute("url"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn image_alt_and_title() {
        let doc = parse_document(r#"![A *bold* cat](/cat.png "Cat")"#).unwrap();
        let p = only_paragraph(&doc);

        assert_eq!(
            p.children,
            vec![Node::Image(ImageNode {
                url: "/cat.png".to_string(),
                alt: "A bold cat".to_string(),
                title: Some("Cat".to_string()),
            })]
        );
    }

    #[test]
    fn directives_in_code_are_ignored() {
        let doc = parse_document("```\n:youtube{id=\"x\"}\n```\n\nInline `:preview{url=y}`").unwrap();

        let found = doc.find_paths(|node| matches!(node, Node::Directive(_)));
        assert!(found.is_empty());
    }

    #[test]
    fn directive_attributes_bypass_inline_syntax() {
        let source = r#"See :preview{url=https://a.com/a*b*c title="x &amp; \*y\*"} and *more*."#;

        let doc = parse_document(source).unwrap();
        let p = only_paragraph(&doc);

        let Node::Directive(directive) = &p.children[1] else {
            panic!("expected directive, got {:?}", p.children);
        };
        assert_eq!(directive.attribute("url"), Some("https://a.com/a*b*c"));
        assert_eq!(directive.attribute("title"), Some(r"x &amp; \*y\*"));
        assert_eq!(
            directive.raw,
            r#":preview{url=https://a.com/a*b*c title="x &amp; \*y\*"}"#
        );
        assert_eq!(p.children[2], Node::Text(" and ".to_string()));
        let Node::Element(em) = &p.children[3] else {
            panic!("expected emphasis");
        };
        assert_eq!(em.tag, "em");
        assert_eq!(p.children[3].text_content(), "more");
    }

    #[test]
    fn directive_text_outside_prose_is_restored() {
        let source = "```\n:youtube{id=\"x\"}\n```\n\nInline `:preview{url=y}` and [a link](https://a.com/:x{y}).";

        let doc = parse_document(source).unwrap();

        assert_eq!(doc.children[0].text_content(), ":youtube{id=\"x\"}\n");
        let Node::Element(p) = &doc.children[1] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.children[1], Node::InlineCode(":preview{url=y}".to_string()));
        let Node::Element(link) = &p.children[3] else {
            panic!("expected link, got {:?}", p.children);
        };
        assert_eq!(link.attribute("href"), Some("https://a.com/:x{y}"));
    }

    #[test]
    fn parses_tables_with_alignment() {
        let doc = parse_document("| a | b |\n|:--|--:|\n| 1 | 2 |\n").unwrap();

        let [Node::Element(table)] = doc.children.as_slice() else {
            panic!("expected table");
        };
        assert_eq!(table.tag, "table");
        let tags: Vec<&str> = table
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Element(e) => Some(e.tag.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec!["thead", "tbody"]);

        let cells = doc.find_paths(|n| matches!(n, Node::Element(e) if e.tag == "td"));
        let Some(Node::Element(last)) = doc.get(&cells[1]) else {
            panic!("expected cell");
        };
        assert_eq!(last.attribute("align"), Some("right"));
    }

    #[test]
    fn parses_without_frontmatter() {
        let doc = parse_document("Just text.").unwrap();

        assert!(doc.frontmatter.is_empty());
        assert_eq!(only_paragraph(&doc).children, vec![Node::Text("Just text.".to_string())]);
    }

    #[test]
    fn propagates_frontmatter_errors() {
        let result = parse_document("---\ntitle: x\n");

        assert!(matches!(result, Err(ParseError::Frontmatter(FrontmatterError::Unclosed))));
    }
}
