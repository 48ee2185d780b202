//! MDX document tree with frontmatter and directive syntax.
//!
//! This crate parses Markdown extended with `:name{...}` directives into an
//! ordered tree in which directives and images are dedicated nodes, ready to
//! be rewritten into embeddable component references.

pub mod directive;
pub mod frontmatter;
pub mod parser;
pub mod tree;

pub use directive::{parse_attributes, scan_directives, DirectiveMatch};
pub use frontmatter::{Frontmatter, FrontmatterError};
pub use parser::{parse_document, parse_markdown, ParseError};
pub use tree::{
    Component, DirectiveNode, Document, Element, EmbedNode, ImageNode, Node, NodePath,
};
