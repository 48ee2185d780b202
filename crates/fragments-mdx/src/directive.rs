//! Directive syntax: `:name{attributes}` and `::name{attributes}`.
//!
//! Supported attribute forms:
//! - `key="value"`, `key='value'`, `key=value`
//! - `#value` or `#=value` (shorthand, stored under `#`)
//! - `.class` (appended to `class`)
//! - `key` (present with an empty value)

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::tree::DirectiveNode;

/// A directive found in a span of text.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveMatch<'a> {
    /// Byte range of the whole directive within the scanned text
    pub range: Range<usize>,

    /// Directive name
    pub name: &'a str,

    /// Parsed attributes
    pub attributes: BTreeMap<String, String>,
}

impl DirectiveMatch<'_> {
    /// Convert into a tree node.
    pub fn into_node(self, text: &str) -> DirectiveNode {
        DirectiveNode {
            name: self.name.to_string(),
            raw: text[self.range.clone()].to_string(),
            attributes: self.attributes,
            flow: false,
        }
    }
}

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::?([A-Za-z][A-Za-z0-9_-]*)\{([^}]*)\}").expect("Invalid directive regex")
});

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"#\s*=?\s*(?:"(?P<sdq>[^"]*)"|'(?P<ssq>[^']*)'|(?P<sbare>[^\s"'}]+))|\.(?P<class>[^\s"'.#=}]+)|(?P<key>[A-Za-z_:][\w:.-]*)(?:\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s"'}]+)))?"#,
    )
    .expect("Invalid directive attribute regex")
});

/// Find every directive in `text`, in order.
///
/// A directive must not be glued to a preceding word or colon, so `a:b{c}`
/// and `:::name{}` are ignored.
pub fn scan_directives(text: &str) -> Vec<DirectiveMatch<'_>> {
    DIRECTIVE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let preceding = text[..whole.start()].chars().next_back();
            if preceding.is_some_and(|c| c.is_alphanumeric() || c == ':') {
                return None;
            }

            Some(DirectiveMatch {
                range: whole.range(),
                name: caps.get(1)?.as_str(),
                attributes: parse_attributes(caps.get(2).map_or("", |m| m.as_str())),
            })
        })
        .collect()
}

/// Parse the inside of a directive's `{...}` block.
pub fn parse_attributes(input: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();

    for caps in ATTRIBUTE_RE.captures_iter(input) {
        if let Some(value) = caps
            .name("sdq")
            .or_else(|| caps.name("ssq"))
            .or_else(|| caps.name("sbare"))
        {
            attributes.insert(
                DirectiveNode::SHORTHAND.to_string(),
                value.as_str().to_string(),
            );
        } else if let Some(class) = caps.name("class") {
            attributes
                .entry("class".to_string())
                .and_modify(|existing: &mut String| {
                    existing.push(' ');
                    existing.push_str(class.as_str());
                })
                .or_insert_with(|| class.as_str().to_string());
        } else if let Some(key) = caps.name("key") {
            let value = caps
                .name("dq")
                .or_else(|| caps.name("sq"))
                .or_else(|| caps.name("bare"))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            attributes.insert(key.as_str().to_string(), value);
        }
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_attributes() {
        let attrs = parse_attributes(r#"url="https://example.com/x" title='A "quoted" title'"#);

        assert_eq!(attrs.get("url").map(String::as_str), Some("https://example.com/x"));
        assert_eq!(
            attrs.get("title").map(String::as_str),
            Some(r#"A "quoted" title"#)
        );
    }

    #[test]
    fn parses_bare_values_with_query_strings() {
        let attrs = parse_attributes("url=https://a.com/x?y=1&z=2 domain=a.com");

        assert_eq!(attrs.get("url").map(String::as_str), Some("https://a.com/x?y=1&z=2"));
        assert_eq!(attrs.get("domain").map(String::as_str), Some("a.com"));
    }

    #[test]
    fn parses_shorthand_forms() {
        assert_eq!(
            parse_attributes("#https://example.com").get("#").map(String::as_str),
            Some("https://example.com")
        );
        assert_eq!(
            parse_attributes(r#"#="dQw4w9WgXcQ""#).get("#").map(String::as_str),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn collects_classes_and_flags() {
        let attrs = parse_attributes(".wide .dark autoplay");

        assert_eq!(attrs.get("class").map(String::as_str), Some("wide dark"));
        assert_eq!(attrs.get("autoplay").map(String::as_str), Some(""));
    }

    #[test]
    fn scans_directives_in_text() {
        let text = r#"Watch :youtube{id="abc"} then ::preview{url=https://b.com}."#;
        let found = scan_directives(text);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "youtube");
        assert_eq!(&text[found[0].range.clone()], r#":youtube{id="abc"}"#);
        assert_eq!(found[1].name, "preview");
        assert_eq!(
            found[1].attributes.get("url").map(String::as_str),
            Some("https://b.com")
        );
    }

    #[test]
    fn ignores_colons_inside_words() {
        assert!(scan_directives("key:value{x} and 10:30{y}").is_empty());
        assert!(scan_directives(":::note{}").is_empty());
    }

    #[test]
    fn empty_braces_have_no_attributes() {
        let found = scan_directives(":youtube{}");

        assert_eq!(found.len(), 1);
        assert!(found[0].attributes.is_empty());
    }
}
