//! Metadata extraction from raw HTML.
//!
//! Tag-level regex scanning is enough here: only `<meta>`, `<title>` and
//! `<img>` are read and malformed markup must never abort extraction.
//! Comments, scripts and styles are removed before scanning.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;
use url::Url;

use crate::data::OpenGraphData;

/// Markup whose text must not be mistaken for tags.
static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("Invalid hidden markup regex")
});

// Quoted attribute values may contain `>`.
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("Invalid meta regex")
});

static IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("Invalid img regex")
});

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("Invalid title regex"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("Invalid attribute regex")
});

/// Attributes of one tag, names lowercased, values entity-decoded.
type Attributes = HashMap<String, String>;

/// Extract Open Graph data from `html` fetched from `page_url`.
pub fn extract_open_graph(html: &str, page_url: &str) -> OpenGraphData {
    let html = visible_markup(html);
    let html = html.as_ref();

    let metas: Vec<Attributes> = META_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| parse_tag_attributes(m.as_str())))
        .collect();

    let mut properties: HashMap<String, String> = HashMap::new();
    for meta in &metas {
        let (Some(property), Some(content)) = (meta.get("property"), meta.get("content")) else {
            continue;
        };
        let Some(name) = property.strip_prefix("og:") else {
            continue;
        };
        if !content.trim().is_empty() {
            // First declaration wins, as Open Graph consumers expect.
            properties
                .entry(name.to_string())
                .or_insert_with(|| content.clone());
        }
    }

    fill_missing(&mut properties, "title", || {
        meta_named(&metas, "title").or_else(|| title_tag(html))
    });
    fill_missing(&mut properties, "description", || {
        meta_named(&metas, "description")
    });
    fill_missing(&mut properties, "image", || {
        meta_named(&metas, "twitter:image").or_else(|| first_absolute_image(html))
    });
    fill_missing(&mut properties, "site_name", || {
        meta_named(&metas, "application-name")
            .or_else(|| meta_named(&metas, "site_name"))
            .or_else(|| hostname(page_url))
    });

    OpenGraphData::from_properties(&properties)
}

fn visible_markup(html: &str) -> Cow<'_, str> {
    HIDDEN_RE.replace_all(html, " ")
}

/// Run one fallback for `key` if the Open Graph tags left it empty.
fn fill_missing<F>(properties: &mut HashMap<String, String>, key: &str, fallback: F)
where
    F: FnOnce() -> Option<String>,
{
    let missing = properties.get(key).map_or(true, |v| v.trim().is_empty());
    if missing {
        if let Some(value) = fallback() {
            properties.insert(key.to_string(), value);
        }
    }
}

fn meta_named(metas: &[Attributes], name: &str) -> Option<String> {
    metas
        .iter()
        .filter(|meta| {
            meta.get("name")
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .filter_map(|meta| meta.get("content"))
        .find(|content| !content.trim().is_empty())
        .cloned()
}

fn title_tag(html: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?.get(1)?.as_str();
    let text = collapse_whitespace(&decode_html_entities(raw));
    (!text.is_empty()).then_some(text)
}

fn first_absolute_image(html: &str) -> Option<String> {
    IMG_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| parse_tag_attributes(m.as_str())))
        .filter_map(|attrs| attrs.get("src").cloned())
        .find(|src| src.starts_with("http"))
}

fn hostname(page_url: &str) -> Option<String> {
    Url::parse(page_url)
        .ok()?
        .host_str()
        .map(str::to_string)
}

/// Parse the attribute section of a tag.
fn parse_tag_attributes(input: &str) -> Attributes {
    let mut attributes = Attributes::new();
    for caps in ATTR_RE.captures_iter(input) {
        let Some(name) = caps.get(1) else {
            continue;
        };
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| decode_html_entities(m.as_str()).into_owned())
            .unwrap_or_default();
        attributes
            .entry(name.as_str().to_ascii_lowercase())
            .or_insert(value);
    }
    attributes
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_open_graph_tags() {
        let html = r#"<html><head>
<meta property="og:title" content="A Review of True Failure">
<meta property="og:description" content="On Alex Higley&#39;s novel" />
<meta property='og:image' content='https://cdn.example.com/cover.jpg'>
<meta property="og:site_name" content="The Adroit Journal">
<meta property="og:type" content="article">
<title>Ignored</title>
</head></html>"#;

        let data = extract_open_graph(html, "https://www.theadroitjournal.org/review");

        assert_eq!(
            data,
            OpenGraphData {
                title: Some("A Review of True Failure".to_string()),
                description: Some("On Alex Higley's novel".to_string()),
                image: Some("https://cdn.example.com/cover.jpg".to_string()),
                site_name: Some("The Adroit Journal".to_string()),
                kind: Some("article".to_string()),
                url: None,
                image_alt: None,
            }
        );
    }

    #[test]
    fn falls_back_per_field() {
        let html = r#"<head>
<title>
  Plain   &amp; Simple
</title>
<meta name="description" content="Fallback description">
<meta name="twitter:image" content="https://example.com/tw.png">
</head>"#;

        let data = extract_open_graph(html, "https://blog.example.com/post");

        assert_eq!(data.title.as_deref(), Some("Plain & Simple"));
        assert_eq!(data.description.as_deref(), Some("Fallback description"));
        assert_eq!(data.image.as_deref(), Some("https://example.com/tw.png"));
        assert_eq!(data.site_name.as_deref(), Some("blog.example.com"));
    }

    #[test]
    fn image_falls_back_to_first_absolute_img() {
        let html = r#"<body><img src="/relative.png"><img alt="x" src="https://example.com/abs.png"></body>"#;

        let data = extract_open_graph(html, "https://example.com");

        assert_eq!(data.image.as_deref(), Some("https://example.com/abs.png"));
    }

    #[test]
    fn invalid_image_is_dropped_but_title_kept() {
        let html = r#"<meta property="og:title" content="Kept"><meta property="og:image" content="::nope::">"#;

        let data = extract_open_graph(html, "https://example.com");

        assert_eq!(data.title.as_deref(), Some("Kept"));
        assert_eq!(data.image, None);
    }

    #[test]
    fn application_name_beats_hostname() {
        let html = r#"<meta name="application-name" content="Post-Gazette">"#;

        let data = extract_open_graph(html, "https://www.post-gazette.com/ae");

        assert_eq!(data.site_name.as_deref(), Some("Post-Gazette"));
    }

    #[test]
    fn malformed_html_degrades_to_hostname_only() {
        let data = extract_open_graph("<meta <<< <title>", "https://example.com/x");

        assert!(data.is_low_value());
        assert_eq!(data.site_name.as_deref(), Some("example.com"));
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        let html = r#"<title>Rust &mdash; It&rsquo;s fast&hellip;</title>
<meta name="description" content="1&ndash;2 &amp; &#x27;3&#39; &bogus;">"#;

        let data = extract_open_graph(html, "https://example.com");

        assert_eq!(data.title.as_deref(), Some("Rust \u{2014} It\u{2019}s fast\u{2026}"));
        assert_eq!(data.description.as_deref(), Some("1\u{2013}2 & '3' &bogus;"));
    }

    #[test]
    fn angle_bracket_inside_quoted_content_is_kept() {
        let html = r#"<meta property="og:title" content="Home > Blog > Post"><title>Fallback</title>
<img alt='a > b' src="https://example.com/crumb.png">"#;

        let data = extract_open_graph(html, "https://example.com");

        assert_eq!(data.title.as_deref(), Some("Home > Blog > Post"));
        assert_eq!(data.image.as_deref(), Some("https://example.com/crumb.png"));
    }

    #[test]
    fn commented_and_scripted_tags_are_ignored() {
        let html = r#"<!-- <meta property="og:title" content="Commented"> -->
<script>document.write('<meta property="og:title" content="Scripted"><title>Nope</title>');</script>
<meta property="og:title" content="Real">
<!-- <title>Hidden</title> -->"#;

        let data = extract_open_graph(html, "https://example.com");

        assert_eq!(data.title.as_deref(), Some("Real"));
    }

    #[test]
    fn commented_title_does_not_become_fallback() {
        let html = "<!-- <title>Hidden</title> --><title>Shown</title>";

        let data = extract_open_graph(html, "https://example.com");

        assert_eq!(data.title.as_deref(), Some("Shown"));
    }
}
