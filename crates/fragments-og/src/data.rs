//! Open Graph metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Page metadata extracted from `og:*` tags and fallbacks.
///
/// Every field is optional. A value with no title, description or image is
/// considered a failed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenGraphData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Absolute image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Canonical URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "image:alt", default, skip_serializing_if = "Option::is_none")]
    pub image_alt: Option<String>,
}

impl OpenGraphData {
    /// Build from a flat property map (`og:` prefix already stripped).
    ///
    /// Fields are validated one by one: blank strings and malformed URLs are
    /// dropped without affecting the rest.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let text = |name: &str| properties.get(name).and_then(|v| non_empty(v));
        let link = |name: &str| text(name).filter(|v| is_valid_url(v));

        Self {
            title: text("title"),
            description: text("description"),
            image: link("image"),
            site_name: text("site_name"),
            kind: text("type"),
            url: link("url"),
            image_alt: text("image:alt"),
        }
    }

    /// No title, description or image was found.
    pub fn is_low_value(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image.is_none()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_valid_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn drops_invalid_fields_individually() {
        let data = OpenGraphData::from_properties(&props(&[
            ("title", "  Hello  "),
            ("description", ""),
            ("image", "not a url"),
            ("url", "https://example.com/post"),
        ]));

        assert_eq!(data.title.as_deref(), Some("Hello"));
        assert_eq!(data.description, None);
        assert_eq!(data.image, None);
        assert_eq!(data.url.as_deref(), Some("https://example.com/post"));
    }

    #[test]
    fn low_value_detection() {
        assert!(OpenGraphData::default().is_low_value());

        let with_site_only = OpenGraphData {
            site_name: Some("example.com".to_string()),
            ..Default::default()
        };
        assert!(with_site_only.is_low_value());

        let with_image = OpenGraphData {
            image: Some("https://example.com/a.png".to_string()),
            ..Default::default()
        };
        assert!(!with_image.is_low_value());
    }

    #[test]
    fn serializes_with_open_graph_names() {
        let data = OpenGraphData {
            kind: Some("article".to_string()),
            image_alt: Some("alt".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(json, serde_json::json!({"type": "article", "image:alt": "alt"}));
    }
}
