//! Frontmatter extraction and parsing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed frontmatter from an MDX file.
///
/// Kept as an untyped map so posts can carry arbitrary keys through to the
/// rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frontmatter(pub Map<String, Value>);

impl Frontmatter {
    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Page title, if present as a string.
    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(Value::as_str)
    }

    /// Whether no keys were declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extract frontmatter from MDX content.
///
/// Returns the parsed frontmatter and the remaining content after the frontmatter block.
pub fn extract_frontmatter(source: &str) -> Result<(Option<Frontmatter>, &str), FrontmatterError> {
    let trimmed = source.trim_start();

    if !trimmed.starts_with("---") {
        return Ok((None, source));
    }

    // Find the closing ---
    let after_open = &trimmed[3..];
    let Some(close_pos) = after_open.find("\n---") else {
        return Err(FrontmatterError::Unclosed);
    };

    let yaml_content = after_open[..close_pos].trim();
    let remaining = &after_open[close_pos + 4..];

    let value: Value = if yaml_content.is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(yaml_content)
            .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?
    };

    let map = match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => return Err(FrontmatterError::NotAMapping),
    };

    Ok((Some(Frontmatter(map)), remaining.trim_start()))
}

/// Errors that can occur when parsing frontmatter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Unclosed frontmatter block - missing closing ---")]
    Unclosed,

    #[error("Invalid YAML in frontmatter: {0}")]
    InvalidYaml(String),

    #[error("Frontmatter must be a YAML mapping")]
    NotAMapping,
}
