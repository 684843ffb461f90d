//! YAML frontmatter extraction and typed article metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProcessError;

const DELIMITER: &str = "---";

/// Article metadata from the frontmatter block. Known keys are typed; any
/// other key is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub content_source_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub need_open_comment: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub only_fans_can_comment: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ArticleMetadata {
    /// The trimmed, non-empty title.
    pub fn title(&self) -> Option<&str> {
        non_blank(self.title.as_deref())
    }

    pub fn require_title(&self) -> Result<&str, ProcessError> {
        self.title()
            .ok_or_else(|| ProcessError::Metadata("missing or empty required field 'title'".into()))
    }

    pub fn digest(&self) -> Option<&str> {
        non_blank(self.digest.as_deref())
    }

    pub fn author(&self) -> Option<&str> {
        non_blank(self.author.as_deref())
    }

    pub fn content_source_url(&self) -> Option<&str> {
        non_blank(self.content_source_url.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Frontmatter metadata plus the trimmed Markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub metadata: ArticleMetadata,
    pub body: String,
    /// Whether a closed frontmatter block was present.
    pub has_frontmatter: bool,
}

/// Splits a Markdown document into frontmatter metadata and body.
///
/// The document must open with a `---` line and the block ends at the next
/// `---` line. Without a closing delimiter the whole text is body.
pub fn parse_document(content: &str) -> Result<ParsedDocument, ProcessError> {
    let normalized = content.replace("\r\n", "\n");

    let Some((yaml, body)) = split_frontmatter(&normalized) else {
        if normalized.starts_with("---\n") {
            log::warn!("Frontmatter opened with '---' but never closed, treating as body");
        }
        return Ok(ParsedDocument {
            metadata: ArticleMetadata::default(),
            body: normalized.trim().to_string(),
            has_frontmatter: false,
        });
    };

    let metadata = parse_metadata(yaml)?;
    Ok(ParsedDocument {
        metadata,
        body: body.trim().to_string(),
        has_frontmatter: true,
    })
}

fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---\n")?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

fn parse_metadata(yaml: &str) -> Result<ArticleMetadata, ProcessError> {
    if yaml.trim().is_empty() {
        return Ok(ArticleMetadata::default());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| ProcessError::Frontmatter(format!("invalid YAML: {}", e)))?;

    match value {
        serde_yaml::Value::Null => Ok(ArticleMetadata::default()),
        serde_yaml::Value::Mapping(_) => {
            let json = serde_json::to_value(&value)
                .map_err(|e| ProcessError::Frontmatter(format!("unsupported value: {}", e)))?;
            serde_json::from_value(json)
                .map_err(|e| ProcessError::Frontmatter(format!("invalid metadata: {}", e)))
        }
        _ => Err(ProcessError::Frontmatter(
            "frontmatter must be a mapping of key: value pairs".to_string(),
        )),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a string, got {}",
                other
            )))
        }
    })
}

/// Accepts `true`/`false`, `0`/`1` and their string forms.
fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "invalid flag value '{}'",
                    other
                )))
            }
        },
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "invalid flag value {}",
                other
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_frontmatter() {
        let doc = "---\ntitle: Hello\nauthor: Li Lei\ndigest: Short\nneed_open_comment: 1\nonly_fans_can_comment: false\ntags: [a, b]\n---\n\n# Body\n";
        let parsed = parse_document(doc).unwrap();

        assert!(parsed.has_frontmatter);
        assert_eq!(parsed.metadata.title(), Some("Hello"));
        assert_eq!(parsed.metadata.author(), Some("Li Lei"));
        assert_eq!(parsed.metadata.digest(), Some("Short"));
        assert_eq!(parsed.metadata.need_open_comment, Some(true));
        assert_eq!(parsed.metadata.only_fans_can_comment, Some(false));
        assert_eq!(
            parsed.metadata.extra.get("tags"),
            Some(&serde_json::json!(["a", "b"]))
        );
        assert_eq!(parsed.body, "# Body");
    }

    #[test]
    fn test_crlf_is_normalized() {
        let doc = "---\r\ntitle: Windows\r\n---\r\nBody line\r\n";
        let parsed = parse_document(doc).unwrap();
        assert_eq!(parsed.metadata.title(), Some("Windows"));
        assert_eq!(parsed.body, "Body line");
    }

    #[test]
    fn test_no_frontmatter() {
        let parsed = parse_document("  # Just markdown\n\ntext\n").unwrap();
        assert!(!parsed.has_frontmatter);
        assert_eq!(parsed.metadata, ArticleMetadata::default());
        assert_eq!(parsed.body, "# Just markdown\n\ntext");
    }

    #[test]
    fn test_unclosed_frontmatter_is_body() {
        let doc = "---\ntitle: Never closed\n\nSome text";
        let parsed = parse_document(doc).unwrap();
        assert!(!parsed.has_frontmatter);
        assert!(parsed.metadata.title().is_none());
        assert_eq!(parsed.body, doc);
    }

    #[test]
    fn test_empty_frontmatter() {
        let parsed = parse_document("---\n---\nbody").unwrap();
        assert!(parsed.has_frontmatter);
        assert_eq!(parsed.metadata, ArticleMetadata::default());
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn test_non_mapping_frontmatter_rejected() {
        let result = parse_document("---\n- a\n- b\n---\nbody");
        assert!(matches!(result, Err(ProcessError::Frontmatter(_))));
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let result = parse_document("---\ntitle: [unclosed\n---\nbody");
        assert!(matches!(result, Err(ProcessError::Frontmatter(_))));
    }

    #[test]
    fn test_numeric_title_becomes_string() {
        let parsed = parse_document("---\ntitle: 2024\n---\n").unwrap();
        assert_eq!(parsed.metadata.title(), Some("2024"));
    }

    #[test]
    fn test_require_title() {
        let parsed = parse_document("---\ntitle: '   '\n---\nx").unwrap();
        assert!(matches!(
            parsed.metadata.require_title(),
            Err(ProcessError::Metadata(_))
        ));

        let parsed = parse_document("---\ntitle: ' Padded '\n---\nx").unwrap();
        assert_eq!(parsed.metadata.require_title().unwrap(), "Padded");
    }

    #[test]
    fn test_flag_strings() {
        let parsed =
            parse_document("---\nneed_open_comment: 'yes'\nonly_fans_can_comment: '0'\n---\n")
                .unwrap();
        assert_eq!(parsed.metadata.need_open_comment, Some(true));
        assert_eq!(parsed.metadata.only_fans_can_comment, Some(false));

        assert!(parse_document("---\nneed_open_comment: maybe\n---\n").is_err());
    }

    #[test]
    fn test_delimiter_inside_body_is_kept() {
        let doc = "---\ntitle: T\n---\nintro\n\n---\n\nafter rule";
        let parsed = parse_document(doc).unwrap();
        assert_eq!(parsed.body, "intro\n\n---\n\nafter rule");
    }

    #[test]
    fn test_metadata_json_roundtrip_keeps_extra() {
        let parsed = parse_document("---\ntitle: T\ncategory: news\n---\n").unwrap();
        let json = serde_json::to_string(&parsed.metadata).unwrap();
        let back: ArticleMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parsed.metadata);
        assert_eq!(back.extra.get("category"), Some(&serde_json::json!("news")));
    }
}
