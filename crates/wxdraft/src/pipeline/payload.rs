//! Draft payload assembly.

use crate::markdown::{derive_digest, ArticleMetadata};
use crate::wechat::{DraftArticle, DraftPayload};

use super::error::PipelineError;

/// Settings that shape every draft, independent of the article.
#[derive(Debug, Clone)]
pub struct DraftSettings<'a> {
    pub placeholder_content: &'a str,
    pub digest_max_chars: usize,
}

/// Builds the single-article `draft/add` payload.
///
/// The article body is the configured placeholder; the rendered HTML only
/// feeds the digest when the metadata has none.
pub fn build_draft_payload(
    metadata: &ArticleMetadata,
    thumb_media_id: &str,
    preview_html: &str,
    settings: &DraftSettings<'_>,
) -> Result<DraftPayload, PipelineError> {
    let title = metadata
        .require_title()
        .map_err(|e| PipelineError::Validation(e.to_string()))?;
    if thumb_media_id.trim().is_empty() {
        return Err(PipelineError::Validation(
            "job has no thumbnail media id".to_string(),
        ));
    }

    Ok(DraftPayload::single(DraftArticle {
        title: title.to_string(),
        author: metadata.author().unwrap_or_default().to_string(),
        digest: derive_digest(metadata.digest(), preview_html, settings.digest_max_chars),
        content: settings.placeholder_content.to_string(),
        content_source_url: metadata.content_source_url().unwrap_or_default().to_string(),
        thumb_media_id: thumb_media_id.to_string(),
        need_open_comment: flag(metadata.need_open_comment),
        only_fans_can_comment: flag(metadata.only_fans_can_comment),
    }))
}

fn flag(value: Option<bool>) -> u8 {
    u8::from(value.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::FALLBACK_DIGEST;

    const SETTINGS: DraftSettings<'static> = DraftSettings {
        placeholder_content: "<p>placeholder</p>",
        digest_max_chars: 10,
    };

    fn metadata(title: Option<&str>) -> ArticleMetadata {
        ArticleMetadata {
            title: title.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_fields() {
        let mut meta = metadata(Some("Hello"));
        meta.author = Some("Ann".into());
        meta.need_open_comment = Some(true);
        meta.content_source_url = Some("https://example.com/a".into());

        let payload = build_draft_payload(&meta, "thumb-1", "<p>Body text here</p>", &SETTINGS)
            .unwrap();
        let article = &payload.articles[0];

        assert_eq!(article.title, "Hello");
        assert_eq!(article.author, "Ann");
        assert_eq!(article.digest, "Body text");
        assert_eq!(article.content, "<p>placeholder</p>");
        assert_eq!(article.thumb_media_id, "thumb-1");
        assert_eq!(article.need_open_comment, 1);
        assert_eq!(article.only_fans_can_comment, 0);
        assert_eq!(article.content_source_url, "https://example.com/a");
    }

    #[test]
    fn test_explicit_digest_used() {
        let mut meta = metadata(Some("Hello"));
        meta.digest = Some("Short".into());
        let payload = build_draft_payload(&meta, "t", "<p>ignored</p>", &SETTINGS).unwrap();
        assert_eq!(payload.articles[0].digest, "Short");
    }

    #[test]
    fn test_empty_preview_falls_back() {
        let payload = build_draft_payload(&metadata(Some("T")), "t", "", &SETTINGS).unwrap();
        assert_eq!(payload.articles[0].digest, FALLBACK_DIGEST);
    }

    #[test]
    fn test_missing_title_or_thumb_rejected() {
        assert!(matches!(
            build_draft_payload(&metadata(None), "t", "", &SETTINGS),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            build_draft_payload(&metadata(Some("T")), " ", "", &SETTINGS),
            Err(PipelineError::Validation(_))
        ));
    }
}
