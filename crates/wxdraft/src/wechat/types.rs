use serde::{Deserialize, Serialize};

/// One article of a `draft/add` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftArticle {
    pub title: String,
    pub author: String,
    pub digest: String,
    pub content: String,
    pub content_source_url: String,
    pub thumb_media_id: String,
    pub need_open_comment: u8,
    pub only_fans_can_comment: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPayload {
    pub articles: Vec<DraftArticle>,
}

impl DraftPayload {
    pub fn single(article: DraftArticle) -> Self {
        Self {
            articles: vec![article],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MediaIdResponse {
    pub media_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadImageResponse {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_payload_shape() {
        let payload = DraftPayload::single(DraftArticle {
            title: "T".into(),
            author: String::new(),
            digest: "D".into(),
            content: "<p>x</p>".into(),
            content_source_url: String::new(),
            thumb_media_id: "thumb".into(),
            need_open_comment: 1,
            only_fans_can_comment: 0,
        });

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["articles"][0]["title"], "T");
        assert_eq!(json["articles"][0]["thumb_media_id"], "thumb");
        assert_eq!(json["articles"][0]["need_open_comment"], 1);
        assert_eq!(json["articles"].as_array().unwrap().len(), 1);
    }
}
