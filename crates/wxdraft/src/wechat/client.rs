use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::ImageFormat;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use super::error::WeChatError;
use super::types::{DraftPayload, MediaIdResponse, TokenResponse, UploadImageResponse};
use super::WeChatApi;
use crate::processor::{format_from_extension, ImageTarget};
use crate::sanitize::{redact_path, redact_token};

/// Tokens are refreshed this long before WeChat says they expire.
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Upper bound on a cached token's lifetime, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
pub struct WeChatClientConfig {
    pub app_id: String,
    pub app_secret: SecretString,
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_BUFFER < self.expires_at
    }
}

fn token_lifetime(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in).min(MAX_TOKEN_LIFETIME)
}

/// HTTP client for the Official Account APIs the pipeline needs.
pub struct WeChatClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: SecretString,
    token: Mutex<Option<CachedToken>>,
}

impl WeChatClient {
    pub fn new(config: WeChatClientConfig) -> Result<Self, WeChatError> {
        if config.app_id.trim().is_empty() {
            return Err(WeChatError::Config("app_id is empty".to_string()));
        }
        if config.app_secret.expose_secret().is_empty() {
            return Err(WeChatError::Config("app secret is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| WeChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id,
            app_secret: config.app_secret,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_token(&self) -> Result<CachedToken, WeChatError> {
        let url = self.endpoint("/cgi-bin/token");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.expose_secret()),
            ])
            .send()
            .await?;

        let token: TokenResponse = parse_response(response, "/cgi-bin/token").await?;
        if token.access_token.is_empty() {
            return Err(WeChatError::InvalidResponse {
                endpoint: "/cgi-bin/token".to_string(),
                reason: "empty access_token".to_string(),
            });
        }

        tracing::info!(
            token = %redact_token(&token.access_token),
            expires_in = token.expires_in,
            "obtained access token"
        );

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + token_lifetime(token.expires_in),
        })
    }

    async fn upload_media<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
        path: &Path,
    ) -> Result<T, WeChatError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WeChatError::FileNotFound(path.to_path_buf())
            } else {
                WeChatError::Validation(format!("cannot read {}: {}", redact_path(path), e))
            }
        })?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())
            .map_err(|e| WeChatError::Validation(format!("invalid MIME type: {}", e)))?;

        let response = self
            .http
            .post(self.endpoint(endpoint))
            .query(query)
            .multipart(Form::new().part("media", part))
            .send()
            .await?;

        parse_response(response, endpoint).await
    }
}

#[async_trait]
impl WeChatApi for WeChatClient {
    async fn access_token(&self) -> Result<String, WeChatError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }

    async fn upload_thumbnail(&self, token: &str, path: &Path) -> Result<String, WeChatError> {
        validate_upload(path, &ImageTarget::thumbnail()).await?;

        let response: MediaIdResponse = self
            .upload_media(
                "/cgi-bin/material/add_material",
                &[("access_token", token), ("type", "thumb")],
                path,
            )
            .await?;

        tracing::info!(file = %redact_path(path), media_id = %response.media_id, "thumbnail uploaded");
        Ok(response.media_id)
    }

    async fn upload_content_image(&self, token: &str, path: &Path) -> Result<String, WeChatError> {
        validate_upload(path, &ImageTarget::content_image()).await?;

        let response: UploadImageResponse = self
            .upload_media("/cgi-bin/media/uploadimg", &[("access_token", token)], path)
            .await?;

        tracing::info!(file = %redact_path(path), "content image uploaded");
        Ok(response.url)
    }

    async fn submit_draft(&self, token: &str, payload: &DraftPayload) -> Result<String, WeChatError> {
        if payload.articles.is_empty() {
            return Err(WeChatError::Validation(
                "draft payload contains no articles".to_string(),
            ));
        }

        let response = self
            .http
            .post(self.endpoint("/cgi-bin/draft/add"))
            .query(&[("access_token", token)])
            .json(payload)
            .send()
            .await?;

        let created: MediaIdResponse = parse_response(response, "/cgi-bin/draft/add").await?;
        tracing::info!(media_id = %created.media_id, articles = payload.articles.len(), "draft created");
        Ok(created.media_id)
    }
}

/// Checks the same constraints WeChat enforces so a bad file is never sent.
async fn validate_upload(path: &Path, target: &ImageTarget) -> Result<(), WeChatError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(WeChatError::FileNotFound(path.to_path_buf())),
    };

    let format = format_from_extension(path);
    if !format.is_some_and(|f| target.formats.contains(&f)) {
        let allowed: Vec<&str> = target
            .formats
            .iter()
            .map(|f| match f {
                ImageFormat::Png => "PNG",
                _ => "JPG",
            })
            .collect();
        return Err(WeChatError::Validation(format!(
            "{} must be {}: {}",
            target.name,
            allowed.join(" or "),
            redact_path(path)
        )));
    }

    if metadata.len() > target.max_bytes {
        return Err(WeChatError::Validation(format!(
            "{} is {:.1} KB, limit is {} KB: {}",
            target.name,
            metadata.len() as f64 / 1024.0,
            target.max_bytes / 1024,
            redact_path(path)
        )));
    }

    Ok(())
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T, WeChatError> {
    let status = response.status();
    if !status.is_success() {
        tracing::warn!(endpoint, status = status.as_u16(), "non-success HTTP status");
        return Err(WeChatError::HttpStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    let value: Value = serde_json::from_str(&body).map_err(|e| WeChatError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: format!("not JSON: {}", e),
    })?;

    if let Some(code) = value.get("errcode").and_then(Value::as_i64) {
        if code != 0 {
            let message = value
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            tracing::warn!(endpoint, code, %message, "WeChat API error");
            return Err(WeChatError::Api { code, message });
        }
    }

    serde_json::from_value(value).map_err(|e| WeChatError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
