use crate::config::Config;
use crate::mime;
use crate::{Error, Result};
use reqwest::Client;
use serde::Serialize;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Binary image fetched from a locator.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    /// Extension inferred from the content, e.g. `png`.
    pub extension: &'static str,
}

/// Thin client for the generation worker. One attempt per call, transport
/// default timeouts.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    api_token: String,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_token: config.api_token.clone(),
            base_url: config.api_url.clone(),
        }
    }

    /// POST a JSON body and return the parsed JSON reply.
    ///
    /// Non-success statuses become [`Error::Upstream`] with the raw body text.
    pub async fn post_json<Req: Serialize>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to upstream: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Upstream API error (status {}): {}", status, error_text);
            return Err(Error::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse upstream response: {}\nBody: {}", e, body);
            Error::Extraction(format!("upstream reply is not valid JSON: {}", e))
        })
    }

    pub async fn chat_completion<Req: Serialize>(&self, request: &Req) -> Result<serde_json::Value> {
        self.post_json(CHAT_COMPLETIONS_PATH, request).await
    }

    /// GET the binary behind an image locator.
    pub async fn fetch_image(&self, url: &str) -> Result<ImageAsset> {
        tracing::debug!("Downloading image from {}", url);

        let download_error = |reason: String| Error::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Image download failed (status {}) for {}", status, url);
            return Err(download_error(format!("status {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?
            .to_vec();

        let extension = mime::infer_image_extension(&bytes, content_type.as_deref());
        tracing::debug!("Downloaded {} bytes ({})", bytes.len(), extension);

        Ok(ImageAsset { bytes, extension })
    }
}
