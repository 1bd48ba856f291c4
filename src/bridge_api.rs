//! HTTP client for the WeChat bot bridge
//!
//! Handles:
//! - Text messages to a group (recall notices)
//! - Image messages to a group (recalled pictures, base64 encoded)
//! - Downloading posted images in full

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{ImageFetcher, MAX_IMAGE_SIZE};
use crate::forwarder::MessageSender;

// =============================================================================
// API Endpoints
// =============================================================================

const SEND_TEXT_PATH: &str = "/api/send_text";
const SEND_IMAGE_PATH: &str = "/api/send_image";

/// Header carrying the shared bridge token
pub const TOKEN_HEADER: &str = "X-Bridge-Token";

// =============================================================================
// Bridge Client
// =============================================================================

/// Client for the bridge's send and media endpoints
#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    token: Option<String>,
    http_client: Client,
}

impl BridgeClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build bridge HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http_client,
        })
    }

    /// Absolute URL for a bridge path or an already absolute URL
    fn url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else if path_or_url.starts_with('/') {
            format!("{}{}", self.base_url, path_or_url)
        } else {
            format!("{}/{}", self.base_url, path_or_url)
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let response = self
            .authorize(self.http_client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        let result: SendResult = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))?;

        if result.errcode != 0 {
            warn!("Bridge error on {}: {} - {}", path, result.errcode, result.errmsg);
            return Err(anyhow!("Bridge error: {} - {}", result.errcode, result.errmsg));
        }

        Ok(())
    }
}

#[async_trait]
impl MessageSender for BridgeClient {
    async fn send_text(&self, destination: &str, text: &str) -> Result<()> {
        debug!("Sending text to group: {}", destination);

        let request = SendTextRequest {
            to_group: destination,
            content: text,
        };
        self.post(SEND_TEXT_PATH, &request).await?;

        info!("Text sent to {}", destination);
        Ok(())
    }

    async fn send_image(&self, destination: &str, image: &[u8]) -> Result<()> {
        debug!(
            "Sending image to group: {} ({} bytes)",
            destination,
            image.len()
        );

        let request = SendImageRequest {
            to_group: destination,
            image: BASE64.encode(image),
        };
        self.post(SEND_IMAGE_PATH, &request).await?;

        info!("Image sent to {}", destination);
        Ok(())
    }
}

#[async_trait]
impl ImageFetcher for BridgeClient {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.url(url);

        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to request image {}", url))?
            .error_for_status()
            .with_context(|| format!("Image request rejected: {}", url))?;

        if let Some(len) = response.content_length()
            && exceeds_image_limit(len)
        {
            return Err(anyhow!(
                "Image too large: {} bytes (max: {})",
                len,
                MAX_IMAGE_SIZE
            ));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read image body {}", url))?;

        Ok(bytes.to_vec())
    }
}

/// Declared length over the image cap, or too big for this target's `usize`
fn exceeds_image_limit(len: u64) -> bool {
    usize::try_from(len).map_or(true, |n| n > MAX_IMAGE_SIZE)
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    to_group: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct SendImageRequest<'a> {
    to_group: &'a str,
    /// Base64 (standard alphabet) image bytes
    image: String,
}

/// Result returned by every bridge send endpoint
#[derive(Debug, Deserialize)]
struct SendResult {
    errcode: i32,
    #[serde(default)]
    errmsg: String,
}

// =============================================================================
// Tests
// =============================================================================
