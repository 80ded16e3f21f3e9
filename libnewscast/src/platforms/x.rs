//! X (Twitter) platform implementation
//!
//! Posts through the v2 `POST /tweets` endpoint using a user-context OAuth 2.0
//! bearer token.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;

/// X post length limit in characters
pub const X_CHARACTER_LIMIT: usize = 280;

const MAX_ERROR_BODY_CHARS: usize = 240;

/// Post ID reported when X accepted a post but its ID could not be read
pub const UNKNOWN_POST_ID: &str = "unknown";

/// X platform client
pub struct XPlatform {
    client: Client,
    api_base: String,
    access_token: SecretString,
}

impl XPlatform {
    /// Create a client for `api_base` (e.g. `https://api.x.com/2`)
    pub fn new(api_base: impl Into<String>, access_token: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn tweets_url(&self) -> String {
        format!("{}/tweets", self.api_base)
    }
}

#[async_trait]
impl Platform for XPlatform {
    async fn post(&self, content: &str) -> Result<String> {
        self.validate_content(content)?;

        debug!("Posting to X ({} characters)", content.chars().count());
        let response = self
            .client
            .post(self.tweets_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&json!({ "text": content }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("X request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.text().await;

        if !(200..300).contains(&status) {
            let body = body.unwrap_or_default();
            return Err(map_x_error(status, &body).into());
        }

        // The post is live once X answers 2xx; a retry would duplicate it.
        let post_id = body
            .map_err(|e| PlatformError::Posting(format!("Failed to read X response: {}", e)))
            .and_then(|body| extract_post_id(&body));
        match post_id {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!("X accepted the post (HTTP {}) but {}", status, e);
                Ok(UNKNOWN_POST_ID.to_string())
            }
        }
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
        }

        let length = content.chars().count();
        if length > X_CHARACTER_LIMIT {
            return Err(PlatformError::Validation(format!(
                "Content exceeds X's {} character limit (current: {} characters)",
                X_CHARACTER_LIMIT, length
            ))
            .into());
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "x"
    }

    fn is_configured(&self) -> bool {
        !self.access_token.expose_secret().is_empty()
    }
}

/// Map an X API error response to a platform error class
pub fn map_x_error(status: u16, body: &str) -> PlatformError {
    let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        429 => PlatformError::RateLimit(format!("X rate limit exceeded: {}", detail)),
        401 | 403 => PlatformError::Authentication(format!(
            "X rejected the credentials (HTTP {}): {}",
            status, detail
        )),
        400 | 422 => PlatformError::Validation(format!("X rejected the post (HTTP {}): {}", status, detail)),
        _ => PlatformError::Posting(format!("X returned HTTP {}: {}", status, detail)),
    }
}

/// Read `data.id` from a successful create-post response
fn extract_post_id(body: &str) -> std::result::Result<String, PlatformError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PlatformError::Posting(format!("Invalid JSON from X: {}", e)))?;
    value
        .pointer("/data/id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| PlatformError::Posting("X response missing data.id".to_string()))
}
