//! OpenAI-compatible chat completions backend

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::classifier::TextGenerator;
use crate::error::ClassifierError;

/// Longest slice of an error body kept in messages
const MAX_ERROR_BODY_CHARS: usize = 240;

/// Calls `POST {endpoint}/chat/completions`
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            temperature: 0.3,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        debug!("POST {} (model {})", self.url(), self.model);
        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(map_status(status, &text));
        }

        extract_content(&text)
    }
}

/// Map a non-success HTTP status to a classifier error
pub fn map_status(status: u16, body: &str) -> ClassifierError {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        429 => ClassifierError::RateLimited(format!("HTTP 429: {}", body)),
        500..=599 | 408 => ClassifierError::Transport(format!("HTTP {}: {}", status, body)),
        _ => ClassifierError::Response(format!("HTTP {}: {}", status, body)),
    }
}

/// Pull `choices[0].message.content` out of a completion response
pub fn extract_content(body: &str) -> Result<String, ClassifierError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ClassifierError::Response(format!("Invalid JSON from service: {}", e)))?;

    value
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ClassifierError::Response("Response missing choices[0].message.content".into()))
}
