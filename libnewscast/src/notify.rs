//! Operator notifications
//!
//! Notifications are informational. [`notify_best_effort`] bounds every send by
//! a timeout and only logs failures, so a broken alert channel never affects a
//! cycle.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{NewscastError, Result};

/// Default Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A sink for short operator messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Send `message`, logging (never returning) failures and timeouts
pub async fn notify_best_effort(notifier: &dyn Notifier, message: &str, timeout: Duration) {
    match tokio::time::timeout(timeout, notifier.notify(message)).await {
        Ok(Ok(())) => debug!("Notification sent"),
        Ok(Err(e)) => warn!("Failed to send notification: {}", e),
        Err(_) => warn!(
            "Notification timed out after {}",
            humantime::format_duration(timeout)
        ),
    }
}

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Keeps messages in memory for tests
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records messages but reports every send as failed
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(NewscastError::Notify("recording notifier set to fail".into()));
        }
        Ok(())
    }
}

/// Telegram Bot API `sendMessage`
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NewscastError::Notify(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token,
            chat_id: chat_id.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        // The token is part of the path, so the URL must never be logged.
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose_secret()
        );

        let response = self
            .client
            .post(url)
            .json(&json!({ "chat_id": self.chat_id, "text": message }))
            .send()
            .await
            .map_err(|e| NewscastError::Notify(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewscastError::Notify(format!(
                "Telegram returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn notify(&self, _message: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_recording_notifier_keeps_messages() {
        let notifier = RecordingNotifier::new();
        notify_best_effort(&notifier, "hello", Duration::from_secs(1)).await;
        notify_best_effort(&notifier, "world", Duration::from_secs(1)).await;
        assert_eq!(notifier.messages(), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let notifier = RecordingNotifier::failing();
        notify_best_effort(&notifier, "ignored", Duration::from_secs(1)).await;
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_sends_time_out() {
        notify_best_effort(&SlowNotifier, "late", Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_noop() {
        assert!(NoopNotifier.notify("anything").await.is_ok());
    }
}
