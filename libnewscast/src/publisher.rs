//! Publishing with a daily quota and error-class aware retries

use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{NewscastError, PlatformError};
use crate::platforms::Platform;
use crate::quota::QuotaWindow;
use crate::retry::{retry_with_policy, Disposition, RetryError, RetryPolicy};

/// Result of one publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The post is live; carries the platform post ID
    Published(String),
    /// Transient failures used up the retry budget
    GaveUp(String),
    /// The platform refused the post (credentials, permissions, content)
    Rejected(String),
    /// Shutdown was requested while waiting to retry
    Interrupted(String),
}

/// Wraps a [`Platform`] with the retry rules for publishing
pub struct Publisher {
    platform: Box<dyn Platform>,
    policy: RetryPolicy,
}

impl Publisher {
    pub fn new(platform: Box<dyn Platform>, policy: RetryPolicy) -> Self {
        Self { platform, policy }
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    /// Abandon retry waits once `flag` is raised
    pub fn set_shutdown(&mut self, flag: Arc<AtomicBool>) {
        self.policy.set_shutdown(flag);
    }

    /// Charge one post against the daily window if it allows one
    ///
    /// Returns false, without charging, when the window is full.
    pub fn try_reserve(&self, quota: &mut QuotaWindow, now: DateTime<Utc>) -> bool {
        let reserved = quota.check_and_record(now);
        if !reserved {
            info!(
                "Daily post quota of {} reached on {}",
                quota.limit(),
                self.platform.name()
            );
        }
        reserved
    }

    /// Publish `text`, retrying transient failures
    ///
    /// Rate limits wait the policy cooldown and are retried without consuming
    /// attempts, so this call does not return while the platform keeps
    /// throttling.
    pub async fn publish(&self, text: &str) -> PublishOutcome {
        if let Err(e) = self.platform.validate_content(text) {
            warn!("Not posting to {}: {}", self.platform.name(), e);
            return PublishOutcome::Rejected(e.to_string());
        }

        let label = format!("Posting to {}", self.platform.name());
        let outcome = retry_with_policy(
            &label,
            &self.policy,
            |_| self.platform.post(text),
            publish_disposition,
            |_, _| false,
        )
        .await;

        match outcome {
            Ok(post_id) => {
                info!("Posted to {}: {}", self.platform.name(), post_id);
                PublishOutcome::Published(post_id)
            }
            Err(RetryError::Aborted { error, .. }) => PublishOutcome::Rejected(error.to_string()),
            Err(RetryError::Interrupted { error, .. }) => {
                PublishOutcome::Interrupted(error.to_string())
            }
            Err(e) => PublishOutcome::GaveUp(e.error().to_string()),
        }
    }
}

fn publish_disposition(error: &NewscastError) -> Disposition {
    match error {
        NewscastError::Platform(platform_error) => match platform_error {
            PlatformError::RateLimit(_) => Disposition::Cooldown {
                counts_against_budget: false,
            },
            PlatformError::Authentication(_) | PlatformError::Validation(_) => Disposition::Abort,
            PlatformError::Network(_) | PlatformError::Posting(_) => Disposition::Retry,
        },
        _ => Disposition::Retry,
    }
}
