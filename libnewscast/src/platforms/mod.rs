//! Publishing platform abstraction
//!
//! A [`Platform`] turns a finished post text into a published post and reports
//! failures as [`PlatformError`](crate::error::PlatformError) classes that the
//! [`Publisher`](crate::publisher::Publisher) uses to decide on retries.
//!
//! # Examples
//!
//! ```no_run
//! use libnewscast::platforms::{Platform, x::XPlatform};
//! use secrecy::SecretString;
//! use std::time::Duration;
//!
//! # async fn example() -> libnewscast::error::Result<()> {
//! let platform = XPlatform::new(
//!     "https://api.x.com/2",
//!     SecretString::from("token".to_string()),
//!     Duration::from_secs(30),
//! )?;
//!
//! platform.validate_content("Hello #Crypto")?;
//! let post_id = platform.post("Hello #Crypto").await?;
//! println!("Posted: {}", post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;

pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Platform trait for publishing posts
#[async_trait]
pub trait Platform: Send + Sync {
    /// Publish `content` and return the platform-specific post ID
    ///
    /// # Errors
    ///
    /// Returns `NewscastError::Platform` with one of:
    /// - `PlatformError::RateLimit` when the platform throttles us
    /// - `PlatformError::Authentication` or `PlatformError::Validation` when
    ///   the request can never succeed as sent
    /// - `PlatformError::Network` or `PlatformError::Posting` for transient
    ///   failures
    async fn post(&self, content: &str) -> Result<String>;

    /// Check content against platform rules before posting
    fn validate_content(&self, content: &str) -> Result<()>;

    /// Lowercase platform identifier (e.g. "x")
    fn name(&self) -> &str;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;
}
