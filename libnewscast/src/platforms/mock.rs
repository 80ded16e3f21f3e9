//! Mock platform implementation for testing
//!
//! The mock replays a script of results (one per `post` call) and then falls
//! back to a default. Counters and posted content are shared between clones so
//! a test can keep a handle while the publisher owns the platform.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name
    pub name: String,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Results consumed one per post call
    pub script: Arc<Mutex<VecDeque<std::result::Result<(), PlatformError>>>>,

    /// Result once the script is empty
    pub fallback: std::result::Result<(), PlatformError>,

    /// Number of times post has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Posts that have been made (for verification)
    pub posted_content: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            character_limit: None,
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Ok(()),
            post_call_count: Arc::new(Mutex::new(0)),
            posted_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that always fails with `error`
    pub fn failing(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            fallback: Err(error),
            ..Default::default()
        })
    }

    /// Create a mock platform that plays `script` before succeeding
    pub fn scripted(name: &str, script: Vec<std::result::Result<(), PlatformError>>) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            script: Arc::new(Mutex::new(script.into())),
            ..Default::default()
        })
    }

    /// Create a mock platform with a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Get the number of times post was called
    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    /// Get all content that was posted successfully
    pub fn posted_content(&self) -> Vec<String> {
        self.config.posted_content.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn post(&self, content: &str) -> Result<String> {
        let call = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        let next = self.config.script.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| self.config.fallback.clone()) {
            Ok(()) => {
                let mut posted = self.config.posted_content.lock().unwrap();
                posted.push(content.to_string());
                Ok(format!("{}:mock-{}", self.config.name, call))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
        }

        if let Some(limit) = self.config.character_limit {
            let length = content.chars().count();
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "Content exceeds {} character limit (got {} characters)",
                    limit, length
                ))
                .into());
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_configured(&self) -> bool {
        true
    }
}
