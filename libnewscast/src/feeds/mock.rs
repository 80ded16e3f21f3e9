//! In-memory feed sources for testing

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::FeedError;
use crate::feeds::{FeedSource, RawEntry};

/// Returns a fixed (but replaceable) list of entries
#[derive(Clone)]
pub struct StaticFeedSource {
    name: String,
    entries: Arc<Mutex<Vec<RawEntry>>>,
    fetch_count: Arc<Mutex<usize>>,
}

impl StaticFeedSource {
    pub fn new(name: &str, entries: Vec<RawEntry>) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::new(Mutex::new(entries)),
            fetch_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Replace the entries returned by later fetches
    pub fn set_entries(&self, entries: Vec<RawEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    /// Get the number of times fetch was called
    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<RawEntry>, FeedError> {
        *self.fetch_count.lock().unwrap() += 1;
        Ok(self.entries.lock().unwrap().clone())
    }
}

/// Always fails to fetch
pub struct FailingFeedSource {
    name: String,
    reason: String,
}

impl FailingFeedSource {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl FeedSource for FailingFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<RawEntry>, FeedError> {
        Err(FeedError::Fetch {
            url: format!("mock://{}", self.name),
            reason: self.reason.clone(),
        })
    }
}
