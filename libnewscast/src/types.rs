//! Core types for Newscast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feed item that has not yet been evaluated for posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Stable identifier: the item link, or the title when the link is empty
    pub identifier: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    /// Name of the feed the item came from
    pub source: String,
}

impl CandidateItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        summary: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let link = link.into();
        let identifier = derive_identifier(&link, &title);
        Self {
            identifier,
            title,
            summary: summary.into(),
            link,
            published_at,
            source: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Link when present, otherwise the title
pub fn derive_identifier(link: &str, title: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        title.trim().to_string()
    } else {
        link.to_string()
    }
}

/// The classifier's decision for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub should_publish: bool,
    pub text: String,
}

impl Verdict {
    pub fn publish(text: impl Into<String>) -> Self {
        Self {
            should_publish: true,
            text: text.into(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            should_publish: false,
            text: String::new(),
        }
    }
}
