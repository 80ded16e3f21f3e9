//! Feed sources and the daily candidate aggregator
//!
//! A [`FeedSource`] yields raw entries from one feed. The [`FeedAggregator`]
//! merges all sources, keeps only entries published on the current UTC day,
//! and orders them oldest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::types::{derive_identifier, CandidateItem};

pub mod http;

// Mock sources are available for all builds to support integration tests
pub mod mock;

/// One entry as exposed by a feed, before filtering
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    /// Publication time, falling back to the update time
    pub published_at: Option<DateTime<Utc>>,
}

/// A single news feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Fetch the current entries of the feed
    async fn fetch(&self) -> std::result::Result<Vec<RawEntry>, FeedError>;
}

/// Merges every configured source into one ordered candidate list
pub struct FeedAggregator {
    sources: Vec<Box<dyn FeedSource>>,
}

impl FeedAggregator {
    pub fn new(sources: Vec<Box<dyn FeedSource>>) -> Self {
        Self { sources }
    }

    /// Collect today's candidates from every source, oldest first
    ///
    /// A failing source is logged and skipped. Entries without a timestamp or
    /// dated on another UTC day than `now` are discarded.
    pub async fn fetch_today(&self, now: DateTime<Utc>) -> Vec<CandidateItem> {
        let mut raw: Vec<(String, RawEntry)> = Vec::new();

        for source in &self.sources {
            match source.fetch().await {
                Ok(entries) => {
                    debug!("Feed {} returned {} entries", source.name(), entries.len());
                    raw.extend(entries.into_iter().map(|e| (source.name().to_string(), e)));
                }
                Err(e) => {
                    warn!("Skipping feed {} this cycle: {}", source.name(), e);
                }
            }
        }

        let candidates = select_today(raw, now);
        info!(
            "Collected {} candidate(s) for {} from {} feed(s)",
            candidates.len(),
            now.date_naive(),
            self.sources.len()
        );
        candidates
    }
}

/// Filter to `now`'s UTC date, drop duplicates, sort oldest first
pub fn select_today(raw: Vec<(String, RawEntry)>, now: DateTime<Utc>) -> Vec<CandidateItem> {
    let today = now.date_naive();

    let mut candidates: Vec<CandidateItem> = raw
        .into_iter()
        .filter_map(|(source, entry)| {
            let published_at = entry.published_at?;
            if published_at.date_naive() != today {
                return None;
            }
            if derive_identifier(&entry.link, &entry.title).is_empty() {
                return None;
            }
            Some(
                CandidateItem::new(entry.title, entry.link, entry.summary, published_at)
                    .with_source(source),
            )
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.published_at
            .cmp(&b.published_at)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.identifier.clone()));
    candidates
}
