//! RSS/Atom feeds fetched over HTTP

use async_trait::async_trait;
use chrono::Utc;
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::FeedError;
use crate::feeds::{FeedSource, RawEntry};
use crate::text::strip_html;

/// A feed at a fixed URL
pub struct HttpFeedSource {
    client: Client,
    url: String,
    name: String,
}

impl HttpFeedSource {
    /// Create a source sharing `client`
    ///
    /// The name defaults to the URL host.
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        let url = url.into();
        let name = url::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url.clone());
        Self { client, url, name }
    }

    /// Build the HTTP client shared by all feed sources
    pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, FeedError> {
        Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| FeedError::Fetch {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<RawEntry>, FeedError> {
        debug!("Fetching feed: {}", self.url);

        let fetch_error = |reason: String| FeedError::Fetch {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        parse_entries(&self.url, &body)
    }
}

/// Parse RSS/Atom bytes into raw entries
pub fn parse_entries(url: &str, body: &[u8]) -> Result<Vec<RawEntry>, FeedError> {
    let feed = parser::parse(body).map_err(|e| FeedError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = select_link(&entry);
            let title = entry
                .title
                .map(|t| strip_html(&t.content))
                .unwrap_or_default();
            let summary = entry
                .summary
                .map(|s| strip_html(&s.content))
                .unwrap_or_default();
            let published_at = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&Utc));
            RawEntry {
                title,
                link,
                summary,
                published_at,
            }
        })
        .collect::<Vec<_>>();

    debug!("Parsed {} entries from {}", entries.len(), url);
    Ok(entries)
}

/// Prefer an alternate link, then any link, then an http(s) entry id
fn select_link(entry: &feed_rs::model::Entry) -> String {
    for link in &entry.links {
        let href = link.href.trim();
        if href.is_empty() {
            continue;
        }
        let rel = link.rel.as_deref().unwrap_or("");
        if rel.is_empty() || rel.eq_ignore_ascii_case("alternate") {
            return href.to_string();
        }
    }
    if let Some(link) = entry.links.iter().find(|l| !l.href.trim().is_empty()) {
        return link.href.trim().to_string();
    }
    let id = entry.id.trim();
    if id.starts_with("http://") || id.starts_with("https://") {
        return id.to_string();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Wire</title>
    <link>https://wire.example</link>
    <description>News</description>
    <item>
      <title>Exchange lists new token</title>
      <link>https://wire.example/listing</link>
      <description><![CDATA[<p>The <b>exchange</b> said on Monday.</p>]]></description>
      <pubDate>Thu, 10 Apr 2025 09:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated item</title>
      <link>https://wire.example/undated</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_entries() {
        let entries = parse_entries("https://wire.example/rss", RSS.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title, "Exchange lists new token");
        assert_eq!(first.link, "https://wire.example/listing");
        assert_eq!(first.summary, "The exchange said on Monday.");
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2025, 4, 10, 9, 30, 0).unwrap())
        );

        assert_eq!(entries[1].published_at, None);
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let err = parse_entries("https://bad.example", b"not a feed").unwrap_err();
        assert!(matches!(err, FeedError::Parse { .. }));
    }

    #[test]
    fn test_name_defaults_to_host() {
        let source = HttpFeedSource::new(Client::new(), "https://wire.example/rss.xml");
        assert_eq!(source.name(), "wire.example");
        assert_eq!(source.url(), "https://wire.example/rss.xml");
    }
}
