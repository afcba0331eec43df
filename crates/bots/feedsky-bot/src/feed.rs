use async_trait::async_trait;
use feedsky_core::{FeedEntry, FeedLink};
use reqwest::Client;
use snafu::{ResultExt as _, Snafu};
use time::OffsetDateTime;
use tracing::{debug, info};
use url::Url;

const LOG_TARGET: &str = "feedsky_bot::feed";

#[derive(Debug, Snafu)]
pub enum FeedError {
    #[snafu(display("Feed request to {url} failed"))]
    Http { url: Url, source: reqwest::Error },
    #[snafu(display("Failed to parse feed from {url}"))]
    Parse {
        url: Url,
        source: feed_rs::parser::ParseFeedError,
    },
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Entries published after `since`, oldest first.
    async fn fetch(&self, since: OffsetDateTime) -> FeedResult<Vec<FeedEntry>>;
}

pub struct HttpFeedFetcher {
    client: Client,
    feed_url: Url,
    max_entries: usize,
}

impl HttpFeedFetcher {
    pub fn new(client: Client, feed_url: Url, max_entries: usize) -> Self {
        Self {
            client,
            feed_url,
            max_entries,
        }
    }

    async fn fetch_body(&self) -> FeedResult<Vec<u8>> {
        let url = &self.feed_url;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context(HttpSnafu { url: url.clone() })?;

        let body = response
            .bytes()
            .await
            .context(HttpSnafu { url: url.clone() })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, since: OffsetDateTime) -> FeedResult<Vec<FeedEntry>> {
        let body = self.fetch_body().await?;
        let entries = parse_feed(&body).context(ParseSnafu {
            url: self.feed_url.clone(),
        })?;
        debug!(target: LOG_TARGET, url = %self.feed_url, count = entries.len(), "Parsed feed");

        let selected = select_new_entries(entries, since, self.max_entries);
        for entry in &selected {
            info!(
                target: LOG_TARGET,
                title = %entry.title_text(),
                link = %entry.primary_link(),
                published_at = ?entry.published_at,
                "Found new feed entry"
            );
        }
        Ok(selected)
    }
}

/// Parse RSS, Atom or JSON Feed into entries, in document order.
pub fn parse_feed(body: &[u8]) -> Result<Vec<FeedEntry>, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(body)?;

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| FeedEntry {
            title: entry.title.map(|t| t.content),
            description: entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body)),
            published_at: entry
                .published
                .or(entry.updated)
                .and_then(|dt| dt.timestamp_nanos_opt())
                .and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(nanos.into()).ok()),
            links: entry
                .links
                .into_iter()
                .map(|l| FeedLink { href: l.href })
                .collect(),
        })
        .collect())
}

/// Keep entries published strictly after `since`, oldest first, at most
/// `limit` of them.
///
/// Entries without a publish time can't be compared and are dropped.
/// Feeds list newest first, so the order is reversed before a stable sort by
/// publish time; ties keep the reversed order.
pub fn select_new_entries(
    mut entries: Vec<FeedEntry>,
    since: OffsetDateTime,
    limit: usize,
) -> Vec<FeedEntry> {
    entries.reverse();
    entries.retain(|e| e.published_at.is_some_and(|published| since < published));
    entries.sort_by_key(|e| e.published_at);
    entries.truncate(limit);
    entries
}
