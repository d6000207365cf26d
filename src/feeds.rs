//! RSS/Atom feed fetching with cutoff filtering and cross-feed deduplication.
//!
//! Fetching is a two-phase affair:
//!
//! 1. **Reading**: every configured feed URL is retrieved and parsed into
//!    [`FeedItem`]s. Feeds are isolated from each other: one unreachable or
//!    malformed feed is logged and contributes nothing.
//! 2. **Selecting**: entries are kept when they have a link and a date, and
//!    that date is strictly after the cutoff. Links are then deduplicated
//!    across all feeds in first-seen order.
//!
//! Dateless entries are dropped rather than included: an item whose age is
//! unknown could be arbitrarily stale.

use crate::models::FeedItem;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use reqwest::Client;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Source of parsed feed entries.
pub trait FeedReader {
    /// Retrieve and parse the feed at `feed_url`.
    async fn read(&self, feed_url: &str) -> Result<Vec<FeedItem>, Box<dyn Error>>;
}

/// [`FeedReader`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFeedReader {
    client: Client,
}

impl HttpFeedReader {
    pub fn new(timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feed_digest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl FeedReader for HttpFeedReader {
    #[instrument(level = "info", skip_all, fields(%feed_url))]
    async fn read(&self, feed_url: &str) -> Result<Vec<FeedItem>, Box<dyn Error>> {
        let body = self
            .client
            .get(feed_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(bytes = body.len(), "Downloaded feed");
        let items = parse_feed(feed_url, &body)?;
        for item in &items {
            debug!(
                link = ?item.link,
                title = ?item.title,
                summary_chars = item.summary.as_deref().map_or(0, str::len),
                "Feed entry"
            );
        }
        Ok(items)
    }
}

/// Parse an RSS or Atom document into feed items.
///
/// Relative entry links are resolved against `feed_url`.
pub fn parse_feed(feed_url: &str, body: &[u8]) -> Result<Vec<FeedItem>, Box<dyn Error>> {
    let feed = parser::parse(body)?;
    let base = Url::parse(feed_url).ok();
    let items = feed
        .entries
        .into_iter()
        .map(|entry| to_feed_item(base.as_ref(), entry))
        .collect::<Vec<_>>();
    Ok(items)
}

fn to_feed_item(base: Option<&Url>, entry: Entry) -> FeedItem {
    let href = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.as_str());

    FeedItem {
        link: href.and_then(|h| resolve_link(base, h)),
        published: entry.published,
        updated: entry.updated,
        title: entry.title.map(|t| t.content),
        summary: entry.summary.map(|s| s.content),
    }
}

/// Turn an entry href into an absolute URL, or `None` if it cannot be resolved.
pub fn resolve_link(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = match base {
        Some(base) => base.join(href),
        None => Url::parse(href),
    };
    resolved.ok().map(|u| u.to_string())
}

/// Keep the links of items dated strictly after `cutoff`, deduplicated across
/// all batches in first-seen order.
pub fn select_new_links<I>(batches: I, cutoff: DateTime<Utc>) -> Vec<String>
where
    I: IntoIterator<Item = Vec<FeedItem>>,
{
    batches
        .into_iter()
        .flatten()
        .filter_map(|item| {
            let link = item.link.as_ref()?;
            let ts = item.timestamp()?;
            (ts > cutoff).then(|| link.clone())
        })
        .unique()
        .collect()
}

/// Fetch every feed in order and return the new, deduplicated item links.
///
/// A feed that fails to load yields zero entries; the others still count.
#[instrument(level = "info", skip_all, fields(feeds = feed_urls.len(), %cutoff))]
pub async fn fetch<R: FeedReader>(
    reader: &R,
    feed_urls: &[String],
    cutoff: DateTime<Utc>,
) -> Vec<String> {
    let batches: Vec<Vec<FeedItem>> = stream::iter(feed_urls.iter())
        .then(|feed_url| async move {
            match reader.read(feed_url).await {
                Ok(items) => {
                    info!(%feed_url, entries = items.len(), "Parsed feed");
                    items
                }
                Err(e) => {
                    warn!(%feed_url, error = %e, "Feed failed; skipping");
                    Vec::new()
                }
            }
        })
        .collect()
        .await;

    let total = batches.iter().map(Vec::len).sum::<usize>();
    let links = select_new_links(batches, cutoff);
    info!(entries = total, new_links = links.len(), "Feed fetch complete");
    debug!(?links, "New links");
    links
}
