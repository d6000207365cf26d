//! Data models threaded through a single tracker run.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RunState`]: The one mutable record owned by a pipeline execution
//! - [`FeedItem`]: A single entry parsed out of an RSS/Atom document
//! - [`CutoffRecord`]: The persisted "last successful run" timestamp
//! - [`EmailOutput`]: Subject and HTML body produced by the mail formatter
//! - [`NotifyOutcome`]: Terminal result of the notification step

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;

/// The state of one tracker run.
///
/// `raw_links` is written once after the fetch. `pending_links` is always a
/// suffix of `raw_links`, shrinking from the front as the queue drains.
/// `summaries` only ever grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    /// Name of the configured source being tracked.
    pub source_name: String,
    /// Ordered feed endpoints for this source.
    pub feed_urls: Vec<String>,
    /// Deduplicated new item URLs discovered this run.
    pub raw_links: Vec<String>,
    /// URLs not yet processed, in discovery order.
    pub pending_links: VecDeque<String>,
    /// The URL being processed, `None` once a pop found the queue empty.
    pub current_url: Option<String>,
    /// Per-item summaries in completion order.
    pub summaries: Vec<String>,
    /// The composed report, set only after the queue drains.
    pub final_report: Option<String>,
}

impl RunState {
    pub fn new(source_name: &str, feed_urls: Vec<String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            feed_urls,
            ..Self::default()
        }
    }

    /// Install the fetch result as both the discovered set and the work queue.
    ///
    /// Summaries are reset: a run's accumulation starts at the fetch.
    pub fn load_links(&mut self, links: Vec<String>) {
        self.pending_links = links.iter().cloned().collect();
        self.raw_links = links;
        self.current_url = None;
        self.summaries = Vec::new();
        self.final_report = None;
    }

    /// Number of items popped off the queue so far.
    pub fn processed_count(&self) -> usize {
        self.raw_links.len() - self.pending_links.len()
    }
}

/// One feed entry.
///
/// The link is the identity key for deduplication; entries without one are
/// unusable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub summary: Option<String>,
}

impl FeedItem {
    /// Discovery timestamp: "published" wins over "updated".
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }
}

/// Persisted marker for the start of the last successful run.
///
/// Stored as `{"last_run": "<ISO-8601>"}`. Timestamps without an offset are
/// read as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CutoffRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_run: DateTime<Utc>,
}

/// Parse an RFC 3339 timestamp, or an offset-less ISO-8601 one taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(e) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| e),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(raw.trim()).map_err(serde::de::Error::custom)
}

/// Mail formatter response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmailOutput {
    /// The subject line for the email.
    pub subject: String,
    /// Formatted HTML body for the email.
    pub html_body: String,
}

/// Result of the notification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The report was formatted and handed to the mail transport.
    Ok,
    /// Nothing to send; the transport was never contacted.
    NoReport,
    /// Formatting or delivery failed. The fetched and summarized work stands.
    SendFailed,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Ok => "ok",
            NotifyOutcome::NoReport => "no_report",
            NotifyOutcome::SendFailed => "send_failed",
        }
    }
}
