//! Scrape+summarize worker for a single queue item.
//!
//! The worker loads an item page through the run's shared browser session,
//! extracts its visible text and asks the summarizer for a short Markdown
//! summary. Every failure is absorbed here: navigation, extraction,
//! summarization and the per-item deadline all end in "no contribution" and
//! a log line, never in an error that could halt the batch.

use crate::api::{AskAsync, summarizer_message};
use crate::browser::BrowserSession;
use crate::utils::truncate_for_log;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

/// Something that turns one queued URL into zero or one summary.
pub trait ItemProcessor {
    async fn process(&mut self, url: &str) -> Option<String>;
}

/// Production [`ItemProcessor`]: browser session plus summarizer.
pub struct Worker<'s, B, S> {
    browser: &'s mut B,
    summarizer: &'s S,
    item_timeout: Duration,
}

impl<'s, B, S> Worker<'s, B, S>
where
    B: BrowserSession,
    S: AskAsync<Response = String>,
{
    pub fn new(browser: &'s mut B, summarizer: &'s S, item_timeout: Duration) -> Self {
        Self {
            browser,
            summarizer,
            item_timeout,
        }
    }

    async fn scrape_and_summarize(&mut self, url: &str) -> Option<String> {
        if let Err(e) = self.browser.navigate(url).await {
            warn!(%url, error = %e, "Could not load page; skipping item");
            return None;
        }
        let page_text = match self.browser.extract_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(%url, error = %e, "Could not extract page text; skipping item");
                return None;
            }
        };

        let summary = match self
            .summarizer
            .ask(&summarizer_message(url, &page_text))
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!(%url, error = %e, "Summarizer failed; skipping item");
                return None;
            }
        };

        let summary = summary.trim();
        if summary.is_empty() {
            warn!(%url, "Summarizer returned nothing; skipping item");
            return None;
        }
        info!(%url, preview = %truncate_for_log(summary, 120), "Summarized item");
        Some(summary.to_string())
    }
}

impl<'s, B, S> ItemProcessor for Worker<'s, B, S>
where
    B: BrowserSession,
    S: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn process(&mut self, url: &str) -> Option<String> {
        let t0 = Instant::now();
        let deadline = self.item_timeout;
        match timeout(deadline, self.scrape_and_summarize(url)).await {
            Ok(contribution) => contribution,
            Err(_) => {
                error!(
                    %url,
                    timeout_secs = deadline.as_secs(),
                    elapsed_ms = t0.elapsed().as_millis(),
                    "Item timed out; skipping"
                );
                None
            }
        }
    }
}
