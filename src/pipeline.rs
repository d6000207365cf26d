//! The tracker pipeline: fetch, drain, compose, notify.
//!
//! ## Queue driver
//!
//! The pending queue is drained by a two-state machine:
//!
//! ```text
//!            pick_next (pop head)        worker.process(url)
//! HAS_PENDING ───────────────────► item ─────────────────────┐
//!      ▲                                                      │
//!      └──────────── pending non-empty ◄──────────────────────┤
//!                                                             │
//! DRAINED ◄─────────────── pending empty ◄────────────────────┘
//! ```
//!
//! The run starts in `HAS_PENDING` when the fetch found anything, otherwise
//! directly in `DRAINED`. Exactly one item is in flight at a time and every
//! iteration shares the run's browser session and summarizer.
//!
//! ## Accumulation
//!
//! Each iteration contributes zero or one summary. Contributions are merged
//! by [`accumulate`], which takes the collection and returns the extended
//! one; nothing is ever replaced.
//!
//! ## Resources
//!
//! The browser session is closed after the run on every path, and the cutoff
//! record is written only once notification has finished.

use crate::api::AskAsync;
use crate::browser::BrowserSession;
use crate::config::TrackerConfig;
use crate::cutoff;
use crate::feeds::{self, FeedReader};
use crate::models::{NotifyOutcome, RunState};
use crate::notify::{MailTransport, Notifier};
use crate::report;
use crate::worker::{ItemProcessor, Worker};
use crate::{publish_error, publish_info};
use chrono::Utc;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Queue driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    HasPending,
    Drained,
}

impl DrainState {
    /// State right after the fetch: empty fetch goes straight to `Drained`.
    pub fn initial(state: &RunState) -> Self {
        if state.raw_links.is_empty() {
            DrainState::Drained
        } else {
            DrainState::HasPending
        }
    }

    /// The guard evaluated after every worker invocation.
    pub fn after_iteration(state: &RunState) -> Self {
        if state.pending_links.is_empty() {
            DrainState::Drained
        } else {
            DrainState::HasPending
        }
    }
}

/// Pop the head of the queue into `current_url`.
///
/// An empty queue clears `current_url` and reports `Drained`.
pub fn pick_next(state: &mut RunState) -> DrainState {
    match state.pending_links.pop_front() {
        Some(url) => {
            state.current_url = Some(url);
            DrainState::HasPending
        }
        None => {
            state.current_url = None;
            DrainState::Drained
        }
    }
}

/// Merge one iteration's contribution into the accumulated summaries.
pub fn accumulate(mut summaries: Vec<String>, contribution: Option<String>) -> Vec<String> {
    summaries.extend(contribution);
    summaries
}

/// Counters for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub pops: usize,
    pub summarized: usize,
    pub failed: usize,
}

/// Drain the pending queue one item at a time.
#[instrument(level = "info", skip_all, fields(pending = state.pending_links.len()))]
pub async fn drain<P: ItemProcessor>(mut state: RunState, worker: &mut P) -> (RunState, DrainStats) {
    let mut stats = DrainStats::default();
    let mut phase = DrainState::initial(&state);
    let total = state.raw_links.len();

    while phase == DrainState::HasPending {
        if pick_next(&mut state) == DrainState::Drained {
            break;
        }
        let Some(url) = state.current_url.clone() else {
            break;
        };
        stats.pops += 1;
        debug!(%url, position = stats.pops, total, "Processing item");

        let contribution = worker.process(&url).await;
        match contribution {
            Some(_) => stats.summarized += 1,
            None => stats.failed += 1,
        }
        state.summaries = accumulate(std::mem::take(&mut state.summaries), contribution);

        phase = DrainState::after_iteration(&state);
    }

    info!(
        pops = stats.pops,
        summarized = stats.summarized,
        failed = stats.failed,
        "Queue drained"
    );
    (state, stats)
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: RunState,
    pub stats: DrainStats,
    pub notify: NotifyOutcome,
    pub elapsed: Duration,
}

/// One tracker wired to its collaborators.
pub struct Tracker<R, B, S, F, M> {
    config: TrackerConfig,
    feeds: R,
    browser: B,
    summarizer: S,
    notifier: Notifier<F, M>,
}

impl<R, B, S, F, M> Tracker<R, B, S, F, M>
where
    R: FeedReader,
    B: BrowserSession,
    S: AskAsync<Response = String>,
    F: AskAsync<Response = String>,
    M: MailTransport,
{
    /// Build a tracker around an already opened browser session.
    pub fn new(
        config: TrackerConfig,
        feeds: R,
        browser: B,
        summarizer: S,
        notifier: Notifier<F, M>,
    ) -> Self {
        Self {
            config,
            feeds,
            browser,
            summarizer,
            notifier,
        }
    }

    /// Run the pipeline for `source_name`.
    ///
    /// Fails only on configuration errors (unknown source) or when the
    /// cutoff record cannot be written. The browser session is closed on
    /// every path.
    #[instrument(level = "info", skip_all, fields(source = %source_name))]
    pub async fn run(&mut self, source_name: &str) -> Result<RunSummary, Box<dyn Error>> {
        let t0 = Instant::now();
        publish_info!(
            "feed_digest",
            event_kind = "run.started",
            source = source_name,
            "Tracker run starting"
        );

        let result = self.execute(source_name).await;
        self.shutdown().await;

        let (state, stats, notify) = match result {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "Tracker run failed");
                publish_error!(
                    "feed_digest",
                    event_kind = "run.failed",
                    source = source_name,
                    error = e.to_string(),
                    "Tracker run failed"
                );
                return Err(e);
            }
        };

        cutoff::write_record(&self.config.cache_path, Utc::now()).await?;

        let elapsed = t0.elapsed();
        info!(
            discovered = state.raw_links.len(),
            processed = state.processed_count(),
            summarized = stats.summarized,
            failed = stats.failed,
            notify = notify.as_str(),
            elapsed_ms = elapsed.as_millis(),
            "Tracker run complete"
        );
        publish_info!(
            "feed_digest",
            event_kind = "run.completed",
            source = source_name,
            summarized = stats.summarized,
            failed = stats.failed,
            notify = notify.as_str(),
            duration_millis = elapsed.as_millis() as u64,
            "Tracker run completed"
        );

        Ok(RunSummary {
            state,
            stats,
            notify,
            elapsed,
        })
    }

    /// Close the browser session. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.browser.close().await;
    }

    async fn execute(
        &mut self,
        source_name: &str,
    ) -> Result<(RunState, DrainStats, NotifyOutcome), Box<dyn Error>> {
        let feed_urls = self.config.feed_urls(source_name)?;
        let mut state = RunState::new(source_name, feed_urls);

        let cutoff = cutoff::resolve_cutoff(
            &self.config.cache_path,
            self.config.fallback_lookback_days,
            Utc::now(),
        )
        .await;

        let links = feeds::fetch(&self.feeds, &state.feed_urls, cutoff).await;
        state.load_links(links);
        publish_info!(
            "feed_digest",
            event_kind = "fetch.completed",
            new_links = state.raw_links.len(),
            "Feed fetch completed"
        );

        let mut worker = Worker::new(
            &mut self.browser,
            &self.summarizer,
            self.config.item_timeout(),
        );
        let (mut state, stats) = drain(state, &mut worker).await;
        publish_info!(
            "feed_digest",
            event_kind = "drain.completed",
            summarized = stats.summarized,
            failed = stats.failed,
            "Queue drained"
        );

        state.final_report = report::compose(&state.source_name, &state.summaries);
        let notify = self.notifier.notify(state.final_report.as_deref()).await;
        publish_info!(
            "feed_digest",
            event_kind = "notify.completed",
            outcome = notify.as_str(),
            "Notification step finished"
        );

        Ok((state, stats, notify))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedItem;
    use crate::notify::tests::{JsonFormatter, RecordingTransport};
    use crate::worker::tests::{EchoSummarizer, FakeBrowser};
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;

    /// Scripted processor: succeeds unless the URL is listed in `fail`.
    #[derive(Default)]
    struct ScriptedProcessor {
        fail: Vec<String>,
        seen: Vec<String>,
    }

    impl ItemProcessor for ScriptedProcessor {
        async fn process(&mut self, url: &str) -> Option<String> {
            self.seen.push(url.to_string());
            if self.fail.iter().any(|f| f == url) {
                None
            } else {
                Some(format!("summary of {}", url))
            }
        }
    }

    fn loaded_state(links: &[&str]) -> RunState {
        let mut state = RunState::new("OpenAI", vec!["feed".to_string()]);
        state.load_links(links.iter().map(|l| l.to_string()).collect());
        state
    }

    #[test]
    fn test_pick_next_pops_head() {
        let mut state = loaded_state(&["a", "b"]);
        assert_eq!(pick_next(&mut state), DrainState::HasPending);
        assert_eq!(state.current_url.as_deref(), Some("a"));
        assert_eq!(state.pending_links, VecDeque::from(vec!["b".to_string()]));
        // pending stays a suffix of raw_links
        assert!(state.raw_links.ends_with(&["b".to_string()]));
    }

    #[test]
    fn test_pick_next_on_empty_clears_current() {
        let mut state = loaded_state(&["a"]);
        pick_next(&mut state);
        assert_eq!(pick_next(&mut state), DrainState::Drained);
        assert_eq!(state.current_url, None);
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(DrainState::initial(&loaded_state(&[])), DrainState::Drained);
        assert_eq!(DrainState::initial(&loaded_state(&["a"])), DrainState::HasPending);
    }

    #[test]
    fn test_accumulate_appends_only() {
        let s = accumulate(vec!["one".to_string()], None);
        assert_eq!(s, vec!["one"]);
        let s = accumulate(s, Some("two".to_string()));
        assert_eq!(s, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_drain_pops_exactly_n_times() {
        for n in [0usize, 1, 2, 7] {
            let links: Vec<String> = (0..n).map(|i| format!("https://x/{}", i)).collect();
            let refs: Vec<&str> = links.iter().map(String::as_str).collect();
            let mut processor = ScriptedProcessor::default();

            let (state, stats) = drain(loaded_state(&refs), &mut processor).await;

            assert_eq!(stats.pops, n);
            assert_eq!(processor.seen, links);
            assert!(state.pending_links.is_empty());
            assert_eq!(DrainState::after_iteration(&state), DrainState::Drained);
            assert_eq!(state.processed_count(), n);
        }
    }

    #[tokio::test]
    async fn test_drain_empty_queue_never_pops() {
        let mut processor = ScriptedProcessor::default();
        let (state, stats) = drain(loaded_state(&[]), &mut processor).await;
        assert_eq!(stats, DrainStats::default());
        assert_eq!(state.current_url, None);
        assert!(state.summaries.is_empty());
    }

    #[tokio::test]
    async fn test_summaries_count_successes_only() {
        let mut processor = ScriptedProcessor {
            fail: vec!["b".to_string(), "d".to_string()],
            ..ScriptedProcessor::default()
        };
        let (state, stats) = drain(loaded_state(&["a", "b", "c", "d"]), &mut processor).await;
        assert_eq!(state.summaries, vec!["summary of a", "summary of c"]);
        assert_eq!(stats.summarized, 2);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_scenario_one_success_one_failure() {
        let mut processor = ScriptedProcessor {
            fail: vec!["y".to_string()],
            ..ScriptedProcessor::default()
        };
        let (state, _) = drain(loaded_state(&["x", "y"]), &mut processor).await;
        assert_eq!(state.summaries, vec!["summary of x"]);

        let report = report::compose(&state.source_name, &state.summaries).unwrap();
        assert_eq!(report.matches("summary of").count(), 1);
    }

    // ── Tracker end-to-end ──────────────────────────────────────────────────

    struct StaticFeeds {
        feeds: HashMap<String, Vec<FeedItem>>,
    }

    impl FeedReader for StaticFeeds {
        async fn read(&self, feed_url: &str) -> Result<Vec<FeedItem>, Box<dyn Error>> {
            self.feeds
                .get(feed_url)
                .cloned()
                .ok_or_else(|| format!("404 for {}", feed_url).into())
        }
    }

    fn entry(link: &str, published: DateTime<Utc>) -> FeedItem {
        FeedItem {
            link: Some(link.to_string()),
            published: Some(published),
            ..FeedItem::default()
        }
    }

    fn test_config(name: &str) -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.sources.insert(
            "Test".to_string(),
            vec!["feed1".to_string(), "feed2".to_string()],
        );
        config.cache_path = std::env::temp_dir()
            .join(format!("feed_digest_pipeline_{}_{}", std::process::id(), name))
            .join("cache.json");
        config.email_recipients = vec!["team@example.com".to_string()];
        config
    }

    async fn seed_cutoff(path: &PathBuf, at: DateTime<Utc>) {
        cutoff::write_record(path, at).await.unwrap();
    }

    type TestTracker =
        Tracker<StaticFeeds, FakeBrowser, EchoSummarizer, JsonFormatter, RecordingTransport>;

    fn tracker(config: TrackerConfig, feeds: StaticFeeds, browser: FakeBrowser) -> TestTracker {
        let notifier = Notifier::new(
            JsonFormatter::default(),
            RecordingTransport::default(),
            config.from_email.clone(),
            config.email_recipients.clone(),
        );
        Tracker::new(config, feeds, browser, EchoSummarizer, notifier)
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let config = test_config("e2e");
        let t = Utc::now() - ChronoDuration::days(1);
        seed_cutoff(&config.cache_path, t).await;

        let mut feeds = HashMap::new();
        feeds.insert(
            "feed1".to_string(),
            vec![
                entry("https://x/old", t - ChronoDuration::hours(1)),
                entry("https://x/a", t + ChronoDuration::hours(1)),
                entry("https://x/broken", t + ChronoDuration::hours(2)),
            ],
        );
        feeds.insert(
            "feed2".to_string(),
            vec![entry("https://x/a", t + ChronoDuration::hours(3))],
        );
        let browser = FakeBrowser::with_pages(&[
            ("https://x/a", Some("page a")),
            ("https://x/broken", None),
        ]);
        let cache_path = config.cache_path.clone();
        let mut tracker = tracker(config, StaticFeeds { feeds }, browser);

        let summary = tracker.run("Test").await.unwrap();

        assert_eq!(summary.state.raw_links, vec!["https://x/a", "https://x/broken"]);
        assert_eq!(summary.stats.pops, 2);
        assert_eq!(summary.state.summaries, vec!["## Summary\nhttps://x/a"]);
        assert_eq!(
            summary.state.final_report.as_deref(),
            Some("# Test UPDATES\n\n## Summary\nhttps://x/a")
        );
        assert_eq!(summary.notify, NotifyOutcome::Ok);
        assert_eq!(tracker.browser.closed, 1);
        assert_eq!(tracker.notifier_sent(), 1);

        // cutoff advanced past the seeded value
        let record = cutoff::read_record(&cache_path).await.unwrap();
        assert!(record.last_run > t);
        let _ = std::fs::remove_dir_all(cache_path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_run_with_nothing_new_sends_nothing() {
        let config = test_config("empty");
        let t = Utc::now() - ChronoDuration::hours(1);
        seed_cutoff(&config.cache_path, t).await;

        let mut feeds = HashMap::new();
        feeds.insert(
            "feed1".to_string(),
            vec![entry("https://x/old", t - ChronoDuration::days(2))],
        );
        // feed2 missing: isolated failure
        let cache_path = config.cache_path.clone();
        let mut tracker = tracker(config, StaticFeeds { feeds }, FakeBrowser::default());

        let summary = tracker.run("Test").await.unwrap();

        assert!(summary.state.raw_links.is_empty());
        assert_eq!(summary.state.final_report, None);
        assert_eq!(summary.notify, NotifyOutcome::NoReport);
        assert_eq!(tracker.browser.navigations, 0);
        assert_eq!(tracker.browser.closed, 1);
        assert_eq!(tracker.notifier_attempts(), 0);
        assert!(cutoff::read_record(&cache_path).await.unwrap().last_run > t);
        let _ = std::fs::remove_dir_all(cache_path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_unknown_source_fails_before_fetch() {
        let config = test_config("unknown");
        let cache_path = config.cache_path.clone();
        let mut tracker = tracker(
            config,
            StaticFeeds {
                feeds: HashMap::new(),
            },
            FakeBrowser::default(),
        );

        let err = tracker.run("Nope").await.unwrap_err();
        assert!(err.to_string().contains("unknown source"));
        assert_eq!(tracker.browser.navigations, 0);
        assert_eq!(tracker.browser.closed, 1);
        // no cutoff written on a failed run
        assert!(!cache_path.exists());
    }

    #[tokio::test]
    async fn test_send_failure_still_completes_run() {
        let mut config = test_config("sendfail");
        let t = Utc::now() - ChronoDuration::hours(6);
        seed_cutoff(&config.cache_path, t).await;
        config.email_recipients = vec!["team@example.com".to_string()];

        let mut feeds = HashMap::new();
        feeds.insert(
            "feed1".to_string(),
            vec![entry("https://x/a", t + ChronoDuration::hours(1))],
        );
        feeds.insert("feed2".to_string(), Vec::new());
        let notifier = Notifier::new(
            JsonFormatter::default(),
            RecordingTransport {
                fail: true,
                ..RecordingTransport::default()
            },
            config.from_email.clone(),
            config.email_recipients.clone(),
        );
        let cache_path = config.cache_path.clone();
        let mut tracker = Tracker::new(
            config,
            StaticFeeds { feeds },
            FakeBrowser::with_pages(&[("https://x/a", Some("page a"))]),
            EchoSummarizer,
            notifier,
        );

        let summary = tracker.run("Test").await.unwrap();
        assert_eq!(summary.notify, NotifyOutcome::SendFailed);
        assert_eq!(summary.state.summaries.len(), 1);
        assert!(cutoff::read_record(&cache_path).await.unwrap().last_run > t);
        let _ = std::fs::remove_dir_all(cache_path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_missing_cutoff_uses_lookback_window() {
        let mut config = test_config("lookback");
        config.fallback_lookback_days = 10;
        let now = Utc::now();

        let mut feeds = HashMap::new();
        feeds.insert(
            "feed1".to_string(),
            vec![
                entry("https://x/recent", now - ChronoDuration::days(2)),
                entry("https://x/ancient", now - ChronoDuration::days(30)),
            ],
        );
        feeds.insert("feed2".to_string(), Vec::new());
        let cache_path = config.cache_path.clone();
        let _ = std::fs::remove_dir_all(cache_path.parent().unwrap());
        let mut tracker = tracker(
            config,
            StaticFeeds { feeds },
            FakeBrowser::with_pages(&[("https://x/recent", Some("text"))]),
        );

        let summary = tracker.run("Test").await.unwrap();
        assert_eq!(summary.state.raw_links, vec!["https://x/recent"]);
        let _ = std::fs::remove_dir_all(cache_path.parent().unwrap());
    }

    impl TestTracker {
        fn notifier_sent(&self) -> usize {
            self.notifier.sent_count()
        }

        fn notifier_attempts(&self) -> usize {
            self.notifier.attempt_count()
        }
    }
}
