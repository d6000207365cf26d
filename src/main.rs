//! # Feed Digest
//!
//! An incremental RSS/Atom tracker that finds items published since the last
//! run, scrapes and summarizes each one through an LLM, assembles the
//! summaries into a single Markdown report, and emails it.
//!
//! ## Usage
//!
//! ```sh
//! feed_digest --source OpenAI --config ./tracker.yaml
//! ```
//!
//! ## Architecture
//!
//! One run is a sequential pipeline:
//! 1. **Cutoff**: read the last-run timestamp (or fall back to a lookback window)
//! 2. **Fetch**: read every feed of the source, keep new items, dedupe links
//! 3. **Drain**: pop one link at a time, scrape it, summarize it, accumulate
//! 4. **Compose**: join the summaries under a heading naming the source
//! 5. **Notify**: format the report as an email and send it
//! 6. **Advance**: write the new cutoff once everything above has finished

use awful_aj::{config_dir, template};
use clap::Parser;
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod browser;
mod cli;
mod config;
mod cutoff;
mod feeds;
mod models;
mod notify;
mod pipeline;
mod publish;
mod report;
mod utils;
mod worker;

use api::AskFnWrapper;
use browser::HttpBrowser;
use cli::Cli;
use config::TrackerConfig;
use feeds::HttpFeedReader;
use notify::{Notifier, SmtpTransport};
use pipeline::Tracker;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Err(e) = dotenvy::dotenv() {
        debug!(error = %e, "No .env file loaded");
    }

    info!("feed_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.source, ?args.config, ?args.cache_path, "Parsed CLI arguments");

    publish::init(args.amqp_url.as_ref(), &args.message_bus_exchange).await;

    // ---- Tracker config ----
    let mut config = TrackerConfig::load(args.config.as_deref()).await?;
    if let Some(cache_path) = args.cache_path.clone() {
        config.cache_path = cache_path;
    }
    if let Some(host) = args.smtp_host.clone() {
        config.smtp.host = Some(host);
    }
    config.smtp.username = args.smtp_user.clone();
    config.smtp.password = args.smtp_pass.clone();
    let source = args
        .source
        .clone()
        .unwrap_or_else(|| config.default_source.clone());
    info!(%source, cache_path = %config.cache_path.display(), "Tracker configured");

    // ---- LLM config & templates ----
    let llm_config_file = match &args.llm_config {
        Some(path) => path.clone(),
        None => config_dir()?.join("config.yaml"),
    };
    let llm_config_path = llm_config_file
        .to_str()
        .ok_or("LLM config path is not valid UTF-8")?;
    let llm_config = awful_aj::config::load_config(llm_config_path)?;
    info!(llm_config_path, "Loaded LLM configuration");

    let summarizer_template = template::load_template(&config.summarizer_template).await?;
    let mailer_template = template::load_template(&config.mailer_template).await?;
    info!(
        summarizer = %config.summarizer_template,
        mailer = %config.mailer_template,
        "Loaded templates"
    );

    // ---- Collaborators ----
    let summarizer = AskFnWrapper {
        config: &llm_config,
        template: &summarizer_template,
    };
    let notifier = Notifier::new(
        AskFnWrapper {
            config: &llm_config,
            template: &mailer_template,
        },
        SmtpTransport::new(config.smtp.clone()),
        config.from_email.clone(),
        config.email_recipients.clone(),
    );
    let feeds = HttpFeedReader::new(config.feed_timeout())?;
    let browser = HttpBrowser::open(config.feed_timeout())?;
    let mut tracker = Tracker::new(config, feeds, browser, summarizer, notifier);

    // ---- Run ----
    let finished = tokio::select! {
        res = tracker.run(&source) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(result) = finished else {
        warn!("Interrupted; closing browser session");
        tracker.shutdown().await;
        return Err("interrupted".into());
    };
    let summary = result?;

    if let Some(report) = &summary.state.final_report {
        println!("\n{}", report);
    }

    info!(
        elapsed = ?summary.elapsed,
        secs = summary.elapsed.as_secs(),
        millis = summary.elapsed.subsec_millis(),
        summarized = summary.stats.summarized,
        failed = summary.stats.failed,
        notify = summary.notify.as_str(),
        "Execution complete"
    );

    Ok(())
}
