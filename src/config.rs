//! Static tracker configuration.
//!
//! The configuration names every trackable source and its feeds, where the
//! cutoff record lives, how far back to look on a first run, and who receives
//! the digest. It is read from an optional YAML file; anything the file leaves
//! out falls back to the built-in defaults.
//!
//! ```yaml
//! default_source: OpenAI
//! sources:
//!   OpenAI:
//!     - https://openai.com/blog/rss.xml
//! cache_path: .cached/cache.json
//! fallback_lookback_days: 10
//! item_timeout_secs: 120
//! from_email: digest@example.com
//! email_recipients:
//!   - team@example.com
//! smtp:
//!   host: smtp.example.com
//!   port: 587
//!   tls: starttls
//! ```

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

/// Port for SMTP over implicit TLS.
pub const SMTPS_PORT: u16 = 465;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Plaintext greeting, then upgrade with `STARTTLS` (submission, port 587).
    Starttls,
    /// TLS from the first byte (SMTPS, port 465).
    Wrapper,
    /// No encryption. Local relays only.
    None,
}

/// SMTP relay settings. Credentials normally arrive through the environment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Unset picks from the port: 465 wraps, anything else uses STARTTLS.
    pub tls: Option<SmtpTls>,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl SmtpSettings {
    pub fn tls_mode(&self) -> SmtpTls {
        match (self.tls, self.port) {
            (Some(tls), _) => tls,
            (None, Some(SMTPS_PORT)) => SmtpTls::Wrapper,
            (None, _) => SmtpTls::Starttls,
        }
    }
}

/// Upper bound for `fallback_lookback_days`.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Source name to ordered feed URLs.
    pub sources: BTreeMap<String, Vec<String>>,
    /// Source run when none is named on the command line.
    pub default_source: String,
    /// Location of the `{"last_run": …}` cutoff record.
    pub cache_path: PathBuf,
    /// Lookback window used when no cutoff record can be read.
    pub fallback_lookback_days: i64,
    /// Upper bound on scraping plus summarizing a single item.
    pub item_timeout_secs: u64,
    /// HTTP timeout for each feed and page request.
    pub feed_timeout_secs: u64,
    pub from_email: String,
    pub email_recipients: Vec<String>,
    /// awful_aj template holding the summarizer instructions.
    pub summarizer_template: String,
    /// awful_aj template holding the mail formatter instructions.
    pub mailer_template: String,
    pub smtp: SmtpSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            "OpenAI".to_string(),
            vec!["https://openai.com/blog/rss.xml".to_string()],
        );
        Self {
            sources,
            default_source: "OpenAI".to_string(),
            cache_path: PathBuf::from(".cached/cache.json"),
            fallback_lookback_days: 10,
            item_timeout_secs: 120,
            feed_timeout_secs: 30,
            from_email: "feed-digest@localhost".to_string(),
            email_recipients: Vec::new(),
            summarizer_template: "feed_summarizer".to_string(),
            mailer_template: "report_mailer".to_string(),
            smtp: SmtpSettings::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from `path`, or return the defaults when no path is given.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No tracker config given; using built-in defaults");
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).await?;
        let config = Self::from_yaml(&raw)?;
        info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded tracker configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, Box<dyn Error>> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if !(0..=MAX_LOOKBACK_DAYS).contains(&self.fallback_lookback_days) {
            return Err(format!(
                "fallback_lookback_days must be between 0 and {}, got {}",
                MAX_LOOKBACK_DAYS, self.fallback_lookback_days
            )
            .into());
        }
        Ok(())
    }

    /// Feed URLs for `source`, duplicates removed, configured order kept.
    ///
    /// An unknown source is a configuration error and fails the run.
    pub fn feed_urls(&self, source: &str) -> Result<Vec<String>, Box<dyn Error>> {
        match self.sources.get(source) {
            Some(urls) => Ok(urls.iter().unique().cloned().collect()),
            None => Err(format!(
                "unknown source `{}` (configured: {})",
                source,
                self.sources.keys().join(", ")
            )
            .into()),
        }
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }
}
