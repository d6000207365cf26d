//! Command-line interface definitions for Feed Digest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets and message bus settings can also be provided via environment
//! variables (or a `.env` file).

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Feed Digest application.
///
/// # Examples
///
/// ```sh
/// # Run the default source with built-in settings
/// feed_digest
///
/// # Run a named source from a tracker config file
/// feed_digest --source Rust --config ./tracker.yaml
///
/// # With message bus enabled
/// feed_digest --amqp-url amqp://localhost:5672
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Configured source to run (defaults to the config's `default_source`)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Path to the tracker config YAML (sources, recipients, timeouts)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the awful_aj LLM config.yaml (defaults to awful_aj's config dir)
    #[arg(long)]
    pub llm_config: Option<PathBuf>,

    /// Override the location of the cutoff record
    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    /// SMTP relay host (overrides the config file)
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP username
    #[arg(long, env = "SMTP_USER", hide_env_values = true)]
    pub smtp_user: Option<String>,

    /// SMTP password
    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    /// AMQP URL for message bus (optional, enables event publishing when `publish` feature is enabled)
    #[arg(long, env = "AMQP_URL")]
    pub amqp_url: Option<String>,

    /// Message bus exchange name (only used when `publish` feature is enabled)
    #[arg(long, env = "MESSAGE_BUS_EXCHANGE", default_value = "events")]
    pub message_bus_exchange: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["feed_digest"]);
        assert_eq!(cli.source, None);
        assert_eq!(cli.config, None);
        assert_eq!(cli.cache_path, None);
    }

    #[test]
    fn test_cli_source_and_config() {
        let cli = Cli::parse_from([
            "feed_digest",
            "--source",
            "OpenAI",
            "--config",
            "./tracker.yaml",
            "--cache-path",
            "/tmp/cache.json",
        ]);
        assert_eq!(cli.source.as_deref(), Some("OpenAI"));
        assert_eq!(cli.config, Some(PathBuf::from("./tracker.yaml")));
        assert_eq!(cli.cache_path, Some(PathBuf::from("/tmp/cache.json")));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["feed_digest", "-s", "Rust", "-c", "t.yaml"]);
        assert_eq!(cli.source.as_deref(), Some("Rust"));
        assert_eq!(cli.config, Some(PathBuf::from("t.yaml")));
    }
}
