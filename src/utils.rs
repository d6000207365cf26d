//! Utility functions for log formatting, text cleanup, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging long LLM responses and page text
//! - Whitespace normalization for extracted page text
//! - Markdown code-fence stripping for JSON returned by the LLM
//! - Parent directory creation for the cutoff record

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").expect("static regex")
});

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters with an ellipsis and
/// byte count indicator appended. The cut always lands on a character
/// boundary.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}

/// Remove a surrounding Markdown code fence (```json … ```) if present.
///
/// Models asked for JSON frequently wrap it in a fence; the payload inside
/// is returned untouched.
pub fn strip_code_fence(s: &str) -> &str {
    match CODE_FENCE.captures(s).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => s.trim(),
    }
}

/// Create the parent directory of `path` if it does not exist yet.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
            debug!(dir = %parent.display(), "Ensured parent directory");
        }
    }
    Ok(())
}
