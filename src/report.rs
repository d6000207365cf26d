//! Report composition.
//!
//! The report is a Markdown document: a heading naming the source, then every
//! summary in accumulation order separated by a blank line. No summaries means
//! no report, which downstream is a "no updates" outcome rather than an error.

use tracing::{info, instrument};

/// Compose the run report, or `None` when nothing was summarized.
#[instrument(level = "info", skip_all, fields(%source_name, summaries = summaries.len()))]
pub fn compose(source_name: &str, summaries: &[String]) -> Option<String> {
    if summaries.is_empty() {
        info!("No updates available; no report composed");
        return None;
    }
    let report = format!("# {} UPDATES\n\n{}", source_name, summaries.join("\n\n"));
    info!(bytes = report.len(), "Report composed");
    Some(report)
}
