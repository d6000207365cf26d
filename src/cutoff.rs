//! Cutoff resolution and the persisted "last successful run" record.
//!
//! The cutoff separates items already seen from new ones. It is read once at
//! the start of a run and written once after the run has finished, including
//! notification. A missing or unreadable record never fails the run: the
//! resolver falls back to a fixed lookback window instead, trading a few
//! re-processed items for guaranteed forward progress.

use crate::models::CutoffRecord;
use crate::utils::ensure_parent_dir;
use chrono::{DateTime, Duration, Utc};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Resolve the time horizon for "new" items.
///
/// Returns the stored `last_run` when the record at `path` can be read and
/// parsed, otherwise `now - fallback_lookback_days`. A window reaching past
/// the representable range starts at the earliest representable instant.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn resolve_cutoff(
    path: &Path,
    fallback_lookback_days: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match read_record(path).await {
        Ok(record) => {
            info!(cutoff = %record.last_run, "Using stored cutoff");
            record.last_run
        }
        Err(e) => {
            let cutoff = lookback(now, fallback_lookback_days);
            warn!(
                error = %e,
                fallback_lookback_days,
                %cutoff,
                "No usable cutoff record; falling back to lookback window"
            );
            cutoff
        }
    }
}

fn lookback(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Read and parse the cutoff record.
pub async fn read_record(path: &Path) -> Result<CutoffRecord, Box<dyn Error>> {
    let raw = fs::read_to_string(path).await?;
    let record = serde_json::from_str::<CutoffRecord>(&raw)?;
    Ok(record)
}

/// Persist `last_run` as the new cutoff, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_record(path: &Path, last_run: DateTime<Utc>) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(path).await?;
    let json = serde_json::to_string_pretty(&CutoffRecord { last_run })?;
    fs::write(path, json).await?;
    info!(%last_run, "Cutoff record updated");
    Ok(())
}
