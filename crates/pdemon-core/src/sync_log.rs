//! Last repository sync lookup

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::line_source;
use crate::patterns::LogEvent;
use crate::scan_window::{
    LogLength, Lookup, ScanWindowPlanner, DEFAULT_FALLBACK_MAX_LINES, DEFAULT_RETRY_STEPS,
};

/// Options for [`last_sync_timestamp`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScanOptions {
    /// Repository whose sync completion counts (usually `gentoo`)
    pub primary_repo: String,
    /// Size of the first scan window
    pub initial_lines: usize,
    /// Number of window sizes to try
    pub retry_steps: usize,
    /// Window ceiling when the log length is unknown
    pub fallback_max_lines: usize,
}

impl Default for SyncScanOptions {
    fn default() -> Self {
        Self {
            primary_repo: "gentoo".to_string(),
            initial_lines: 500,
            retry_steps: DEFAULT_RETRY_STEPS,
            fallback_max_lines: DEFAULT_FALLBACK_MAX_LINES,
        }
    }
}

/// Timestamp of the most recent completed sync of the primary repository.
///
/// Returns `Lookup::NotFound` when no window contained a sync marker, and an
/// error only when the log itself could not be read.
pub fn last_sync_timestamp(path: &Path, options: &SyncScanOptions) -> Result<Lookup<i64>> {
    let length = LogLength::measure(path, options.fallback_max_lines);
    let planner = ScanWindowPlanner::new(options.initial_lines, length, options.retry_steps);

    let mut window = planner.first();
    let mut attempt = 0;
    loop {
        let mut latest: Option<i64> = None;
        for line in line_source::tail(path, window.size)? {
            let line = line?;
            if let Some(ts) = sync_timestamp(&line.text, &options.primary_repo) {
                latest = Some(latest.map_or(ts, |current| current.max(ts)));
            }
        }

        if let Some(ts) = latest {
            tracing::debug!(
                "Last {} sync at {} (window of {} lines)",
                options.primary_repo,
                ts,
                window.size
            );
            return Ok(Lookup::Found(ts));
        }

        match planner.should_retry(attempt) {
            Some(next) => {
                tracing::trace!(
                    "No sync marker in last {} lines, retrying with {}",
                    window.size,
                    next.size
                );
                window = next;
                attempt += 1;
            }
            None => break,
        }
    }

    let exhausted = planner.exhausted();
    tracing::debug!("Last sync lookup gave up: {}", exhausted);
    Ok(Lookup::NotFound(exhausted))
}

fn sync_timestamp(line: &str, primary_repo: &str) -> Option<i64> {
    match LogEvent::parse(line) {
        LogEvent::SyncCompleted { ts, repo } if repo == primary_repo => Some(ts),
        _ => None,
    }
}
