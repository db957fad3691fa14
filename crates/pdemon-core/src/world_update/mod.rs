//! Last world update lookup.
//!
//! Each scan window is parsed from scratch by the state machine in
//! [`machine`]. The newest eligible record of the first window that has one
//! wins; wider windows are only read when a narrower one came up empty.

pub mod machine;
pub mod record;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::line_source;
use crate::scan_window::{
    LogLength, Lookup, ScanWindowPlanner, DEFAULT_FALLBACK_MAX_LINES, DEFAULT_RETRY_STEPS,
};

pub use machine::{ParsedWindow, ScanState, WorldUpdateScanner};
pub use record::{
    FailedPackage, RejectReason, Rejection, Threshold, Thresholds, UpdateRecord, UpdateState,
};

/// Options for [`last_world_update`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldUpdateOptions {
    /// Size of the first scan window
    pub lastlines: usize,
    /// Report incomplete and fragment runs too
    pub include_incomplete: bool,
    /// Minimum progress of an incomplete run
    pub incomplete_threshold: Threshold,
    /// Minimum progress of the failing segment of a fragment run
    pub fragment_threshold: Threshold,
    /// Number of window sizes to try
    pub retry_steps: usize,
    /// Window ceiling when the log length is unknown
    pub fallback_max_lines: usize,
}

impl Default for WorldUpdateOptions {
    fn default() -> Self {
        Self {
            lastlines: 1_000,
            include_incomplete: true,
            incomplete_threshold: Threshold::default(),
            fragment_threshold: Threshold::default(),
            retry_steps: DEFAULT_RETRY_STEPS,
            fallback_max_lines: DEFAULT_FALLBACK_MAX_LINES,
        }
    }
}

impl WorldUpdateOptions {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            incomplete: self.incomplete_threshold,
            fragment: self.fragment_threshold,
        }
    }
}

/// Most recent world update recorded in the log at `path`.
///
/// An error is returned only when the log cannot be read; a log without any
/// eligible run gives `Lookup::NotFound` with the giveup diagnostic.
pub fn last_world_update(
    path: &Path,
    options: &WorldUpdateOptions,
) -> Result<Lookup<UpdateRecord>> {
    let length = LogLength::measure(path, options.fallback_max_lines);
    let planner = ScanWindowPlanner::new(options.lastlines, length, options.retry_steps);
    let scanner = WorldUpdateScanner::new(options.thresholds());

    let mut window = planner.first();
    let mut attempt = 0;
    loop {
        let parsed = scanner.scan_lines(line_source::tail(path, window.size)?)?;
        if let Some(record) = select_latest(&parsed, options.include_incomplete) {
            tracing::debug!(
                "Last world update: {} started {} ({} records in last {} lines)",
                record.state,
                record.start,
                parsed.records.len(),
                window.size
            );
            return Ok(Lookup::Found(record.clone()));
        }

        match planner.should_retry(attempt) {
            Some(next) => {
                tracing::trace!(
                    "No eligible world update in last {} lines, retrying with {}",
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
    tracing::debug!("Last world update lookup gave up: {}", exhausted);
    Ok(Lookup::NotFound(exhausted))
}

/// The eligible record with the greatest start time.
///
/// Ties go to the record that appears later in the log.
pub fn select_latest(parsed: &ParsedWindow, include_incomplete: bool) -> Option<&UpdateRecord> {
    parsed
        .eligible(include_incomplete)
        .fold(None, |best: Option<&UpdateRecord>, record| match best {
            Some(current) if current.start > record.start => Some(current),
            _ => Some(record),
        })
}
