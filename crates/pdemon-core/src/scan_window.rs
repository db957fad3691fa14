//! Scan window planning.
//!
//! Lookups start with a small tail of the log and widen it geometrically until
//! the event is found or the whole log has been read. The sizes are fixed up
//! front so a lookup never scans the same window twice.

use std::fmt;
use std::path::Path;

use crate::line_source;

/// Window ceiling used when the log length cannot be determined
pub const DEFAULT_FALLBACK_MAX_LINES: usize = 60_000;

/// Default number of window sizes to plan
pub const DEFAULT_RETRY_STEPS: usize = 12;

/// Total length of the log, as far as we know it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLength {
    /// Line count of the file at planning time
    Known(usize),
    /// Counting failed; scans stop at `fallback` lines
    Unknown { fallback: usize },
}

impl LogLength {
    /// Count the lines of `path`, falling back to `fallback` on failure
    pub fn measure(path: &Path, fallback: usize) -> Self {
        match line_source::line_count(path) {
            Ok(count) => LogLength::Known(count),
            Err(e) => {
                tracing::warn!(
                    "Could not count lines of {}: {} (assuming up to {} lines)",
                    path.display(),
                    e,
                    fallback
                );
                LogLength::Unknown { fallback }
            }
        }
    }

    /// Upper bound for scan windows
    pub fn max_lines(&self) -> usize {
        match *self {
            LogLength::Known(n) => n,
            LogLength::Unknown { fallback } => fallback,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, LogLength::Known(_))
    }
}

/// The trailing slice of the log examined by one parsing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    /// Number of trailing lines requested
    pub size: usize,
    /// True when the window covers the whole (known) log
    pub is_final: bool,
}

/// Giveup diagnostic returned when every planned window came up empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    /// Number of windows scanned
    pub attempts: usize,
    /// Size of the last window scanned
    pub scanned_lines: usize,
    /// Whether `scanned_lines` was the real log length or the fallback cap
    pub log_length_known: bool,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.log_length_known {
            write!(
                f,
                "not found after {} attempt(s); scanned the whole log ({} lines)",
                self.attempts, self.scanned_lines
            )
        } else {
            write!(
                f,
                "not found after {} attempt(s); stopped at the fallback limit of {} lines (log length unknown)",
                self.attempts, self.scanned_lines
            )
        }
    }
}

/// Outcome of a log lookup that did not fail on I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound(Exhausted),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Precomputed, strictly increasing sequence of scan window sizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWindowPlanner {
    sizes: Vec<usize>,
    length: LogLength,
}

impl ScanWindowPlanner {
    /// Plan `steps` window sizes from `initial_lines` up to the log length.
    pub fn new(initial_lines: usize, length: LogLength, steps: usize) -> Self {
        let max = length.max_lines();
        let initial = initial_lines.max(1);
        let steps = steps.max(1);

        let mut sizes = Vec::with_capacity(steps);
        if initial < max && steps > 1 {
            let ratio = max as f64 / initial as f64;
            for i in 0..steps {
                let exponent = i as f64 / (steps - 1) as f64;
                let size = (initial as f64 * ratio.powf(exponent)).round() as usize;
                sizes.push(size.clamp(initial, max));
            }
        }
        // Float rounding must not lose the full-log window.
        sizes.push(max);
        sizes.dedup();

        Self { sizes, length }
    }

    /// The window of the first attempt
    pub fn first(&self) -> ScanWindow {
        self.window(0)
    }

    /// The window to try after attempt `attempt` came up empty, if any.
    pub fn should_retry(&self, attempt: usize) -> Option<ScanWindow> {
        let next = attempt + 1;
        (next < self.sizes.len()).then(|| self.window(next))
    }

    /// All planned windows, smallest first
    pub fn windows(&self) -> impl Iterator<Item = ScanWindow> + '_ {
        (0..self.sizes.len()).map(|i| self.window(i))
    }

    /// Window sizes, smallest first
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Giveup diagnostic after every window was scanned
    pub fn exhausted(&self) -> Exhausted {
        Exhausted {
            attempts: self.sizes.len(),
            scanned_lines: self.length.max_lines(),
            log_length_known: self.length.is_known(),
        }
    }

    fn window(&self, index: usize) -> ScanWindow {
        let size = self.sizes[index];
        ScanWindow {
            size,
            is_final: self.length.is_known() && size >= self.length.max_lines(),
        }
    }
}
