//! World update records and the rules for accepting them

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Terminal classification of a world update run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateState {
    /// Every package merged and emerge exited successfully
    Complete,
    /// Keep-going run that restarted after failures and then finished
    Partial,
    /// Run that failed (or was interrupted) without restarting
    Incomplete,
    /// Keep-going run that restarted and then failed again
    Fragment,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateState::Complete => "complete",
            UpdateState::Partial => "partial",
            UpdateState::Incomplete => "incomplete",
            UpdateState::Fragment => "fragment",
        }
    }

    /// States reported even when incomplete runs are filtered out
    pub fn is_finished(&self) -> bool {
        matches!(self, UpdateState::Complete | UpdateState::Partial)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(UpdateState::Complete),
            "partial" => Ok(UpdateState::Partial),
            "incomplete" => Ok(UpdateState::Incomplete),
            "fragment" => Ok(UpdateState::Fragment),
            other => Err(format!("unknown world update state '{}'", other)),
        }
    }
}

/// One reconstructed world update run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// When `emerge ... @world` was invoked (epoch seconds)
    pub start: i64,
    /// When the run ended or was last seen making progress
    pub stop: i64,
    /// Packages the run intended to merge (first segment for restarted runs)
    pub total: u32,
    pub state: UpdateState,
    /// Failed packages; `None` only for complete runs
    pub failed: Option<String>,
}

impl UpdateRecord {
    /// Failure description with the `none` sentinel
    pub fn failed_display(&self) -> &str {
        self.failed.as_deref().unwrap_or("none")
    }

    pub fn duration_secs(&self) -> i64 {
        self.stop - self.start
    }
}

/// A package that failed to merge, with its position in its segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPackage {
    pub name: String,
    pub index: u32,
    pub total: u32,
}

impl fmt::Display for FailedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} of {})", self.name, self.index, self.total)
    }
}

/// Build the `failed` description of a record
pub(crate) fn describe_failures<'a, I>(packages: I, dropped: u32) -> String
where
    I: IntoIterator<Item = &'a FailedPackage>,
{
    let mut description = packages
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if dropped > 0 {
        if !description.is_empty() {
            description.push(' ');
        }
        description.push_str(&format!("(+{} dropped)", dropped));
    }
    description
}

// ─────────────────────────────────────────────────────────────────────────────
// Thresholds
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum progress a failed run needs before it is worth reporting.
///
/// Written as `"30%"` or `"5"` in configuration. A run that completed exactly
/// the threshold is still rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Threshold {
    /// Completed packages must exceed this percentage of the segment
    Percent(u32),
    /// Completed packages must exceed this count
    Count(u32),
}

impl Threshold {
    /// Whether `completed` packages out of `total` clear the threshold
    pub fn accepts(&self, completed: u32, total: u32) -> bool {
        match *self {
            Threshold::Percent(percent) => {
                u64::from(completed) * 100 > u64::from(total) * u64::from(percent)
            }
            Threshold::Count(count) => completed > count,
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Percent(30)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Percent(p) => write!(f, "{}%", p),
            Threshold::Count(c) => write!(f, "{}", c),
        }
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(percent) = s.strip_suffix('%') {
            let value: u32 = percent
                .trim()
                .parse()
                .map_err(|_| format!("invalid percentage threshold '{}'", s))?;
            if value > 100 {
                return Err(format!("percentage threshold '{}' exceeds 100%", s));
            }
            return Ok(Threshold::Percent(value));
        }
        s.parse()
            .map(Threshold::Count)
            .map_err(|_| format!("invalid threshold '{}' (expected e.g. \"30%\" or \"5\")", s))
    }
}

impl TryFrom<String> for Threshold {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Threshold> for String {
    fn from(value: Threshold) -> Self {
        value.to_string()
    }
}

/// Thresholds applied to failed runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Thresholds {
    pub incomplete: Threshold,
    pub fragment: Threshold,
}

// ─────────────────────────────────────────────────────────────────────────────
// Rejections
// ─────────────────────────────────────────────────────────────────────────────

/// Why a candidate record was not emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The run did not end after it started
    StopNotAfterStart { start: i64, stop: i64 },
    /// A required field was never observed
    MissingField(&'static str),
    /// A complete run still carried failure bookkeeping
    LeftoverBookkeeping,
    /// The failed run did too little to be worth reporting
    BelowThreshold {
        completed: u32,
        total: u32,
        threshold: Threshold,
    },
}

impl RejectReason {
    /// Policy rejections are expected; the rest point at odd log content
    pub fn is_policy(&self) -> bool {
        matches!(self, RejectReason::BelowThreshold { .. })
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::StopNotAfterStart { start, stop } => {
                write!(f, "stop {} is not after start {}", stop, start)
            }
            RejectReason::MissingField(field) => write!(f, "missing field '{}'", field),
            RejectReason::LeftoverBookkeeping => {
                write!(f, "complete run still carries failure bookkeeping")
            }
            RejectReason::BelowThreshold {
                completed,
                total,
                threshold,
            } => write!(
                f,
                "only {} of {} packages completed (threshold {})",
                completed, total, threshold
            ),
        }
    }
}

/// A candidate record that was dropped at finalize time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub state: UpdateState,
    pub start: Option<i64>,
    pub reason: RejectReason,
}

/// Output of one finalize step
pub type Finalized = Result<UpdateRecord, Rejection>;

/// Record under construction; validated exactly once by [`RecordDraft::finish`]
#[derive(Debug, Clone)]
pub(crate) struct RecordDraft {
    pub state: UpdateState,
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub total: Option<u32>,
    pub failed: Option<String>,
    /// Whether keep-going restart bookkeeping exists
    pub restarted: bool,
    /// (completed, segment total, threshold) for failed runs
    pub progress_check: Option<(u32, u32, Threshold)>,
}

impl RecordDraft {
    pub fn finish(self) -> Finalized {
        let reject = |reason| Rejection {
            state: self.state,
            start: self.start,
            reason,
        };

        let start = self.start.ok_or_else(|| reject(RejectReason::MissingField("start")))?;
        let stop = self.stop.ok_or_else(|| reject(RejectReason::MissingField("stop")))?;
        let total = self
            .total
            .filter(|&t| t > 0)
            .ok_or_else(|| reject(RejectReason::MissingField("total")))?;

        if stop <= start {
            return Err(reject(RejectReason::StopNotAfterStart { start, stop }));
        }

        match self.state {
            UpdateState::Complete if self.failed.is_some() || self.restarted => {
                return Err(reject(RejectReason::LeftoverBookkeeping));
            }
            UpdateState::Complete => {}
            _ if self.failed.is_none() => {
                return Err(reject(RejectReason::MissingField("failed")));
            }
            _ => {}
        }

        if let Some((completed, segment_total, threshold)) = self.progress_check {
            if !threshold.accepts(completed, segment_total) {
                return Err(reject(RejectReason::BelowThreshold {
                    completed,
                    total: segment_total,
                    threshold,
                }));
            }
        }

        Ok(UpdateRecord {
            start,
            stop,
            total,
            state: self.state,
            failed: self.failed,
        })
    }
}
