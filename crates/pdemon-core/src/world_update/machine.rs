//! World update state machine.
//!
//! [`step`] is a pure transition function from the current [`ScanState`] and
//! one classified log line to the next state plus at most one finalized
//! record. [`WorldUpdateScanner`] drives it over a scan window.
//!
//! ```text
//!            WorldStart                 (1 of N)
//!   Idle ───────────────▶ Awaiting ───────────────▶ Running ◀──────────┐
//!    ▲                       │ other line              │  │             │
//!    └───────────────────────┘                          │  │ failure     │ (1 of M)
//!                                      (N of N) done   │  ▼ keep-going  │
//!                               Completing ◀───────────┘  FailurePending ┘
//! ```
//!
//! Interleaved output of a second emerge process is not recognised; lines of
//! a parallel merge that happen to match the current package position can
//! confuse the classification.

use crate::error::Result;
use crate::line_source::LogLine;
use crate::patterns::LogEvent;

use super::record::{
    describe_failures, FailedPackage, Finalized, RecordDraft, Rejection, Thresholds,
    UpdateRecord, UpdateState,
};

// ─────────────────────────────────────────────────────────────────────────────
// States
// ─────────────────────────────────────────────────────────────────────────────

/// A world invocation waiting for its first package line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStart {
    start: i64,
    keep_going: bool,
}

/// Bookkeeping carried across keep-going restarts
#[derive(Debug, Clone, PartialEq, Eq)]
struct SavedSegments {
    /// Package total announced by the first segment
    original_total: u32,
    /// Packages completed in earlier segments
    completed: u32,
    /// Packages that failed, oldest first
    failures: Vec<FailedPackage>,
    /// Packages silently skipped between segments
    dropped: u32,
}

/// A run that has announced its first package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProgress {
    start: i64,
    keep_going: bool,
    /// Position of the current package within the segment (1-based)
    index: u32,
    /// Package total of the current segment
    total: u32,
    /// Current package
    name: String,
    /// Timestamp of the last package boundary seen
    last_boundary: i64,
    /// Present once the run restarted at least once
    saved: Option<SavedSegments>,
}

/// Where a keep-going run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePoint {
    ts: i64,
    package: FailedPackage,
}

/// Scanner state between two lines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Not inside a world update run
    #[default]
    Idle,
    /// World invocation seen; the next line must announce package 1
    AwaitingFirstPackage(RunStart),
    /// Merging packages
    Running(RunProgress),
    /// A keep-going run failed; the next line decides restart or end
    FailurePending(RunProgress, FailurePoint),
    /// Last package merged; waiting for the exit line
    Completing(RunProgress),
}

impl ScanState {
    /// Short name, for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::AwaitingFirstPackage(_) => "awaiting-first-package",
            ScanState::Running(_) => "running",
            ScanState::FailurePending(..) => "failure-pending",
            ScanState::Completing(_) => "completing",
        }
    }
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: ScanState,
    pub emitted: Option<Finalized>,
}

impl Step {
    fn to(next: ScanState) -> Self {
        Self {
            next,
            emitted: None,
        }
    }

    fn emit(next: ScanState, finalized: Finalized) -> Self {
        Self {
            next,
            emitted: Some(finalized),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transitions
// ─────────────────────────────────────────────────────────────────────────────

/// Advance the state machine by one line
pub fn step(state: ScanState, event: &LogEvent<'_>, thresholds: &Thresholds) -> Step {
    match state {
        ScanState::Idle => Step::to(from_idle(event)),
        ScanState::AwaitingFirstPackage(run) => Step::to(from_awaiting(run, event)),
        ScanState::Running(progress) => from_running(progress, event, thresholds),
        ScanState::FailurePending(progress, failure) => {
            from_failure_pending(progress, failure, event, thresholds)
        }
        ScanState::Completing(progress) => from_completing(progress, event, thresholds),
    }
}

fn from_idle(event: &LogEvent<'_>) -> ScanState {
    match *event {
        LogEvent::WorldStart { ts, keep_going } => ScanState::AwaitingFirstPackage(RunStart {
            start: ts,
            keep_going,
        }),
        _ => ScanState::Idle,
    }
}

fn from_awaiting(run: RunStart, event: &LogEvent<'_>) -> ScanState {
    match *event {
        LogEvent::PackageStart {
            ts,
            index: 1,
            total,
            name,
        } if total > 0 => ScanState::Running(RunProgress {
            start: run.start,
            keep_going: run.keep_going,
            index: 1,
            total,
            name: name.to_string(),
            last_boundary: ts,
            saved: None,
        }),
        // Nothing to merge, aborted at the prompt, or a new invocation
        _ => from_idle(event),
    }
}

fn from_running(mut progress: RunProgress, event: &LogEvent<'_>, thresholds: &Thresholds) -> Step {
    match *event {
        LogEvent::PackageStart {
            index, total, name, ..
        } if index == progress.index && total == progress.total => {
            progress.name = name.to_string();
            Step::to(ScanState::Running(progress))
        }
        LogEvent::PackageComplete { ts, index, total, .. }
            if index == progress.index && total == progress.total =>
        {
            progress.last_boundary = ts;
            if progress.index == progress.total {
                Step::to(ScanState::Completing(progress))
            } else {
                progress.index += 1;
                Step::to(ScanState::Running(progress))
            }
        }
        LogEvent::ExitFailure { ts, .. } => {
            if progress.keep_going {
                let failure = FailurePoint {
                    ts,
                    package: progress.current_package(),
                };
                Step::to(ScanState::FailurePending(progress, failure))
            } else {
                let completed = progress.index - 1;
                Step::emit(
                    ScanState::Idle,
                    save_incomplete(&progress, ts, completed, thresholds),
                )
            }
        }
        LogEvent::WorldStart { .. } => {
            let completed = progress.index - 1;
            interrupted(progress, completed, event, thresholds)
        }
        _ => Step::to(ScanState::Running(progress)),
    }
}

fn from_failure_pending(
    mut progress: RunProgress,
    failure: FailurePoint,
    event: &LogEvent<'_>,
    thresholds: &Thresholds,
) -> Step {
    if let LogEvent::PackageStart {
        ts,
        index: 1,
        total,
        name,
    } = *event
    {
        if total > 0 {
            progress.restart(failure.package, ts, total, name);
            return Step::to(ScanState::Running(progress));
        }
    }

    let completed = progress.index - 1;
    let finalized = if progress.saved.is_some() {
        save_fragment(&progress, &failure, completed, thresholds)
    } else {
        save_incomplete(&progress, failure.ts, completed, thresholds)
    };
    // The line that ended the run may itself start the next one.
    Step::emit(from_idle(event), finalized)
}

fn from_completing(progress: RunProgress, event: &LogEvent<'_>, thresholds: &Thresholds) -> Step {
    match *event {
        LogEvent::ExitSuccess { ts } => {
            let finalized = if progress.saved.is_some() {
                save_partial(&progress, ts)
            } else {
                save_complete(&progress, ts)
            };
            Step::emit(ScanState::Idle, finalized)
        }
        LogEvent::ExitFailure { ts, .. } => {
            let finalized = if progress.saved.is_some() {
                save_partial(&progress, ts)
            } else {
                save_incomplete(&progress, ts, progress.total, thresholds)
            };
            Step::emit(ScanState::Idle, finalized)
        }
        LogEvent::WorldStart { .. } => {
            let completed = progress.total;
            interrupted(progress, completed, event, thresholds)
        }
        _ => Step::to(ScanState::Completing(progress)),
    }
}

/// A new world invocation arrived while a run was still open
fn interrupted(
    progress: RunProgress,
    completed: u32,
    event: &LogEvent<'_>,
    thresholds: &Thresholds,
) -> Step {
    let stop = progress.last_boundary;
    let finalized = if progress.saved.is_some() {
        save_partial(&progress, stop)
    } else {
        save_incomplete(&progress, stop, completed, thresholds)
    };
    Step::emit(from_idle(event), finalized)
}

impl RunProgress {
    fn current_package(&self) -> FailedPackage {
        FailedPackage {
            name: self.name.clone(),
            index: self.index,
            total: self.total,
        }
    }

    /// Start a new keep-going segment of `total` packages
    fn restart(&mut self, failed: FailedPackage, ts: i64, total: u32, name: &str) {
        let completed_in_segment = self.index - 1;
        let mut saved = self.saved.take().unwrap_or_else(|| SavedSegments {
            original_total: self.total,
            completed: 0,
            failures: Vec::new(),
            dropped: 0,
        });

        saved.completed += completed_in_segment;
        saved.failures.push(failed);
        let accounted = u64::from(saved.completed)
            + saved.failures.len() as u64
            + u64::from(total);
        saved.dropped = u64::from(saved.original_total)
            .saturating_sub(accounted)
            .try_into()
            .unwrap_or(u32::MAX);

        tracing::trace!(
            "keep-going restart: {} completed, {} failed, {} dropped, {} remaining",
            saved.completed,
            saved.failures.len(),
            saved.dropped,
            total
        );

        self.index = 1;
        self.total = total;
        self.name = name.to_string();
        self.last_boundary = ts;
        self.saved = Some(saved);
    }

    fn original_total(&self) -> u32 {
        self.saved
            .as_ref()
            .map_or(self.total, |saved| saved.original_total)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Finalize
// ─────────────────────────────────────────────────────────────────────────────

fn save_complete(progress: &RunProgress, stop: i64) -> Finalized {
    RecordDraft {
        state: UpdateState::Complete,
        start: Some(progress.start),
        stop: Some(stop),
        total: Some(progress.total),
        failed: None,
        restarted: progress.saved.is_some(),
        progress_check: None,
    }
    .finish()
}

fn save_partial(progress: &RunProgress, stop: i64) -> Finalized {
    let failed = progress
        .saved
        .as_ref()
        .map(|saved| describe_failures(&saved.failures, saved.dropped));

    RecordDraft {
        state: UpdateState::Partial,
        start: Some(progress.start),
        stop: Some(stop),
        total: Some(progress.original_total()),
        failed,
        restarted: true,
        progress_check: None,
    }
    .finish()
}

fn save_incomplete(
    progress: &RunProgress,
    stop: i64,
    completed: u32,
    thresholds: &Thresholds,
) -> Finalized {
    RecordDraft {
        state: UpdateState::Incomplete,
        start: Some(progress.start),
        stop: Some(stop),
        total: Some(progress.total),
        failed: Some(progress.current_package().to_string()),
        restarted: false,
        progress_check: Some((completed, progress.total, thresholds.incomplete)),
    }
    .finish()
}

fn save_fragment(
    progress: &RunProgress,
    failure: &FailurePoint,
    completed: u32,
    thresholds: &Thresholds,
) -> Finalized {
    let failed = progress.saved.as_ref().map(|saved| {
        describe_failures(
            std::iter::once(&failure.package).chain(saved.failures.iter()),
            saved.dropped,
        )
    });

    RecordDraft {
        state: UpdateState::Fragment,
        start: Some(progress.start),
        stop: Some(failure.ts),
        total: Some(progress.original_total()),
        failed,
        restarted: true,
        progress_check: Some((completed, progress.total, thresholds.fragment)),
    }
    .finish()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanner
// ─────────────────────────────────────────────────────────────────────────────

/// Records found in one scan window, in log order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedWindow {
    pub records: Vec<UpdateRecord>,
    pub rejected: Vec<Rejection>,
}

impl ParsedWindow {
    fn push(&mut self, finalized: Finalized) {
        match finalized {
            Ok(record) => {
                tracing::trace!(
                    "World update {} from {} to {} ({} packages)",
                    record.state,
                    record.start,
                    record.stop,
                    record.total
                );
                self.records.push(record);
            }
            Err(rejection) => {
                if rejection.reason.is_policy() {
                    tracing::debug!(
                        "Ignoring {} world update started at {:?}: {}",
                        rejection.state,
                        rejection.start,
                        rejection.reason
                    );
                } else {
                    tracing::warn!(
                        "Dropping malformed {} world update started at {:?}: {}",
                        rejection.state,
                        rejection.start,
                        rejection.reason
                    );
                }
                self.rejected.push(rejection);
            }
        }
    }

    /// Records of one state
    pub fn of_state(&self, state: UpdateState) -> impl Iterator<Item = &UpdateRecord> {
        self.records.iter().filter(move |r| r.state == state)
    }

    /// Records eligible for reporting
    pub fn eligible(&self, include_incomplete: bool) -> impl Iterator<Item = &UpdateRecord> {
        self.records
            .iter()
            .filter(move |r| include_incomplete || r.state.is_finished())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Runs the state machine over a window of lines
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldUpdateScanner {
    thresholds: Thresholds,
}

impl WorldUpdateScanner {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Scan already-loaded lines
    pub fn scan<'a, I>(&self, lines: I) -> ParsedWindow
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parsed = ParsedWindow::default();
        let mut state = ScanState::Idle;
        for line in lines {
            state = self.feed(state, line, &mut parsed);
        }
        self.finish(&state);
        parsed
    }

    /// Scan a streamed tail window, stopping at the first read error
    pub fn scan_lines<I>(&self, lines: I) -> Result<ParsedWindow>
    where
        I: IntoIterator<Item = Result<LogLine>>,
    {
        let mut parsed = ParsedWindow::default();
        let mut state = ScanState::Idle;
        for line in lines {
            let line = line?;
            state = self.feed(state, &line.text, &mut parsed);
        }
        self.finish(&state);
        Ok(parsed)
    }

    fn feed(&self, state: ScanState, line: &str, parsed: &mut ParsedWindow) -> ScanState {
        let event = LogEvent::parse(line);
        let step = step(state, &event, &self.thresholds);
        if let Some(finalized) = step.emitted {
            parsed.push(finalized);
        }
        step.next
    }

    fn finish(&self, state: &ScanState) {
        if !matches!(state, ScanState::Idle) {
            tracing::trace!("Scan window ended with an open run ({})", state.name());
        }
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
