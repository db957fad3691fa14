//! PortageUpdateCoordinator - the daemon model
//!
//! Holds everything the handler reasons about: what the log last told us
//! about syncs and world updates, the scheduling state of our own sync and
//! pretend runs, and what the process table says is running elsewhere.
//! Every change to a persisted summary field goes through the [`StateStore`]
//! so that unchanged values never cause a write.

use pdemon_core::prelude::*;
use pdemon_core::{UpdateRecord, UpdateState};
use pdemon_daemon::{ActiveEmerges, PretendReport, SyncOutcome};

use crate::config::Settings;
use crate::scan::{ScanOutcome, ScanReport};
use crate::state_store::{StateKey, StateStore};

/// Scheduling knobs, lifted out of [`Settings`] once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub sync_enabled: bool,
    pub sync_interval_secs: i64,
    /// Delays after consecutive failures; the last one repeats
    pub retry_tiers_secs: Vec<i64>,
    pub pretend_enabled: bool,
    pub process_check_secs: i64,
}

impl SchedulePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            sync_enabled: settings.sync.enabled,
            sync_interval_secs: secs(settings.sync.interval_secs),
            retry_tiers_secs: settings.sync.retry_tiers_secs.iter().copied().map(secs).collect(),
            pretend_enabled: settings.pretend.enabled,
            process_check_secs: secs(settings.scheduler.process_check_secs),
        }
    }

    /// Delay before the next attempt after `errors` consecutive failures
    pub fn retry_delay(&self, errors: u32) -> i64 {
        let Some(last) = self.retry_tiers_secs.len().checked_sub(1) else {
            return self.sync_interval_secs;
        };
        let tier = (errors.saturating_sub(1) as usize).min(last);
        self.retry_tiers_secs[tier]
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

fn secs(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// State of our own sync runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Success,
    NetworkError,
    Failed,
    Cancelled,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Running => "running",
            SyncState::Success => "success",
            SyncState::NetworkError => "network-error",
            SyncState::Failed => "failed",
            SyncState::Cancelled => "cancelled",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            SyncState::Idle,
            SyncState::Running,
            SyncState::Success,
            SyncState::NetworkError,
            SyncState::Failed,
            SyncState::Cancelled,
        ]
        .into_iter()
        .find(|state| state.as_str() == name)
    }
}

impl From<SyncOutcome> for SyncState {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Success => SyncState::Success,
            SyncOutcome::NetworkError => SyncState::NetworkError,
            SyncOutcome::Failed { .. } => SyncState::Failed,
            SyncOutcome::Cancelled => SyncState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTracker {
    /// Timestamp of the newest sync seen in the log
    pub last: Option<i64>,
    /// Syncs observed since the state file was created
    pub count: i64,
    pub state: SyncState,
    /// Consecutive failures of our own runs
    pub errors: u32,
    pub next_retry_at: Option<i64>,
    /// One of our sync commands is in flight
    pub running: bool,
}

impl SyncTracker {
    /// When the next sync is due; `None` means right away
    pub fn next_due(&self, policy: &SchedulePolicy) -> Option<i64> {
        if let Some(retry) = self.next_retry_at {
            return Some(retry);
        }
        self.last
            .map(|last| last.saturating_add(policy.sync_interval_secs))
    }

    pub fn is_due(&self, policy: &SchedulePolicy, now: i64) -> bool {
        self.next_due(policy).map_or(true, |due| due <= now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldTracker {
    /// Last selected record, or the persisted summary before the first scan
    pub last: Option<UpdateRecord>,
    /// A world update is running somewhere on the system
    pub in_progress: bool,
}

/// State of our own pretend runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PretendState {
    #[default]
    Idle,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl PretendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PretendState::Idle => "idle",
            PretendState::Running => "running",
            PretendState::Done => "done",
            PretendState::Failed => "failed",
            PretendState::Cancelled => "cancelled",
        }
    }
}

/// How a pretend run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PretendResult {
    Report(PretendReport),
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PretendTracker {
    pub state: PretendState,
    pub pending: Option<u32>,
    pub portage_update: bool,
    /// A fresh pending count is wanted
    pub requested: bool,
    pub running: bool,
    pub last_run: Option<i64>,
}

/// What [`PortageUpdateCoordinator::on_tick`] wants started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    CheckProcesses,
    Sync,
    Pretend,
}

/// The daemon model
#[derive(Debug)]
pub struct PortageUpdateCoordinator {
    pub policy: SchedulePolicy,
    pub sync: SyncTracker,
    pub world: WorldTracker,
    pub pretend: PretendTracker,
    /// Last process table snapshot; excludes our own children
    pub active: ActiveEmerges,
    pub last_process_check: Option<i64>,
    /// A scan worker is in flight
    pub scan_running: bool,
    /// The log changed while a scan was in flight
    pub rescan_pending: bool,
    pub quitting: bool,
    store: StateStore,
}

impl PortageUpdateCoordinator {
    /// Build the model from the persisted summary.
    ///
    /// A pretend is requested up front when no pending count is known.
    pub fn new(policy: SchedulePolicy, store: StateStore) -> Self {
        let sync = SyncTracker {
            last: store.get_int(StateKey::SyncLast),
            count: store.get_int(StateKey::SyncCount).unwrap_or(0),
            state: store
                .get_text(StateKey::SyncState)
                .and_then(SyncState::from_name)
                .filter(|state| *state != SyncState::Running)
                .unwrap_or_default(),
            errors: store
                .get_int(StateKey::SyncErrors)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            next_retry_at: store.get_int(StateKey::SyncNext),
            running: false,
        };

        let world = WorldTracker {
            last: persisted_record(&store),
            in_progress: false,
        };

        let pending = store
            .get_int(StateKey::PendingPackages)
            .and_then(|n| u32::try_from(n).ok());
        let pretend = PretendTracker {
            pending,
            portage_update: store.get_bool(StateKey::PortageUpdate).unwrap_or(false),
            requested: pending.is_none(),
            ..Default::default()
        };

        Self {
            policy,
            sync,
            world,
            pretend,
            active: ActiveEmerges::default(),
            last_process_check: None,
            scan_running: false,
            rescan_pending: false,
            quitting: false,
            store,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Write changed summary fields to disk
    pub fn flush(&mut self) -> Result<bool> {
        self.store.flush()
    }

    pub fn should_quit(&self) -> bool {
        self.quitting
    }

    /// A sync or world update is running, ours or not
    pub fn portage_busy(&self) -> bool {
        self.sync.running || self.active.sync || self.active.world_update
    }

    // ─────────────────────────────────────────────────────────
    // Log scans
    // ─────────────────────────────────────────────────────────

    /// Merge a scan result; returns whether anything new was observed.
    ///
    /// `NotFound` and failures leave the known state alone.
    pub fn on_scan(&mut self, report: ScanReport) -> bool {
        let synced = match report.sync {
            ScanOutcome::Found(ts) => self.observe_sync(ts),
            ScanOutcome::NotFound => false,
            ScanOutcome::Failed(reason) => {
                warn!("Keeping last known sync, scan failed: {}", reason);
                false
            }
        };
        let updated = match report.world {
            ScanOutcome::Found(record) => self.observe_world_update(record),
            ScanOutcome::NotFound => false,
            ScanOutcome::Failed(reason) => {
                warn!("Keeping last known world update, scan failed: {}", reason);
                false
            }
        };

        if synced || updated {
            self.request_pretend();
        }
        synced || updated
    }

    fn observe_sync(&mut self, ts: i64) -> bool {
        if self.sync.last.is_some_and(|last| ts <= last) {
            return false;
        }
        info!("Observed sync at {}", pdemon_core::timestamp::format_local(Some(ts)));
        self.sync.last = Some(ts);
        self.sync.count += 1;
        // A sync in the log, ours or not, settles any retry backoff
        self.sync.errors = 0;
        self.sync.next_retry_at = None;

        self.store.set(StateKey::SyncLast, ts);
        self.store.set(StateKey::SyncCount, self.sync.count);
        self.store.set(StateKey::SyncErrors, 0i64);
        self.store.remove(StateKey::SyncNext);
        true
    }

    fn observe_world_update(&mut self, record: UpdateRecord) -> bool {
        if self.world.last.as_ref() == Some(&record) {
            return false;
        }
        info!(
            "Observed {} world update started {} ({} packages)",
            record.state,
            pdemon_core::timestamp::format_local(Some(record.start)),
            record.total
        );

        self.store.set(StateKey::WorldLastStart, record.start);
        self.store.set(StateKey::WorldLastStop, record.stop);
        self.store.set(StateKey::WorldLastState, record.state.as_str());
        self.store.set(StateKey::WorldLastTotal, record.total);
        self.store.set_opt(StateKey::WorldLastFailed, record.failed.clone());
        self.world.last = Some(record);
        true
    }

    // ─────────────────────────────────────────────────────────
    // Sync runs
    // ─────────────────────────────────────────────────────────

    pub fn sync_started(&mut self) {
        self.sync.running = true;
        self.sync.state = SyncState::Running;
        self.store.set(StateKey::SyncState, SyncState::Running.as_str());
    }

    /// Record how our sync ended. The sync timestamp itself comes from the
    /// next log scan.
    pub fn on_sync_finished(&mut self, outcome: SyncOutcome, now: i64) {
        self.sync.running = false;
        self.sync.state = outcome.into();

        match outcome {
            SyncOutcome::Success => {
                self.sync.errors = 0;
                // Holds until the log scan sees the sync; a repo name that
                // never matches must not turn into a sync loop
                self.sync.next_retry_at =
                    Some(now.saturating_add(self.policy.sync_interval_secs));
            }
            SyncOutcome::NetworkError | SyncOutcome::Failed { .. } => {
                self.sync.errors = self.sync.errors.saturating_add(1);
                let delay = self.policy.retry_delay(self.sync.errors);
                self.sync.next_retry_at = Some(now.saturating_add(delay));
                warn!(
                    "Sync {} ({} in a row), retrying in {}",
                    outcome.as_str(),
                    self.sync.errors,
                    pdemon_core::timestamp::format_duration(delay)
                );
            }
            // Shutdown or conflict; try again on the next due tick
            SyncOutcome::Cancelled => {}
        }

        self.store.set(StateKey::SyncState, self.sync.state.as_str());
        self.store.set(StateKey::SyncErrors, self.sync.errors);
        self.store.set_opt(StateKey::SyncNext, self.sync.next_retry_at);
    }

    // ─────────────────────────────────────────────────────────
    // Pretend runs
    // ─────────────────────────────────────────────────────────

    pub fn request_pretend(&mut self) {
        if self.policy.pretend_enabled && !self.pretend.requested {
            debug!("Pending package count requested");
            self.pretend.requested = true;
        }
    }

    pub fn pretend_started(&mut self, now: i64) {
        self.pretend.requested = false;
        self.pretend.running = true;
        self.pretend.state = PretendState::Running;
        self.pretend.last_run = Some(now);
    }

    pub fn on_pretend_finished(&mut self, result: PretendResult) {
        self.pretend.running = false;
        match result {
            PretendResult::Report(report) => {
                let pending = report.pending();
                info!(
                    "{} packages pending{}",
                    pending,
                    if report.portage_update { ", portage update available" } else { "" }
                );
                self.pretend.state = PretendState::Done;
                self.pretend.pending = Some(pending);
                self.pretend.portage_update = report.portage_update;
                self.store.set(StateKey::PendingPackages, pending);
                self.store.set(StateKey::PortageUpdate, report.portage_update);
            }
            PretendResult::Cancelled => {
                self.pretend.state = PretendState::Cancelled;
                // Rerun once whatever cancelled it is over
                self.request_pretend();
            }
            PretendResult::Failed(reason) => {
                warn!("Pretend run failed: {}", reason);
                self.pretend.state = PretendState::Failed;
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Process table
    // ─────────────────────────────────────────────────────────

    pub fn process_check_started(&mut self, now: i64) {
        self.last_process_check = Some(now);
    }

    /// Take a new process snapshot; returns true when an in-flight pretend
    /// must be cancelled.
    pub fn on_processes_checked(&mut self, active: ActiveEmerges) -> bool {
        if active.world_update != self.world.in_progress {
            if active.world_update {
                info!("World update in progress");
            } else {
                info!("World update no longer running");
            }
        }
        self.active = active;
        self.world.in_progress = active.world_update;

        active.world_update && self.pretend.running
    }

    // ─────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────

    /// Decide what, if anything, to start on this tick
    pub fn on_tick(&mut self, now: i64) -> Option<Due> {
        if self.quitting {
            return None;
        }

        let check_due = self
            .last_process_check
            .map_or(true, |last| now - last >= self.policy.process_check_secs);
        if check_due {
            return Some(Due::CheckProcesses);
        }

        if self.policy.sync_enabled
            && !self.portage_busy()
            && !self.pretend.running
            && self.sync.is_due(&self.policy, now)
        {
            return Some(Due::Sync);
        }

        if self.policy.pretend_enabled
            && self.pretend.requested
            && !self.pretend.running
            && !self.portage_busy()
        {
            return Some(Due::Pretend);
        }

        None
    }
}

/// The persisted world update summary, when every field survived
fn persisted_record(store: &StateStore) -> Option<UpdateRecord> {
    let state: UpdateState = store.get_text(StateKey::WorldLastState)?.parse().ok()?;
    Some(UpdateRecord {
        start: store.get_int(StateKey::WorldLastStart)?,
        stop: store.get_int(StateKey::WorldLastStop)?,
        total: u32::try_from(store.get_int(StateKey::WorldLastTotal)?).ok()?,
        state,
        failed: store.get_text(StateKey::WorldLastFailed).map(str::to_string),
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
