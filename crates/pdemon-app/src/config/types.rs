//! Configuration types for Portage Demon
//!
//! Defines `Settings` (`/etc/pdemon/config.toml`) and its sections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use pdemon_core::prelude::*;
use pdemon_core::scan_window::{DEFAULT_FALLBACK_MAX_LINES, DEFAULT_RETRY_STEPS};
use pdemon_core::{SyncScanOptions, Threshold, WorldUpdateOptions};
use pdemon_daemon::{CommandKind, EmergeCommand};

/// Default emerge log location
pub const DEFAULT_EMERGE_LOG: &str = "/var/log/emerge.log";

/// Default persisted state location
pub const DEFAULT_STATE_FILE: &str = "/var/lib/pdemon/state.toml";

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub world: WorldSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub pretend: PretendSettings,

    #[serde(default)]
    pub watcher: WatcherSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub state: StateSettings,
}

/// Where and how to read emerge.log
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogSettings {
    /// Path to emerge.log
    #[serde(default = "default_emerge_log")]
    pub path: PathBuf,

    /// Repository whose sync counts as "the" sync
    #[serde(default = "default_primary_repo")]
    pub primary_repo: String,

    /// First scan window for the sync lookup
    #[serde(default = "default_sync_lastlines")]
    pub sync_lastlines: usize,

    /// First scan window for the world update lookup
    #[serde(default = "default_world_lastlines")]
    pub world_lastlines: usize,

    /// Number of window sizes tried before giving up
    #[serde(default = "default_retry_steps")]
    pub retry_steps: usize,

    /// Largest window when the log length is unknown
    #[serde(default = "default_fallback_max_lines")]
    pub fallback_max_lines: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            path: default_emerge_log(),
            primary_repo: default_primary_repo(),
            sync_lastlines: default_sync_lastlines(),
            world_lastlines: default_world_lastlines(),
            retry_steps: default_retry_steps(),
            fallback_max_lines: default_fallback_max_lines(),
        }
    }
}

/// World update reporting policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorldSettings {
    /// Report incomplete and fragment runs
    #[serde(default = "default_true")]
    pub include_incomplete: bool,

    /// `"30%"` or a fixed package count such as `"5"`
    #[serde(default)]
    pub incomplete_threshold: Threshold,

    #[serde(default)]
    pub fragment_threshold: Threshold,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            include_incomplete: true,
            incomplete_threshold: Threshold::default(),
            fragment_threshold: Threshold::default(),
        }
    }
}

/// Periodic repository sync
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between successful syncs
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    /// Delays after consecutive failures; the last one repeats
    #[serde(default = "default_retry_tiers")]
    pub retry_tiers_secs: Vec<u64>,

    /// Command line; empty = `emerge --sync`
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sync_interval(),
            retry_tiers_secs: default_retry_tiers(),
            command: Vec::new(),
        }
    }
}

/// Pending package dry runs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PretendSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command line; empty = `emerge --pretend --verbose --update --deep --newuse --with-bdeps=y @world`
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for PretendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: Vec::new(),
        }
    }
}

/// Log file watcher settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WatcherSettings {
    /// Debounce duration in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Scheduler loop settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchedulerSettings {
    /// Tick period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Seconds between process table checks
    #[serde(default = "default_process_check_secs")]
    pub process_check_secs: u64,

    /// Upper bound on waiting for workers at shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            process_check_secs: default_process_check_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Persisted state location
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateSettings {
    #[serde(default = "default_state_file")]
    pub path: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            path: default_state_file(),
        }
    }
}

impl Settings {
    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_ms == 0 {
            return Err(Error::config_invalid("scheduler.tick_ms must be positive"));
        }
        if self.sync.enabled && self.sync.interval_secs == 0 {
            return Err(Error::config_invalid("sync.interval_secs must be positive"));
        }
        if self.sync.enabled && self.sync.retry_tiers_secs.is_empty() {
            return Err(Error::config_invalid(
                "sync.retry_tiers_secs needs at least one delay",
            ));
        }
        if self.log.primary_repo.trim().is_empty() {
            return Err(Error::config_invalid("log.primary_repo must not be empty"));
        }
        Ok(())
    }

    pub fn sync_scan_options(&self) -> SyncScanOptions {
        SyncScanOptions {
            primary_repo: self.log.primary_repo.clone(),
            initial_lines: self.log.sync_lastlines,
            retry_steps: self.log.retry_steps,
            fallback_max_lines: self.log.fallback_max_lines,
        }
    }

    pub fn world_update_options(&self) -> WorldUpdateOptions {
        WorldUpdateOptions {
            lastlines: self.log.world_lastlines,
            include_incomplete: self.world.include_incomplete,
            incomplete_threshold: self.world.incomplete_threshold,
            fragment_threshold: self.world.fragment_threshold,
            retry_steps: self.log.retry_steps,
            fallback_max_lines: self.log.fallback_max_lines,
        }
    }

    pub fn sync_command(&self) -> EmergeCommand {
        EmergeCommand::new(CommandKind::Sync, self.sync.command.clone())
    }

    pub fn pretend_command(&self) -> EmergeCommand {
        EmergeCommand::new(CommandKind::Pretend, self.pretend.command.clone())
    }
}

fn default_true() -> bool {
    true
}

fn default_emerge_log() -> PathBuf {
    PathBuf::from(DEFAULT_EMERGE_LOG)
}

fn default_primary_repo() -> String {
    "gentoo".to_string()
}

fn default_sync_lastlines() -> usize {
    500
}

fn default_world_lastlines() -> usize {
    1_000
}

fn default_retry_steps() -> usize {
    DEFAULT_RETRY_STEPS
}

fn default_fallback_max_lines() -> usize {
    DEFAULT_FALLBACK_MAX_LINES
}

fn default_sync_interval() -> u64 {
    86_400
}

fn default_retry_tiers() -> Vec<u64> {
    vec![600, 3_600, 7_200]
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_process_check_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}
