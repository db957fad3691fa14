//! One-shot `scan` and `status` reports

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use pdemon_app::scan::LogScan;
use pdemon_app::status::STATUS_KEYS;
use pdemon_app::{Settings, StateStore, StatusSnapshot};
use pdemon_core::prelude::*;
use pdemon_core::timestamp::{format_duration, format_local, to_utc};
use pdemon_core::{Lookup, UpdateRecord};

/// What `pdemon scan` found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub log: PathBuf,
    /// Epoch seconds of the last sync of the primary repository
    pub last_sync: Option<i64>,
    pub last_world_update: Option<UpdateRecord>,
}

impl ScanSummary {
    /// Scan `log` with the lookups configured in `settings`.
    /// Unreadable logs are errors; an empty result is not.
    pub fn collect(settings: &Settings, log: &Path) -> Result<Self> {
        let scan = LogScan::run(
            log,
            &settings.sync_scan_options(),
            &settings.world_update_options(),
        );
        Ok(Self {
            log: log.to_path_buf(),
            last_sync: found(scan.sync?),
            last_world_update: found(scan.world?),
        })
    }

    pub fn write_text(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "Log:               {}", self.log.display())?;
        writeln!(out, "Last sync:         {}", describe_ts(self.last_sync))?;

        let Some(record) = &self.last_world_update else {
            return writeln!(out, "Last world update: none");
        };
        writeln!(out, "Last world update: {}", record.state)?;
        writeln!(out, "  started:         {}", describe_ts(Some(record.start)))?;
        writeln!(out, "  stopped:         {}", describe_ts(Some(record.stop)))?;
        writeln!(out, "  duration:        {}", format_duration(record.duration_secs()))?;
        writeln!(out, "  packages:        {}", record.total)?;
        writeln!(out, "  failed:          {}", record.failed_display())
    }

    pub fn write_json(&self, out: &mut impl Write) -> Result<()> {
        let json = serde_json::json!({
            "log": self.log,
            "last_sync": self.last_sync,
            "last_sync_utc": self.last_sync.and_then(to_utc),
            "last_world_update": self.last_world_update,
        });
        serde_json::to_writer_pretty(&mut *out, &json)?;
        writeln!(out)?;
        Ok(())
    }
}

fn found<T>(lookup: Lookup<T>) -> Option<T> {
    match lookup {
        Lookup::Found(value) => Some(value),
        Lookup::NotFound(exhausted) => {
            debug!("{}", exhausted);
            None
        }
    }
}

fn describe_ts(ts: Option<i64>) -> String {
    match ts {
        Some(ts) => format!("{} ({})", format_local(Some(ts)), ts),
        None => format_local(None),
    }
}

/// `pdemon scan`
pub fn run_scan(settings: &Settings, log: Option<&Path>, json: bool) -> Result<()> {
    let log = log.unwrap_or(&settings.log.path);
    let summary = ScanSummary::collect(settings, log)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        summary.write_json(&mut out)
    } else {
        summary.write_text(&mut out).map_err(Error::from)
    }
}

/// Persisted status as `key = value` lines, in surface order
pub fn write_status(store: &StateStore, out: &mut impl Write) -> std::io::Result<()> {
    let snapshot = StatusSnapshot::from_store(store);
    for key in STATUS_KEYS {
        writeln!(out, "{} = {}", key, snapshot.get(key).unwrap_or("none"))?;
    }
    Ok(())
}

/// `pdemon status`
pub fn run_status(settings: &Settings) -> Result<()> {
    let store = StateStore::open(&settings.state.path).with_context(|| {
        format!("Failed to open state file {}", settings.state.path.display())
    })?;
    let stdout = std::io::stdout();
    write_status(&store, &mut stdout.lock())?;
    Ok(())
}
