//! One pass over emerge.log: last sync and last world update

use std::path::Path;

use pdemon_core::prelude::*;
use pdemon_core::{
    last_sync_timestamp, last_world_update, Lookup, SyncScanOptions, UpdateRecord,
    WorldUpdateOptions,
};

/// Result of one lookup, reduced to what the coordinator acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome<T> {
    Found(T),
    /// Nothing in the log; keep the last known value
    NotFound,
    /// The log could not be read; keep the last known value
    Failed(String),
}

impl<T> ScanOutcome<T> {
    fn from_result(result: Result<Lookup<T>>) -> Self {
        match result {
            Ok(Lookup::Found(value)) => ScanOutcome::Found(value),
            Ok(Lookup::NotFound(exhausted)) => {
                debug!("Lookup came up empty: {}", exhausted);
                ScanOutcome::NotFound
            }
            Err(e) => ScanOutcome::Failed(e.to_string()),
        }
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            ScanOutcome::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Message payload of a finished scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub sync: ScanOutcome<i64>,
    pub world: ScanOutcome<UpdateRecord>,
}

/// Raw lookup results, before errors are flattened to strings
#[derive(Debug)]
pub struct LogScan {
    pub sync: Result<Lookup<i64>>,
    pub world: Result<Lookup<UpdateRecord>>,
}

impl LogScan {
    /// Run both lookups against `path`. Blocking.
    pub fn run(path: &Path, sync: &SyncScanOptions, world: &WorldUpdateOptions) -> Self {
        let scan = Self {
            sync: last_sync_timestamp(path, sync),
            world: last_world_update(path, world),
        };
        if let Err(e) = &scan.sync {
            warn!("Sync lookup failed: {}", e);
        }
        if let Err(e) = &scan.world {
            warn!("World update lookup failed: {}", e);
        }
        scan
    }

    /// Fail on a permission error; other failures stay in the scan.
    /// Only startup treats this as fatal.
    pub fn check_access(self) -> Result<Self> {
        let sync = match self.sync {
            Err(e) if e.is_permission_denied() => return Err(e),
            other => other,
        };
        let world = match self.world {
            Err(e) if e.is_permission_denied() => return Err(e),
            other => other,
        };
        Ok(Self { sync, world })
    }

    pub fn into_report(self) -> ScanReport {
        ScanReport {
            sync: ScanOutcome::from_result(self.sync),
            world: ScanOutcome::from_result(self.world),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn log(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_scan_finds_both() {
        let file = log(&[
            "900: === Sync completed for gentoo",
            "1000:  *** emerge --update --deep @world",
            "1005:  >>> emerge (1 of 1) dev-libs/foo-1 to /",
            "1010:  ::: completed emerge (1 of 1) dev-libs/foo-1 to /",
            "1011:  *** exiting successfully.",
        ]);
        let report = LogScan::run(
            file.path(),
            &SyncScanOptions::default(),
            &WorldUpdateOptions::default(),
        )
        .into_report();

        assert_eq!(report.sync, ScanOutcome::Found(900));
        let world = report.world.found().unwrap();
        assert_eq!(world.start, 1000);
        assert_eq!(world.stop, 1011);
    }

    #[test]
    fn test_scan_of_empty_log_is_not_found() {
        let file = log(&[]);
        let report = LogScan::run(
            file.path(),
            &SyncScanOptions::default(),
            &WorldUpdateOptions::default(),
        )
        .into_report();
        assert_eq!(report.sync, ScanOutcome::NotFound);
        assert_eq!(report.world, ScanOutcome::NotFound);
    }

    #[test]
    fn test_missing_log_fails_without_permission_error() {
        let scan = LogScan::run(
            Path::new("/nonexistent/emerge.log"),
            &SyncScanOptions::default(),
            &WorldUpdateOptions::default(),
        );
        let report = scan.check_access().unwrap().into_report();
        assert!(matches!(report.sync, ScanOutcome::Failed(_)));
        assert!(matches!(report.world, ScanOutcome::Failed(_)));
    }
}
