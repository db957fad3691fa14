//! Message types for the daemon (TEA pattern)

use pdemon_daemon::{ActiveEmerges, SyncOutcome};

use crate::coordinator::PretendResult;
use crate::scan::ScanReport;
use crate::signals::DaemonSignal;

/// Everything the engine feeds into [`crate::handler::update`]
#[derive(Debug, Clone)]
pub enum Message {
    /// Scheduler tick (about once a second)
    Tick,

    /// The watcher saw emerge.log change
    LogChanged,

    /// A log scan finished
    LogScanned(ScanReport),

    /// Our sync command finished or was cancelled
    SyncFinished(SyncOutcome),

    /// Our pretend command finished or was cancelled
    PretendFinished(PretendResult),

    /// The process table was checked
    ProcessesChecked(ActiveEmerges),

    /// The log watcher reported an error
    WatcherError { message: String },

    /// A stop signal arrived
    Shutdown { signal: DaemonSignal },

    /// Shut down
    Quit,
}
