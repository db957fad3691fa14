//! Detection of emerge runs started outside the daemon

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Kind of Portage activity a process performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmergeKind {
    Sync,
    WorldUpdate,
    Pretend,
}

impl fmt::Display for EmergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmergeKind::Sync => "sync",
            EmergeKind::WorldUpdate => "world update",
            EmergeKind::Pretend => "pretend",
        })
    }
}

/// Snapshot of running Portage activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEmerges {
    pub sync: bool,
    pub world_update: bool,
    pub pretend: bool,
}

impl ActiveEmerges {
    pub fn contains(&self, kind: EmergeKind) -> bool {
        match kind {
            EmergeKind::Sync => self.sync,
            EmergeKind::WorldUpdate => self.world_update,
            EmergeKind::Pretend => self.pretend,
        }
    }

    pub fn insert(&mut self, kind: EmergeKind) {
        match kind {
            EmergeKind::Sync => self.sync = true,
            EmergeKind::WorldUpdate => self.world_update = true,
            EmergeKind::Pretend => self.pretend = true,
        }
    }

    pub fn any(&self) -> bool {
        self.sync || self.world_update || self.pretend
    }
}

/// Answers "is an emerge of this kind running right now?"
pub trait ProcessChecker: Send {
    /// Refresh and return the current activity
    fn running(&mut self) -> ActiveEmerges;

    fn is_running(&mut self, kind: EmergeKind) -> bool {
        self.running().contains(kind)
    }
}

/// Classify one process command line.
///
/// emerge is a Python script, so the interpreter usually comes first; the
/// first argument whose file name is `emerge` or `emaint` starts the command.
pub fn classify_cmdline<S: AsRef<OsStr>>(cmdline: &[S]) -> Option<EmergeKind> {
    let position = cmdline.iter().position(|arg| {
        let name = Path::new(arg.as_ref()).file_name().and_then(OsStr::to_str);
        matches!(name, Some("emerge" | "emaint"))
    })?;

    let program = Path::new(cmdline[position].as_ref())
        .file_name()
        .and_then(OsStr::to_str)?;
    let args: Vec<&str> = cmdline[position + 1..]
        .iter()
        .filter_map(|arg| arg.as_ref().to_str())
        .collect();

    if program == "emaint" {
        return args.contains(&"sync").then_some(EmergeKind::Sync);
    }

    if args.contains(&"--sync") {
        return Some(EmergeKind::Sync);
    }
    if !args.iter().any(|&arg| arg == "world" || arg == "@world") {
        return None;
    }

    let pretend = args.iter().any(|&arg| {
        arg == "--pretend"
            || (arg.starts_with('-') && !arg.starts_with("--") && arg[1..].contains('p'))
    });
    Some(if pretend {
        EmergeKind::Pretend
    } else {
        EmergeKind::WorldUpdate
    })
}

/// [`ProcessChecker`] backed by the process table.
///
/// Children of the daemon itself are skipped; the daemon tracks its own runs.
pub struct SysinfoProcessChecker {
    system: System,
    own_pid: Option<Pid>,
}

impl SysinfoProcessChecker {
    pub fn new() -> Self {
        let own_pid = sysinfo::get_current_pid()
            .inspect_err(|e| tracing::warn!("Cannot determine own PID: {}", e))
            .ok();
        Self {
            system: System::new(),
            own_pid,
        }
    }
}

impl Default for SysinfoProcessChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessChecker for SysinfoProcessChecker {
    fn running(&mut self) -> ActiveEmerges {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let mut active = ActiveEmerges::default();
        for process in self.system.processes().values() {
            if self.own_pid.is_some() && process.parent() == self.own_pid {
                continue;
            }
            if let Some(kind) = classify_cmdline(process.cmd()) {
                tracing::trace!("Found running {} (pid {})", kind, process.pid());
                active.insert(kind);
            }
        }
        active
    }
}
