//! emerge command lines run by the daemon

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default repository sync command
pub const DEFAULT_SYNC_ARGV: &[&str] = &["emerge", "--sync"];

/// Default dry-run used to count pending packages
pub const DEFAULT_PRETEND_ARGV: &[&str] = &[
    "emerge",
    "--pretend",
    "--verbose",
    "--update",
    "--deep",
    "--newuse",
    "--with-bdeps=y",
    "@world",
];

/// Which operation a command performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Sync,
    Pretend,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Sync => "sync",
            CommandKind::Pretend => "pretend",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured emerge invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergeCommand {
    kind: CommandKind,
    argv: Vec<String>,
}

impl EmergeCommand {
    /// Build a command from a configured argv. An empty argv falls back to the default.
    pub fn new(kind: CommandKind, argv: Vec<String>) -> Self {
        let argv = if argv.iter().all(|arg| arg.trim().is_empty()) {
            Self::default_argv(kind)
        } else {
            argv
        };
        Self { kind, argv }
    }

    pub fn sync() -> Self {
        Self::new(CommandKind::Sync, Vec::new())
    }

    pub fn pretend() -> Self {
        Self::new(CommandKind::Pretend, Vec::new())
    }

    pub fn default_argv(kind: CommandKind) -> Vec<String> {
        let argv = match kind {
            CommandKind::Sync => DEFAULT_SYNC_ARGV,
            CommandKind::Pretend => DEFAULT_PRETEND_ARGV,
        };
        argv.iter().map(|arg| arg.to_string()).collect()
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

impl fmt::Display for EmergeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}
