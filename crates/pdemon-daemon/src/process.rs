//! emerge process management
//!
//! Commands run to completion under a [`CancellationToken`]. Output is read
//! line by line and the token is checked between reads. A cancelled command
//! gets SIGTERM and [`TERMINATE_GRACE`] to exit before it is killed.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use pdemon_core::prelude::*;

use crate::commands::EmergeCommand;

static NETWORK_ERROR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(rsync error|could not resolve host|temporary failure in name resolution|name or service not known|network is unreachable|no route to host|connection (refused|timed out|reset)|unable to access '.*':|failed to connect to)",
    )
    .expect("Invalid NETWORK_ERROR_REGEX")
});

/// How long a cancelled command may take to exit after SIGTERM
pub const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Captured result of a finished (or cancelled) command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal or cancelled
    pub code: Option<i32>,
    /// True when the run was abandoned through the cancellation token
    pub cancelled: bool,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.cancelled && self.code == Some(0)
    }

    /// stdout followed by stderr
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
    }
}

/// How a sync run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    /// The mirror could not be reached; retry later
    NetworkError,
    Failed { code: Option<i32> },
    Cancelled,
}

impl SyncOutcome {
    pub fn from_output(output: &CommandOutput) -> Self {
        if output.cancelled {
            SyncOutcome::Cancelled
        } else if output.success() {
            SyncOutcome::Success
        } else if output.lines().any(|line| NETWORK_ERROR_REGEX.is_match(line)) {
            SyncOutcome::NetworkError
        } else {
            SyncOutcome::Failed { code: output.code }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::NetworkError => "network-error",
            SyncOutcome::Failed { .. } => "failed",
            SyncOutcome::Cancelled => "cancelled",
        }
    }
}

/// Run `command` to completion, or until `cancel` fires.
///
/// A missing binary maps to [`Error::EmergeNotFound`]. A non-zero exit is not
/// an error; it is reported through [`CommandOutput::code`].
pub async fn run_emerge(command: &EmergeCommand, cancel: CancellationToken) -> Result<CommandOutput> {
    info!("Running: {}", command);

    let mut child = Command::new(command.program())
        .args(command.args())
        .env("NOCOLOR", "true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::EmergeNotFound
            } else {
                Error::ProcessSpawn {
                    reason: e.to_string(),
                }
            }
        })?;

    debug!("{} started with PID: {:?}", command.kind(), child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::process("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::process("stderr was not captured"))?;
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut output = CommandOutput::default();
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abandon(&mut child, command).await;
                output.cancelled = true;
                return Ok(output);
            }
            line = stdout_lines.next_line(), if stdout_open => match line {
                Ok(Some(line)) => output.stdout.push(line),
                Ok(None) => stdout_open = false,
                Err(e) => {
                    warn!("Error reading {} stdout: {}", command.kind(), e);
                    stdout_open = false;
                }
            },
            line = stderr_lines.next_line(), if stderr_open => match line {
                Ok(Some(line)) => {
                    trace!("{} stderr: {}", command.kind(), line);
                    output.stderr.push(line);
                }
                Ok(None) => stderr_open = false,
                Err(e) => {
                    warn!("Error reading {} stderr: {}", command.kind(), e);
                    stderr_open = false;
                }
            },
        }
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            abandon(&mut child, command).await;
            output.cancelled = true;
            return Ok(output);
        }
        status = child.wait() => status?,
    };

    output.code = status.code();
    info!("{} exited with status: {:?}", command.kind(), status);
    Ok(output)
}

/// Ask the child to exit, then kill it once the grace period runs out
async fn abandon(child: &mut Child, command: &EmergeCommand) {
    info!("Cancelling {}", command);

    if request_exit(child) {
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} stopped after SIGTERM: {:?}", command.kind(), status);
                return;
            }
            Ok(Err(e)) => warn!("Waiting for {} failed: {}", command.kind(), e),
            Err(_) => warn!(
                "{} still running {}s after SIGTERM, killing",
                command.kind(),
                TERMINATE_GRACE.as_secs()
            ),
        }
    }

    if let Err(e) = child.kill().await {
        error!("Failed to kill {}: {}", command.kind(), e);
    }
}

/// Send SIGTERM; false when there is nothing to signal
#[cfg(unix)]
fn request_exit(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send SIGTERM to {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) -> bool {
    false
}
