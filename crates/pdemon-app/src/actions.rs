//! Action handlers: UpdateAction dispatch and background task spawning
//!
//! Every action runs off the engine loop and reports back with a message.
//! Blocking work (log scans, the process table) goes to `spawn_blocking`;
//! emerge commands run as async tasks under a child of the engine's
//! cancellation token.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use pdemon_core::{SyncScanOptions, WorldUpdateOptions};
use pdemon_daemon::{
    parse_pretend_output, run_emerge, ActiveEmerges, EmergeCommand, ProcessChecker, SyncOutcome,
};

use crate::config::Settings;
use crate::coordinator::PretendResult;
use crate::handler::UpdateAction;
use crate::message::Message;
use crate::scan::{LogScan, ScanOutcome, ScanReport};

/// Process checker shared with blocking workers
pub type SharedChecker = Arc<Mutex<Box<dyn ProcessChecker>>>;

/// Inputs of the background jobs, fixed at startup
#[derive(Debug, Clone)]
pub struct Jobs {
    pub log_path: PathBuf,
    pub sync_scan: SyncScanOptions,
    pub world_scan: WorldUpdateOptions,
    pub sync_command: EmergeCommand,
    pub pretend_command: EmergeCommand,
}

impl Jobs {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            log_path: settings.log.path.clone(),
            sync_scan: settings.sync_scan_options(),
            world_scan: settings.world_update_options(),
            sync_command: settings.sync_command(),
            pretend_command: settings.pretend_command(),
        }
    }

    /// Run both lookups synchronously
    pub fn scan(&self) -> LogScan {
        LogScan::run(&self.log_path, &self.sync_scan, &self.world_scan)
    }
}

/// Everything a spawned action needs
#[derive(Clone)]
pub struct ActionContext {
    pub msg_tx: mpsc::Sender<Message>,
    pub jobs: Arc<Jobs>,
    pub checker: SharedChecker,
    /// Root token; cancelled at shutdown
    pub cancel: CancellationToken,
}

/// Execute an action. Returns the handle of the spawned task, if any.
///
/// `pretend_cancel` holds the token of the in-flight pretend run.
pub fn handle_action(
    action: UpdateAction,
    ctx: &ActionContext,
    pretend_cancel: &mut Option<CancellationToken>,
) -> Option<JoinHandle<()>> {
    match action {
        UpdateAction::ScanLog => Some(spawn_log_scan(ctx.clone())),

        UpdateAction::RunSync => Some(spawn_sync(ctx.clone())),

        UpdateAction::RunPretend => {
            let token = ctx.cancel.child_token();
            *pretend_cancel = Some(token.clone());
            Some(spawn_pretend(ctx.clone(), token))
        }

        UpdateAction::CancelPretend => {
            match pretend_cancel.take() {
                Some(token) => {
                    debug!("Cancelling pretend run");
                    token.cancel();
                }
                None => debug!("No pretend run to cancel"),
            }
            None
        }

        UpdateAction::CheckProcesses => Some(spawn_process_check(ctx.clone())),
    }
}

fn spawn_log_scan(ctx: ActionContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let jobs = ctx.jobs.clone();
        let report = match tokio::task::spawn_blocking(move || jobs.scan().into_report()).await {
            Ok(report) => report,
            Err(e) => {
                error!("Log scan task failed: {}", e);
                ScanReport {
                    sync: ScanOutcome::Failed(e.to_string()),
                    world: ScanOutcome::Failed(e.to_string()),
                }
            }
        };
        let _ = ctx.msg_tx.send(Message::LogScanned(report)).await;
    })
}

fn spawn_sync(ctx: ActionContext) -> JoinHandle<()> {
    let token = ctx.cancel.child_token();
    tokio::spawn(async move {
        let outcome = match run_emerge(&ctx.jobs.sync_command, token).await {
            Ok(output) => SyncOutcome::from_output(&output),
            Err(e) => {
                error!("Sync could not run: {}", e);
                SyncOutcome::Failed { code: None }
            }
        };
        let _ = ctx.msg_tx.send(Message::SyncFinished(outcome)).await;
    })
}

fn spawn_pretend(ctx: ActionContext, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match run_emerge(&ctx.jobs.pretend_command, token).await {
            Ok(output) if output.cancelled => PretendResult::Cancelled,
            Ok(output) if output.success() => PretendResult::Report(parse_pretend_output(
                output.stdout.iter().map(String::as_str),
            )),
            Ok(output) => {
                for line in output.stderr.iter().rev().take(5).rev() {
                    warn!("pretend: {}", line);
                }
                PretendResult::Failed(format!("exit status {:?}", output.code))
            }
            Err(e) => PretendResult::Failed(e.to_string()),
        };
        let _ = ctx.msg_tx.send(Message::PretendFinished(result)).await;
    })
}

fn spawn_process_check(ctx: ActionContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let checker = ctx.checker.clone();
        let active = tokio::task::spawn_blocking(move || {
            let mut checker = checker.lock().unwrap_or_else(|e| e.into_inner());
            checker.running()
        })
        .await;

        match active {
            Ok(active) => {
                let _ = ctx.msg_tx.send(Message::ProcessesChecked(active)).await;
            }
            Err(e) => {
                error!("Process check task failed: {}", e);
                let _ = ctx
                    .msg_tx
                    .send(Message::ProcessesChecked(ActiveEmerges::default()))
                    .await;
            }
        }
    })
}
