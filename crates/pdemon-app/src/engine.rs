//! Engine - owns the daemon's channels, tasks and model
//!
//! The Engine wires the TEA loop together: the message channel, the ticker,
//! the log watcher, the signal handler, spawned workers and their
//! cancellation token. `process_message` runs `handler::update`, dispatches
//! actions, then flushes the state store and republishes the status
//! snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use pdemon_core::prelude::*;
use pdemon_core::timestamp;
use pdemon_daemon::ProcessChecker;

use crate::actions::{self, ActionContext, Jobs};
use crate::config::Settings;
use crate::coordinator::{PortageUpdateCoordinator, SchedulePolicy};
use crate::handler;
use crate::message::Message;
use crate::signals;
use crate::state_store::StateStore;
use crate::status::{SharedStatus, SharedStatusService, StatusSnapshot};
use crate::watcher::{LogWatcher, WatcherConfig};

/// Orchestration engine for Portage Demon
pub struct Engine {
    /// The model
    pub coordinator: PortageUpdateCoordinator,

    /// Message channel (capacity 256)
    pub msg_tx: mpsc::Sender<Message>,
    pub msg_rx: mpsc::Receiver<Message>,

    /// Flips to true once at shutdown
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    pub settings: Settings,

    ctx: ActionContext,

    /// Token of the in-flight pretend run
    pretend_cancel: Option<CancellationToken>,

    /// Spawned workers and the ticker
    tasks: Vec<JoinHandle<()>>,

    log_watcher: Option<LogWatcher>,

    status: Arc<SharedStatus>,
}

impl Engine {
    /// Create an engine from validated settings.
    ///
    /// An unreadable state file is logged and replaced; the persisted
    /// summary is a cache the log can rebuild.
    pub fn new(settings: Settings, checker: Box<dyn ProcessChecker>) -> Result<Self> {
        settings.validate()?;

        let store = StateStore::open(&settings.state.path).unwrap_or_else(|e| {
            warn!("Starting with empty state: {}", e);
            StateStore::empty(&settings.state.path)
        });
        let coordinator =
            PortageUpdateCoordinator::new(SchedulePolicy::from_settings(&settings), store);

        let (msg_tx, msg_rx) = mpsc::channel::<Message>(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = ActionContext {
            msg_tx: msg_tx.clone(),
            jobs: Arc::new(Jobs::from_settings(&settings)),
            checker: Arc::new(Mutex::new(checker)),
            cancel: CancellationToken::new(),
        };

        let status = Arc::new(SharedStatus::new());
        status.publish(StatusSnapshot::capture(&coordinator));

        Ok(Self {
            coordinator,
            msg_tx,
            msg_rx,
            shutdown_tx,
            shutdown_rx,
            settings,
            ctx,
            pretend_cancel: None,
            tasks: Vec::new(),
            log_watcher: None,
            status,
        })
    }

    /// Scan the log once before the loop starts.
    ///
    /// A permission error on the log is fatal here; any other failure is
    /// logged and the daemon starts from the persisted summary.
    pub async fn initial_scan(&mut self) -> Result<()> {
        let jobs = self.ctx.jobs.clone();
        let scan = tokio::task::spawn_blocking(move || jobs.scan())
            .await
            .map_err(|e| Error::process(format!("Initial scan task failed: {}", e)))?
            .check_access()?;

        self.process_message(Message::LogScanned(scan.into_report()));
        info!(
            "Initial scan done: last sync {}, last world update {}",
            timestamp::format_local(self.coordinator.sync.last),
            timestamp::format_local(self.coordinator.world.last.as_ref().map(|r| r.start)),
        );
        Ok(())
    }

    /// Start the signal handler, the ticker and the log watcher
    pub fn start(&mut self) {
        signals::spawn_signal_handler(self.msg_tx.clone());
        let ticker = self.spawn_ticker();
        self.tasks.push(ticker);
        self.log_watcher = self.start_log_watcher();
    }

    /// Process a single message through the TEA update cycle.
    pub fn process_message(&mut self, msg: Message) {
        let now = timestamp::now();
        let mut next = Some(msg);

        while let Some(msg) = next.take() {
            let result = handler::update(&mut self.coordinator, msg, now);
            if let Some(action) = result.action {
                trace!("Action: {:?}", action);
                if let Some(handle) =
                    actions::handle_action(action, &self.ctx, &mut self.pretend_cancel)
                {
                    self.tasks.push(handle);
                }
            }
            next = result.message;
        }

        if !self.coordinator.pretend.running {
            self.pretend_cancel = None;
        }
        self.tasks.retain(|handle| !handle.is_finished());

        if let Err(e) = self.coordinator.flush() {
            error!("Failed to persist state: {}", e);
        }
        self.status
            .publish(StatusSnapshot::capture(&self.coordinator));
    }

    /// Run until a quit message arrives, then shut down
    pub async fn run(&mut self) -> Result<()> {
        while let Some(msg) = self.msg_rx.recv().await {
            self.process_message(msg);
            if self.should_quit() {
                break;
            }
        }
        self.shutdown().await;
        Ok(())
    }

    pub fn should_quit(&self) -> bool {
        self.coordinator.should_quit()
    }

    /// Get a clone of the message sender for spawning input sources.
    pub fn msg_sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    /// Get a clone of the shutdown receiver for background tasks.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn status_service(&self) -> SharedStatusService {
        SharedStatusService::new(self.status.clone())
    }

    /// Stop the watcher, cancel in-flight commands and wait for workers.
    ///
    /// Waiting is bounded by `scheduler.shutdown_timeout_secs` overall.
    /// Results that arrive in time are still merged and persisted.
    pub async fn shutdown(&mut self) {
        info!("Shutting down");
        self.coordinator.quitting = true;

        if let Some(ref mut watcher) = self.log_watcher {
            watcher.stop();
        }
        let _ = self.shutdown_tx.send(true);
        self.ctx.cancel.cancel();

        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.settings.scheduler.shutdown_timeout_secs);
        for handle in std::mem::take(&mut self.tasks) {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker panicked: {}", e),
                Err(_) => warn!("Worker did not stop in time"),
            }
        }

        while let Ok(msg) = self.msg_rx.try_recv() {
            self.process_message(msg);
        }
        for handle in std::mem::take(&mut self.tasks) {
            handle.abort();
        }
        info!("Shutdown complete");
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let tx = self.msg_tx.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let period = Duration::from_millis(self.settings.scheduler.tick_ms);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if tx.send(Message::Tick).await.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Ticker stopped");
        })
    }

    fn start_log_watcher(&self) -> Option<LogWatcher> {
        let mut watcher = LogWatcher::new(
            WatcherConfig::new(&self.settings.log.path)
                .with_debounce_ms(self.settings.watcher.debounce_ms),
        );

        if let Err(e) = watcher.start(self.msg_tx.clone()) {
            warn!("Failed to start log watcher: {}", e);
            return None;
        }
        Some(watcher)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
