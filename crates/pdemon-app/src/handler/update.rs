//! Main update function - handles state transitions (TEA pattern)

use tracing::{debug, info, warn};

use crate::coordinator::{Due, PortageUpdateCoordinator};
use crate::message::Message;

use super::{UpdateAction, UpdateResult};

/// Process a message and update the coordinator.
/// Returns optional follow-up message and/or action.
///
/// `now` is the wall clock in epoch seconds, passed in so tests control time.
pub fn update(coord: &mut PortageUpdateCoordinator, message: Message, now: i64) -> UpdateResult {
    match message {
        Message::Quit => {
            coord.quitting = true;
            UpdateResult::none()
        }

        Message::Shutdown { signal } => {
            info!("Received {}, shutting down", signal);
            UpdateResult::message(Message::Quit)
        }

        Message::Tick => match coord.on_tick(now) {
            Some(Due::CheckProcesses) => {
                coord.process_check_started(now);
                UpdateResult::action(UpdateAction::CheckProcesses)
            }
            Some(Due::Sync) => {
                coord.sync_started();
                UpdateResult::action(UpdateAction::RunSync)
            }
            Some(Due::Pretend) => {
                coord.pretend_started(now);
                UpdateResult::action(UpdateAction::RunPretend)
            }
            None => UpdateResult::none(),
        },

        // ─────────────────────────────────────────────────────────
        // Log Messages
        // ─────────────────────────────────────────────────────────
        Message::LogChanged => {
            if coord.quitting {
                return UpdateResult::none();
            }
            if coord.scan_running {
                debug!("Log changed during scan, rescanning afterwards");
                coord.rescan_pending = true;
                return UpdateResult::none();
            }
            coord.scan_running = true;
            UpdateResult::action(UpdateAction::ScanLog)
        }

        Message::LogScanned(report) => {
            coord.scan_running = false;
            coord.on_scan(report);
            if std::mem::take(&mut coord.rescan_pending) {
                return UpdateResult::message(Message::LogChanged);
            }
            UpdateResult::none()
        }

        Message::WatcherError { message } => {
            warn!("Log watcher error: {}", message);
            UpdateResult::none()
        }

        // ─────────────────────────────────────────────────────────
        // Command Messages
        // ─────────────────────────────────────────────────────────
        Message::SyncFinished(outcome) => {
            coord.on_sync_finished(outcome, now);
            UpdateResult::none()
        }

        Message::PretendFinished(result) => {
            coord.on_pretend_finished(result);
            UpdateResult::none()
        }

        Message::ProcessesChecked(active) => {
            if coord.on_processes_checked(active) {
                UpdateResult::action(UpdateAction::CancelPretend)
            } else {
                UpdateResult::none()
            }
        }
    }
}
