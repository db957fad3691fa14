//! Tests for handler module

use super::*;
use crate::coordinator::{
    PortageUpdateCoordinator, PretendResult, PretendState, SchedulePolicy, SyncState,
};
use crate::message::Message;
use crate::scan::{ScanOutcome, ScanReport};
use crate::signals::DaemonSignal;
use crate::state_store::StateStore;
use pdemon_core::{UpdateRecord, UpdateState};
use pdemon_daemon::test_utils::active;
use pdemon_daemon::{ActiveEmerges, EmergeKind, PretendReport, SyncOutcome};

fn test_coordinator() -> PortageUpdateCoordinator {
    PortageUpdateCoordinator::new(
        SchedulePolicy::default(),
        StateStore::empty("/nonexistent/state.toml"),
    )
}

fn world_report(start: i64) -> ScanReport {
    ScanReport {
        sync: ScanOutcome::Found(start - 100),
        world: ScanOutcome::Found(UpdateRecord {
            start,
            stop: start + 60,
            total: 2,
            state: UpdateState::Complete,
            failed: None,
        }),
    }
}

#[test]
fn test_quit_message_sets_quitting() {
    let mut coord = test_coordinator();
    assert!(!coord.should_quit());

    update(&mut coord, Message::Quit, 0);

    assert!(coord.should_quit());
}

#[test]
fn test_stop_signal_quits_through_follow_up() {
    let mut coord = test_coordinator();
    let result = update(
        &mut coord,
        Message::Shutdown {
            signal: DaemonSignal::Terminate,
        },
        0,
    );
    assert!(matches!(result.message, Some(Message::Quit)));
    assert_eq!(result.action, None);

    update(&mut coord, result.message.unwrap(), 0);
    assert!(coord.should_quit());
}

#[test]
fn test_first_tick_checks_processes() {
    let mut coord = test_coordinator();
    let result = update(&mut coord, Message::Tick, 100);
    assert_eq!(result.action, Some(UpdateAction::CheckProcesses));
    assert_eq!(coord.last_process_check, Some(100));
}

#[test]
fn test_tick_starts_sync_then_pretend() {
    let mut coord = test_coordinator();
    update(&mut coord, Message::Tick, 100);

    let result = update(&mut coord, Message::Tick, 101);
    assert_eq!(result.action, Some(UpdateAction::RunSync));
    assert_eq!(coord.sync.state, SyncState::Running);

    // Pretend waits for the sync
    assert!(update(&mut coord, Message::Tick, 102).action.is_none());

    update(&mut coord, Message::SyncFinished(SyncOutcome::Success), 110);
    let result = update(&mut coord, Message::Tick, 111);
    assert_eq!(result.action, Some(UpdateAction::RunPretend));
    assert_eq!(coord.pretend.state, PretendState::Running);
}

#[test]
fn test_log_changed_starts_scan() {
    let mut coord = test_coordinator();
    let result = update(&mut coord, Message::LogChanged, 0);
    assert_eq!(result.action, Some(UpdateAction::ScanLog));
    assert!(coord.scan_running);
}

#[test]
fn test_log_changed_during_scan_queues_one_rescan() {
    let mut coord = test_coordinator();
    update(&mut coord, Message::LogChanged, 0);

    assert!(update(&mut coord, Message::LogChanged, 1).action.is_none());
    assert!(update(&mut coord, Message::LogChanged, 2).action.is_none());
    assert!(coord.rescan_pending);

    let result = update(&mut coord, Message::LogScanned(world_report(1_000)), 3);
    assert!(matches!(result.message, Some(Message::LogChanged)));
    assert!(!coord.rescan_pending);
    assert!(!coord.scan_running);

    let result = update(&mut coord, Message::LogChanged, 4);
    assert_eq!(result.action, Some(UpdateAction::ScanLog));
}

#[test]
fn test_log_changed_ignored_when_quitting() {
    let mut coord = test_coordinator();
    update(&mut coord, Message::Quit, 0);
    assert!(update(&mut coord, Message::LogChanged, 1).action.is_none());
}

#[test]
fn test_scan_result_merged_into_coordinator() {
    let mut coord = test_coordinator();
    update(&mut coord, Message::LogChanged, 0);
    let result = update(&mut coord, Message::LogScanned(world_report(1_000)), 1);

    assert!(result.message.is_none());
    assert_eq!(coord.sync.last, Some(900));
    assert_eq!(coord.world.last.as_ref().map(|r| r.start), Some(1_000));
}

#[test]
fn test_world_update_detected_cancels_pretend() {
    let mut coord = test_coordinator();
    update(&mut coord, Message::Tick, 100);
    coord.sync.last = Some(100);
    let result = update(&mut coord, Message::Tick, 101);
    assert_eq!(result.action, Some(UpdateAction::RunPretend));

    let result = update(
        &mut coord,
        Message::ProcessesChecked(active(&[EmergeKind::WorldUpdate])),
        130,
    );
    assert_eq!(result.action, Some(UpdateAction::CancelPretend));

    update(&mut coord, Message::PretendFinished(PretendResult::Cancelled), 131);
    assert!(coord.pretend.requested);
    assert_ne!(
        update(&mut coord, Message::Tick, 132).action,
        Some(UpdateAction::RunPretend)
    );

    update(&mut coord, Message::ProcessesChecked(ActiveEmerges::default()), 160);
    let result = update(&mut coord, Message::Tick, 161);
    assert_eq!(result.action, Some(UpdateAction::RunPretend));
}

#[test]
fn test_pretend_finished_records_pending() {
    let mut coord = test_coordinator();
    coord.pretend_started(0);
    update(
        &mut coord,
        Message::PretendFinished(PretendResult::Report(PretendReport {
            packages: Some(12),
            merge_lines: 12,
            portage_update: true,
        })),
        5,
    );
    assert_eq!(coord.pretend.pending, Some(12));
    assert!(coord.pretend.portage_update);
}

#[test]
fn test_watcher_error_is_not_fatal() {
    let mut coord = test_coordinator();
    let result = update(
        &mut coord,
        Message::WatcherError {
            message: "inotify limit reached".to_string(),
        },
        0,
    );
    assert!(result.action.is_none());
    assert!(!coord.should_quit());
}
