//! End-to-end lookups against recorded emerge.log excerpts
//!
//! Each file under `tests/scenarios/` is a small, hand-checked log. The tests
//! run both lookups with the default options, the same way `pdemon scan` does.

use std::path::{Path, PathBuf};

use pdemon_app::Settings;
use pdemon_core::{
    last_sync_timestamp, last_world_update, select_latest, Error, Lookup, SyncScanOptions,
    UpdateRecord, UpdateState, WorldUpdateOptions, WorldUpdateScanner,
};
use portage_demon::ScanSummary;
use proptest::prelude::*;

fn scenario(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scenarios")
        .join(name)
}

fn world(name: &str) -> Lookup<UpdateRecord> {
    last_world_update(&scenario(name), &WorldUpdateOptions::default()).unwrap()
}

fn sync(name: &str) -> Lookup<i64> {
    last_sync_timestamp(&scenario(name), &SyncScanOptions::default()).unwrap()
}

// ── World updates ─────────────────────────────────────────────────────────────

#[test]
fn test_simple_success() {
    let record = world("simple_success.log").found().unwrap();
    assert_eq!(
        record,
        UpdateRecord {
            start: 1000,
            stop: 1030,
            total: 3,
            state: UpdateState::Complete,
            failed: None,
        }
    );
    assert_eq!(record.failed_display(), "none");
}

#[test]
fn test_early_failure_is_below_threshold() {
    match world("early_failure.log") {
        Lookup::NotFound(exhausted) => assert!(exhausted.attempts > 0 && exhausted.log_length_known),
        Lookup::Found(record) => panic!("expected no record, got {:?}", record),
    }
}

#[test]
fn test_failure_past_threshold_is_incomplete() {
    let record = world("incomplete.log").found().unwrap();
    assert_eq!(record.state, UpdateState::Incomplete);
    assert_eq!(record.start, 3000);
    assert_eq!(record.total, 10);
    assert_eq!(record.failed.as_deref(), Some("dev-libs/pkg6-1 (6 of 10)"));
}

#[test]
fn test_incomplete_hidden_when_filtered() {
    let options = WorldUpdateOptions {
        include_incomplete: false,
        ..Default::default()
    };
    let lookup = last_world_update(&scenario("incomplete.log"), &options).unwrap();
    assert!(!lookup.is_found());
}

#[test]
fn test_keep_going_restart_is_partial() {
    let record = world("keep_going.log").found().unwrap();
    assert_eq!(record.state, UpdateState::Partial);
    assert_eq!(record.start, 4000);
    assert_eq!(record.stop, 4501);
    assert_eq!(record.total, 50);
    assert_eq!(record.failed.as_deref(), Some("app-misc/pkg20-1 (20 of 50)"));
}

// ── Sync lookups ──────────────────────────────────────────────────────────────

#[test]
fn test_sync_found() {
    assert_eq!(sync("simple_success.log").found(), Some(995));
    assert_eq!(sync("incomplete.log").found(), Some(2900));
}

#[test]
fn test_no_sync_is_not_found() {
    assert!(!sync("no_sync.log").is_found());
}

#[test]
fn test_missing_log_is_an_error_not_a_miss() {
    let result = last_sync_timestamp(&scenario("absent.log"), &SyncScanOptions::default());
    assert!(matches!(result, Err(Error::LogAccess { .. })));
}

// ── Report ────────────────────────────────────────────────────────────────────

#[test]
fn test_scan_summary_over_fixture() {
    let summary = ScanSummary::collect(&Settings::default(), &scenario("keep_going.log")).unwrap();
    assert_eq!(summary.last_sync, None);
    assert_eq!(
        summary.last_world_update.map(|record| record.state),
        Some(UpdateState::Partial)
    );
}

#[test]
fn test_scan_summary_json_over_fixture() {
    let summary = ScanSummary::collect(&Settings::default(), &scenario("simple_success.log")).unwrap();
    let mut out = Vec::new();
    summary.write_json(&mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

    assert_eq!(value["last_sync"], 995);
    assert_eq!(value["last_world_update"]["state"], "complete");
    assert_eq!(value["last_world_update"]["failed"], serde_json::Value::Null);
}

// ── Properties ────────────────────────────────────────────────────────────────

fn package(lines: &mut Vec<String>, ts: i64, index: u32, total: u32, completed: bool) {
    lines.push(format!("{}:  >>> emerge ({} of {}) cat/p{}-1 to /", ts, index, total, index));
    if completed {
        lines.push(format!(
            "{}:  ::: completed emerge ({} of {}) cat/p{}-1 to /",
            ts + 1,
            index,
            total,
            index
        ));
    }
}

/// One world update of `total` (3..) packages ending in `state`
fn run(start: i64, total: u32, state: UpdateState) -> Vec<String> {
    let keep_going = if state == UpdateState::Partial { "--keep-going " } else { "" };
    let mut lines = vec![format!("{}:  *** emerge {}--update @world", start, keep_going)];
    let mut ts = start + 1;
    match state {
        UpdateState::Complete => {
            for index in 1..=total {
                package(&mut lines, ts, index, total, true);
                ts += 2;
            }
            lines.push(format!("{}:  *** exiting successfully.", ts));
        }
        UpdateState::Partial => {
            package(&mut lines, ts, 1, total, true);
            package(&mut lines, ts + 2, 2, total, false);
            lines.push(format!("{}:  *** exiting unsuccessfully with status '1'.", ts + 3));
            ts += 4;
            let rest = total - 2;
            for index in 1..=rest {
                package(&mut lines, ts, index, rest, true);
                ts += 2;
            }
            lines.push(format!("{}:  *** exiting successfully.", ts));
        }
        _ => {
            for index in 1..total {
                package(&mut lines, ts, index, total, true);
                ts += 2;
            }
            package(&mut lines, ts, total, total, false);
            lines.push(format!("{}:  *** exiting unsuccessfully with status '1'.", ts + 1));
        }
    }
    lines
}

fn any_state() -> impl Strategy<Value = UpdateState> {
    prop_oneof![
        Just(UpdateState::Complete),
        Just(UpdateState::Partial),
        Just(UpdateState::Incomplete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_latest_record_has_greatest_start(
        runs in prop::collection::vec((0i64..20, 3u32..6, any_state()), 1..6)
    ) {
        let mut lines = Vec::new();
        for (offset, total, state) in &runs {
            lines.extend(run(offset * 100, *total, *state));
        }

        let parsed = WorldUpdateScanner::default().scan(lines.iter().map(String::as_str));
        let states: Vec<UpdateState> = parsed.records.iter().map(|r| r.state).collect();
        let expected: Vec<UpdateState> = runs.iter().map(|(_, _, state)| *state).collect();
        prop_assert_eq!(states, expected);

        let latest = select_latest(&parsed, true).unwrap();
        let max_start = parsed.records.iter().map(|r| r.start).max().unwrap();
        let last_at_max = parsed.records.iter().rev().find(|r| r.start == max_start).unwrap();
        prop_assert!(std::ptr::eq(latest, last_at_max));
        for record in &parsed.records {
            prop_assert!(record.stop > record.start);
        }

        if let Some(finished) = select_latest(&parsed, false) {
            prop_assert!(finished.state.is_finished());
        }
    }
}
