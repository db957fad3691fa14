use super::*;
use crate::world_update::record::{RejectReason, Threshold};

// ── Test helpers ──────────────────────────────────────────────────────────────

fn world(ts: i64, keep_going: bool) -> String {
    if keep_going {
        format!("{}:  *** emerge --keep-going --update --deep --newuse @world", ts)
    } else {
        format!("{}:  *** emerge --update --deep --newuse @world", ts)
    }
}

fn start(ts: i64, index: u32, total: u32, name: &str) -> String {
    format!("{}:  >>> emerge ({} of {}) {} to /", ts, index, total, name)
}

fn done(ts: i64, index: u32, total: u32, name: &str) -> String {
    format!(
        "{}:  ::: completed emerge ({} of {}) {} to /",
        ts, index, total, name
    )
}

fn merged(lines: &mut Vec<String>, ts: i64, index: u32, total: u32, name: &str) {
    lines.push(start(ts, index, total, name));
    lines.push(done(ts + 5, index, total, name));
}

fn fail(ts: i64) -> String {
    format!("{}:  *** exiting unsuccessfully with status '1'.", ts)
}

fn ok(ts: i64) -> String {
    format!("{}:  *** exiting successfully.", ts)
}

fn scan(lines: &[String]) -> ParsedWindow {
    WorldUpdateScanner::default().scan(lines.iter().map(String::as_str))
}

fn progress(index: u32, total: u32, name: &str) -> RunProgress {
    RunProgress {
        start: 100,
        keep_going: false,
        index,
        total,
        name: name.to_string(),
        last_boundary: 100,
        saved: None,
    }
}

// ── Single transitions ────────────────────────────────────────────────────────

#[test]
fn test_idle_ignores_everything_but_world_start() {
    let thresholds = Thresholds::default();
    for event in [
        LogEvent::ExitSuccess { ts: 1 },
        LogEvent::PackageStart {
            ts: 1,
            index: 1,
            total: 2,
            name: "a/b-1",
        },
        LogEvent::Other,
    ] {
        let step = step(ScanState::Idle, &event, &thresholds);
        assert_eq!(step.next, ScanState::Idle);
        assert!(step.emitted.is_none());
    }

    let step = step(
        ScanState::Idle,
        &LogEvent::WorldStart {
            ts: 7,
            keep_going: true,
        },
        &thresholds,
    );
    assert_eq!(
        step.next,
        ScanState::AwaitingFirstPackage(RunStart {
            start: 7,
            keep_going: true
        })
    );
}

#[test]
fn test_awaiting_requires_first_package() {
    let thresholds = Thresholds::default();
    let awaiting = ScanState::AwaitingFirstPackage(RunStart {
        start: 100,
        keep_going: false,
    });

    let step_ok = step(
        awaiting.clone(),
        &LogEvent::PackageStart {
            ts: 105,
            index: 1,
            total: 3,
            name: "dev-libs/foo-1",
        },
        &thresholds,
    );
    assert_eq!(
        step_ok.next,
        ScanState::Running(RunProgress {
            last_boundary: 105,
            ..progress(1, 3, "dev-libs/foo-1")
        })
    );

    let step_wrong_index = step(
        awaiting.clone(),
        &LogEvent::PackageStart {
            ts: 105,
            index: 2,
            total: 3,
            name: "dev-libs/foo-1",
        },
        &thresholds,
    );
    assert_eq!(step_wrong_index.next, ScanState::Idle);

    let step_exit = step(awaiting, &LogEvent::ExitSuccess { ts: 101 }, &thresholds);
    assert_eq!(step_exit.next, ScanState::Idle);
    assert!(step_exit.emitted.is_none());
}

#[test]
fn test_awaiting_world_start_restarts_wait() {
    let step = step(
        ScanState::AwaitingFirstPackage(RunStart {
            start: 100,
            keep_going: false,
        }),
        &LogEvent::WorldStart {
            ts: 200,
            keep_going: false,
        },
        &Thresholds::default(),
    );
    assert_eq!(
        step.next,
        ScanState::AwaitingFirstPackage(RunStart {
            start: 200,
            keep_going: false
        })
    );
}

#[test]
fn test_running_advances_on_matching_completion() {
    let step = step(
        ScanState::Running(progress(1, 3, "a/one-1")),
        &LogEvent::PackageComplete {
            ts: 120,
            index: 1,
            total: 3,
            name: "a/one-1",
        },
        &Thresholds::default(),
    );
    assert_eq!(
        step.next,
        ScanState::Running(RunProgress {
            last_boundary: 120,
            ..progress(2, 3, "a/one-1")
        })
    );
}

#[test]
fn test_running_ignores_mismatched_package_lines() {
    let thresholds = Thresholds::default();
    let running = ScanState::Running(progress(2, 3, "a/two-1"));

    for event in [
        LogEvent::PackageComplete {
            ts: 120,
            index: 1,
            total: 3,
            name: "a/one-1",
        },
        LogEvent::PackageStart {
            ts: 120,
            index: 2,
            total: 5,
            name: "b/other-1",
        },
        LogEvent::ExitSuccess { ts: 121 },
        LogEvent::SyncCompleted {
            ts: 122,
            repo: "gentoo",
        },
    ] {
        let step = step(running.clone(), &event, &thresholds);
        assert_eq!(step.next, running);
        assert!(step.emitted.is_none());
    }
}

#[test]
fn test_last_completion_enters_completing() {
    let step = step(
        ScanState::Running(progress(3, 3, "a/three-1")),
        &LogEvent::PackageComplete {
            ts: 150,
            index: 3,
            total: 3,
            name: "a/three-1",
        },
        &Thresholds::default(),
    );
    assert!(matches!(step.next, ScanState::Completing(ref p) if p.last_boundary == 150));
}

#[test]
fn test_completing_waits_for_exit_line() {
    let completing = ScanState::Completing(progress(3, 3, "a/three-1"));
    let step = step(completing.clone(), &LogEvent::Other, &Thresholds::default());
    assert_eq!(step.next, completing);
}

#[test]
fn test_failure_with_keep_going_is_pending() {
    let running = ScanState::Running(RunProgress {
        keep_going: true,
        ..progress(2, 4, "a/two-1")
    });
    let step = step(
        running,
        &LogEvent::ExitFailure { ts: 150, status: 1 },
        &Thresholds::default(),
    );
    match step.next {
        ScanState::FailurePending(_, failure) => {
            assert_eq!(failure.ts, 150);
            assert_eq!(failure.package.to_string(), "a/two-1 (2 of 4)");
        }
        other => panic!("expected failure-pending, got {}", other.name()),
    }
    assert!(step.emitted.is_none());
}

// ── Whole runs ────────────────────────────────────────────────────────────────

#[test]
fn test_complete_run() {
    let mut lines = vec![world(100, false)];
    merged(&mut lines, 105, 1, 3, "dev-libs/a-1");
    merged(&mut lines, 115, 2, 3, "dev-libs/b-1");
    merged(&mut lines, 125, 3, 3, "dev-libs/c-1");
    lines.push(ok(131));

    let parsed = scan(&lines);
    assert_eq!(
        parsed.records,
        vec![UpdateRecord {
            start: 100,
            stop: 131,
            total: 3,
            state: UpdateState::Complete,
            failed: None,
        }]
    );
    assert!(parsed.rejected.is_empty());
}

#[test]
fn test_incomplete_run_without_keep_going() {
    let mut lines = vec![world(100, false)];
    for i in 1..=4 {
        merged(&mut lines, 100 + i64::from(i) * 10, i, 10, &format!("cat/pkg{}-1", i));
    }
    lines.push(start(150, 5, 10, "cat/pkg5-1"));
    lines.push(fail(200));

    let parsed = scan(&lines);
    assert_eq!(
        parsed.records,
        vec![UpdateRecord {
            start: 100,
            stop: 200,
            total: 10,
            state: UpdateState::Incomplete,
            failed: Some("cat/pkg5-1 (5 of 10)".to_string()),
        }]
    );
}

#[test]
fn test_incomplete_at_threshold_is_rejected() {
    // 3 of 10 completed is exactly 30%
    let mut lines = vec![world(100, false)];
    for i in 1..=3 {
        merged(&mut lines, 100 + i64::from(i) * 10, i, 10, &format!("cat/pkg{}-1", i));
    }
    lines.push(start(150, 4, 10, "cat/pkg4-1"));
    lines.push(fail(200));

    let parsed = scan(&lines);
    assert!(parsed.records.is_empty());
    assert_eq!(parsed.rejected.len(), 1);
    assert_eq!(
        parsed.rejected[0].reason,
        RejectReason::BelowThreshold {
            completed: 3,
            total: 10,
            threshold: Threshold::Percent(30),
        }
    );
}

#[test]
fn test_count_threshold() {
    let thresholds = Thresholds {
        incomplete: Threshold::Count(1),
        ..Thresholds::default()
    };
    let mut lines = vec![world(100, false)];
    merged(&mut lines, 110, 1, 50, "cat/a-1");
    merged(&mut lines, 120, 2, 50, "cat/b-1");
    lines.push(start(130, 3, 50, "cat/c-1"));
    lines.push(fail(140));

    let parsed = WorldUpdateScanner::new(thresholds).scan(lines.iter().map(String::as_str));
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].state, UpdateState::Incomplete);
}

#[test]
fn test_partial_run_after_keep_going_restart() {
    let mut lines = vec![world(100, true)];
    merged(&mut lines, 105, 1, 4, "cat/a-1");
    lines.push(start(120, 2, 4, "cat/b-1"));
    lines.push(fail(150));
    merged(&mut lines, 160, 1, 2, "cat/c-1");
    merged(&mut lines, 170, 2, 2, "cat/d-1");
    lines.push(ok(190));

    let parsed = scan(&lines);
    assert_eq!(
        parsed.records,
        vec![UpdateRecord {
            start: 100,
            stop: 190,
            total: 4,
            state: UpdateState::Partial,
            failed: Some("cat/b-1 (2 of 4)".to_string()),
        }]
    );
}

#[test]
fn test_partial_run_reports_dropped_packages() {
    // Four packages: one merged, one failed, one skipped as a dependent.
    let mut lines = vec![world(100, true)];
    merged(&mut lines, 105, 1, 4, "cat/a-1");
    lines.push(start(120, 2, 4, "cat/b-1"));
    lines.push(fail(150));
    merged(&mut lines, 160, 1, 1, "cat/d-1");
    lines.push(fail(190));

    let parsed = scan(&lines);
    assert_eq!(parsed.records.len(), 1);
    let record = &parsed.records[0];
    assert_eq!(record.state, UpdateState::Partial);
    assert_eq!(record.total, 4);
    assert_eq!(record.stop, 190);
    assert_eq!(
        record.failed.as_deref(),
        Some("cat/b-1 (2 of 4) (+1 dropped)")
    );
}

#[test]
fn test_fragment_lists_current_failure_first() {
    let mut lines = vec![world(100, true)];
    merged(&mut lines, 105, 1, 4, "cat/a-1");
    lines.push(start(120, 2, 4, "cat/b-1"));
    lines.push(fail(150));
    merged(&mut lines, 160, 1, 2, "cat/c-1");
    lines.push(start(171, 2, 2, "cat/d-1"));
    lines.push(fail(180));
    lines.push("181:  *** terminating.".to_string());

    let parsed = scan(&lines);
    assert_eq!(
        parsed.records,
        vec![UpdateRecord {
            start: 100,
            stop: 180,
            total: 4,
            state: UpdateState::Fragment,
            failed: Some("cat/d-1 (2 of 2), cat/b-1 (2 of 4)".to_string()),
        }]
    );
}

#[test]
fn test_fragment_below_threshold_is_rejected() {
    let mut lines = vec![world(100, true)];
    merged(&mut lines, 105, 1, 10, "cat/a-1");
    lines.push(start(120, 2, 10, "cat/b-1"));
    lines.push(fail(150));
    // The restarted segment fails on its first package.
    lines.push(start(160, 1, 8, "cat/c-1"));
    lines.push(fail(170));
    lines.push("171:  *** terminating.".to_string());

    let parsed = scan(&lines);
    assert!(parsed.records.is_empty());
    assert_eq!(parsed.rejected.len(), 1);
    assert_eq!(parsed.rejected[0].state, UpdateState::Fragment);
    assert_eq!(
        parsed.rejected[0].reason,
        RejectReason::BelowThreshold {
            completed: 0,
            total: 8,
            threshold: Threshold::Percent(30),
        }
    );
}

#[test]
fn test_interrupted_run_after_restart_is_partial() {
    let mut lines = vec![world(100, true)];
    merged(&mut lines, 105, 1, 4, "cat/a-1");
    lines.push(start(120, 2, 4, "cat/b-1"));
    lines.push(fail(150));
    merged(&mut lines, 160, 1, 3, "cat/c-1");
    lines.push(start(170, 2, 3, "cat/d-1"));
    lines.push(world(500, false));
    merged(&mut lines, 505, 1, 1, "cat/d-1");
    lines.push(ok(520));

    let parsed = scan(&lines);
    assert_eq!(parsed.records.len(), 2);
    assert_eq!(
        parsed.records[0],
        UpdateRecord {
            start: 100,
            stop: 165,
            total: 4,
            state: UpdateState::Partial,
            failed: Some("cat/b-1 (2 of 4)".to_string()),
        }
    );
    assert_eq!(parsed.records[1].state, UpdateState::Complete);
    assert_eq!(parsed.records[1].start, 500);
}

#[test]
fn test_count_threshold_is_strict() {
    let thresholds = Thresholds {
        incomplete: Threshold::Count(2),
        ..Thresholds::default()
    };
    let failed_run = |begin: i64, completed: u32| {
        let mut lines = vec![world(begin, false)];
        for i in 1..=completed {
            merged(&mut lines, begin + i64::from(i) * 10, i, 50, &format!("cat/p{}-1", i));
        }
        lines.push(start(begin + 90, completed + 1, 50, "cat/next-1"));
        lines.push(fail(begin + 95));
        lines
    };

    let mut lines = failed_run(100, 2);
    lines.extend(failed_run(300, 3));

    let parsed = WorldUpdateScanner::new(thresholds).scan(lines.iter().map(String::as_str));
    assert_eq!(parsed.rejected.len(), 1);
    assert_eq!(
        parsed.rejected[0].reason,
        RejectReason::BelowThreshold {
            completed: 2,
            total: 50,
            threshold: Threshold::Count(2),
        }
    );
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].start, 300);
    assert_eq!(parsed.records[0].state, UpdateState::Incomplete);
    assert_eq!(parsed.records[0].failed.as_deref(), Some("cat/next-1 (4 of 50)"));
}

#[test]
fn test_keep_going_failure_without_restart_is_incomplete() {
    let mut lines = vec![world(100, true)];
    merged(&mut lines, 105, 1, 2, "cat/a-1");
    lines.push(start(120, 2, 2, "cat/b-1"));
    lines.push(fail(150));
    lines.push("151:  *** terminating.".to_string());

    let parsed = scan(&lines);
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].state, UpdateState::Incomplete);
    assert_eq!(parsed.records[0].stop, 150);
    assert_eq!(
        parsed.records[0].failed.as_deref(),
        Some("cat/b-1 (2 of 2)")
    );
}

#[test]
fn test_interrupted_run_stops_at_last_boundary() {
    let mut lines = vec![world(100, false)];
    merged(&mut lines, 105, 1, 3, "cat/a-1");
    merged(&mut lines, 115, 2, 3, "cat/b-1");
    lines.push(start(125, 3, 3, "cat/c-1"));
    // Machine crashed; the next boot starts a fresh world update.
    lines.push(world(500, false));
    merged(&mut lines, 505, 1, 1, "cat/c-1");
    lines.push(ok(520));

    let parsed = scan(&lines);
    assert_eq!(parsed.records.len(), 2);

    let interrupted = &parsed.records[0];
    assert_eq!(interrupted.state, UpdateState::Incomplete);
    assert_eq!(interrupted.start, 100);
    assert_eq!(interrupted.stop, 120);
    assert_eq!(interrupted.failed.as_deref(), Some("cat/c-1 (3 of 3)"));

    let resumed = &parsed.records[1];
    assert_eq!(resumed.state, UpdateState::Complete);
    assert_eq!(resumed.start, 500);
}

#[test]
fn test_open_run_at_end_of_window_is_not_emitted() {
    let mut lines = vec![world(100, false)];
    merged(&mut lines, 105, 1, 3, "cat/a-1");
    lines.push(start(115, 2, 3, "cat/b-1"));

    let parsed = scan(&lines);
    assert!(parsed.is_empty());
    assert!(parsed.rejected.is_empty());
}

#[test]
fn test_nothing_to_merge_yields_no_record() {
    let lines = vec![world(100, false), ok(101)];
    assert!(scan(&lines).is_empty());
}

#[test]
fn test_stop_not_after_start_is_rejected() {
    let lines = vec![
        world(100, false),
        start(100, 1, 1, "cat/a-1"),
        done(100, 1, 1, "cat/a-1"),
        ok(100),
    ];
    let parsed = scan(&lines);
    assert!(parsed.records.is_empty());
    assert_eq!(
        parsed.rejected[0].reason,
        RejectReason::StopNotAfterStart {
            start: 100,
            stop: 100
        }
    );
    assert!(!parsed.rejected[0].reason.is_policy());
}

#[test]
fn test_records_keep_log_order_and_filter_by_state() {
    let mut lines = vec![world(100, false)];
    merged(&mut lines, 105, 1, 1, "cat/a-1");
    lines.push(ok(120));

    lines.push(world(200, false));
    merged(&mut lines, 205, 1, 2, "cat/b-1");
    lines.push(start(215, 2, 2, "cat/c-1"));
    lines.push(fail(230));

    lines.push(world(300, false));
    merged(&mut lines, 305, 1, 1, "cat/d-1");
    lines.push(ok(320));

    let parsed = scan(&lines);
    let starts: Vec<i64> = parsed.records.iter().map(|r| r.start).collect();
    assert_eq!(starts, vec![100, 200, 300]);

    assert_eq!(parsed.of_state(UpdateState::Complete).count(), 2);
    assert_eq!(parsed.of_state(UpdateState::Incomplete).count(), 1);
    assert_eq!(parsed.eligible(true).count(), 3);
    assert_eq!(parsed.eligible(false).count(), 2);
}

#[test]
fn test_scan_lines_matches_scan() {
    let mut lines = vec![world(100, false)];
    merged(&mut lines, 105, 1, 1, "cat/a-1");
    lines.push(ok(120));

    let streamed = WorldUpdateScanner::default()
        .scan_lines(lines.iter().enumerate().map(|(i, text)| {
            Ok(LogLine {
                number: i + 1,
                text: text.clone(),
            })
        }))
        .unwrap();
    assert_eq!(streamed, scan(&lines));
}
